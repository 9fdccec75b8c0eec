use cookie::{Cookie, SameSite};
use http::header::COOKIE;
use std::sync::Arc;
use std::time::Duration;

use super::session::{generate_id, IdGenerator, Session};
use super::store::{MemoryStore, SessionStore};
use crate::cookies::{sign, unsign, SecretChain, SignedCookie};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// The attributes applied to the session cookie.
///
#[derive(Clone, Debug)]
pub struct SessionCookie {
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub domain: Option<String>,
    pub same_site: Option<SameSite>,

    /// Controls both the cookie's `Max-Age`/`Expires` and the stored
    /// session's expiration. `None` makes a browser-session cookie whose
    /// stored record never expires.
    ///
    pub max_age: Option<Duration>,
}

impl Default for SessionCookie {
    fn default() -> Self {
        Self {
            path: "/".to_owned(),
            http_only: true,
            secure: false,
            domain: None,
            same_site: None,
            max_age: None,
        }
    }
}

impl SessionCookie {
    pub(crate) fn build(&self, name: &str, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(name.to_owned(), value);

        cookie.set_path(self.path.clone());
        cookie.set_http_only(self.http_only);
        cookie.set_secure(self.secure);

        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }

        if let Some(same_site) = self.same_site {
            cookie.set_same_site(same_site);
        }

        if let Some(max_age) = self.max_age {
            if let Ok(max_age) = cookie::time::Duration::try_from(max_age) {
                cookie.set_max_age(max_age);
                cookie.set_expires(cookie::time::OffsetDateTime::now_utc() + max_age);
            }
        }

        cookie
    }
}

struct SessionConfig {
    name: String,
    secrets: SecretChain,
    store: Arc<dyn SessionStore>,
    cookie: SessionCookie,
    genid: IdGenerator,
    resave: bool,
    save_uninitialized: bool,
    rolling: bool,
}

/// Middleware that binds a [`Session`] to every request and saves it when
/// the response ends.
///
/// A session id is recovered from the signed cookie (already verified by
/// the cookie parser) or by unsigning the plain cookie directly; failing
/// both, a fresh id is generated and the session is marked new. The save
/// decision on response end follows the configuration: new sessions save
/// when `save_uninitialized` is set or they were written to; existing
/// sessions save when modified or `resave` is set; `rolling` refreshes
/// the cookie on every response. The session cookie is appended after
/// every cookie the handlers added.
///
pub struct SessionMiddleware {
    config: Arc<SessionConfig>,
}

/// Returns session middleware with an in-memory store and default
/// options. The secret chain signs the session cookie; list the newest
/// secret first to rotate keys.
///
pub fn session(secrets: impl Into<SecretChain>) -> SessionMiddleware {
    SessionMiddleware {
        config: Arc::new(SessionConfig {
            name: "connect.sid".to_owned(),
            secrets: secrets.into(),
            store: MemoryStore::new(),
            cookie: SessionCookie::default(),
            genid: Arc::new(generate_id),
            resave: false,
            save_uninitialized: false,
            rolling: false,
        }),
    }
}

impl SessionMiddleware {
    fn config_mut(&mut self) -> &mut SessionConfig {
        Arc::get_mut(&mut self.config)
            .expect("session middleware cannot be reconfigured once installed")
    }

    /// The session cookie name. Defaults to `connect.sid`.
    ///
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config_mut().name = name.into();
        self
    }

    /// Replace the backing store.
    ///
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.config_mut().store = store;
        self
    }

    /// The attributes of the session cookie.
    ///
    pub fn cookie(mut self, cookie: SessionCookie) -> Self {
        self.config_mut().cookie = cookie;
        self
    }

    /// Replace the session id generator.
    ///
    pub fn genid<F>(mut self, genid: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.config_mut().genid = Arc::new(genid);
        self
    }

    /// Save unmodified existing sessions on every response.
    ///
    pub fn resave(mut self, resave: bool) -> Self {
        self.config_mut().resave = resave;
        self
    }

    /// Save new sessions even when nothing was written to them.
    ///
    pub fn save_uninitialized(mut self, save: bool) -> Self {
        self.config_mut().save_uninitialized = save;
        self
    }

    /// Refresh the session cookie (and expiration) on every response.
    ///
    pub fn rolling(mut self, rolling: bool) -> Self {
        self.config_mut().rolling = rolling;
        self
    }
}

/// Recover the session id from the request cookies. Prefers the verified
/// signed-cookie map; falls back to unsigning the raw `Cookie` header
/// entry. Tampered values are ignored.
///
fn recover_id<State>(request: &Request<State>, config: &SessionConfig) -> Option<String> {
    if let Some(signed) = request.signed_cookie(&config.name) {
        return match signed {
            SignedCookie::Valid(id) => Some(id.clone()),
            SignedCookie::Tampered => None,
        };
    }

    if let Some(value) = request.cookie(&config.name) {
        return match unsign(value, &config.secrets) {
            SignedCookie::Valid(id) => Some(id),
            SignedCookie::Tampered => None,
        };
    }

    // Without a cookie parser, read the header directly.
    let header = request.header(COOKIE)?;

    for result in Cookie::split_parse_encoded(header.to_owned()) {
        let Ok(cookie) = result else { continue };

        if cookie.name() == config.name {
            if let SignedCookie::Valid(id) = unsign(cookie.value(), &config.secrets) {
                return Some(id);
            }
        }
    }

    None
}

fn append_session_cookie(response: &mut Response, config: &SessionConfig, id: &str) {
    let value = sign(id, config.secrets.signing_secret());

    response.add_cookie(config.cookie.build(&config.name, value));
}

impl<State> Middleware<State> for SessionMiddleware
where
    State: Send + Sync + 'static,
{
    fn call(&self, mut request: Request<State>, next: Next<State>) -> BoxFuture {
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let recovered = recover_id(&request, &config);

            let stored = match &recovered {
                Some(id) => match config.store.get(id).await {
                    Ok(stored) => stored,
                    Err(error) => return next.fail(request, error).await,
                },
                None => None,
            };

            let (id, data, is_new) = match (recovered, stored) {
                (Some(id), Some(record)) => (id, record.data, false),
                _ => ((config.genid)(), Default::default(), true),
            };

            let session = Session::new(
                id,
                data,
                is_new,
                config.cookie.clone(),
                Arc::clone(&config.store),
                Arc::clone(&config.genid),
            );

            request.head_mut().session = Some(session.clone());

            // The downstream future owns the request; this clone observes
            // what handlers did to the session once the response is back.
            // An unhandled error still becomes a real response at the
            // final handler, so the save-on-end work below runs on both
            // outcomes.
            let result = next.call(request).await;

            let (id, is_new, dirty, destroyed, id_changed) = session.state();

            if destroyed {
                return match result {
                    Ok(mut response) => {
                        response.clear_cookie(config.name.clone());
                        Ok(response)
                    }
                    Err(error) => Err(error),
                };
            }

            let should_save = if is_new {
                config.save_uninitialized || dirty
            } else {
                config.resave || dirty
            };

            if should_save {
                // The response (or its error) is already decided; a
                // failed save is logged rather than replacing it.
                if let Err(error) = config.store.set(&id, session.record()).await {
                    tracing::error!(%error, "failed to save a session");
                }
            } else if config.rolling && !is_new {
                if let Err(error) = config.store.touch(&id, session.expires_at()).await {
                    tracing::error!(%error, "failed to touch a session");
                }
            }

            match result {
                Ok(mut response) => {
                    // The session cookie is appended after every cookie
                    // added by the handlers.
                    if (is_new && should_save) || id_changed || config.rolling {
                        append_session_cookie(&mut response, &config, &id);
                    }

                    Ok(response)
                }

                // The error response is rendered upstream without a
                // cookie jar to append to; the session data itself was
                // saved above.
                Err(error) => Err(error),
            }
        })
    }
}
