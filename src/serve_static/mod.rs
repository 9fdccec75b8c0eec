//! Path-safe static file serving with conditional GET.
//!
//! ```no_run
//! use trellis::{serve_static::serve_static, Application};
//!
//! let mut app = Application::new();
//!
//! app.use_at("/assets", serve_static("public").max_age(std::time::Duration::from_secs(3600)));
//! ```

mod etag;
mod resolve;
mod respond;

pub use resolve::Dotfiles;
pub use respond::send_file;

use http::header::ALLOW;
use http::{Method, StatusCode};
use percent_encoding::percent_decode_str;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

use crate::error::Error;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use resolve::{Resolution, ResolveConfig};

type SetHeaders = Arc<dyn Fn(&mut Response, &Path, &Metadata) + Send + Sync>;

pub(crate) struct ServeOptions {
    pub etag: bool,
    pub weak_etags: bool,
    pub last_modified: bool,
    pub max_age: Duration,
    pub set_headers: Option<SetHeaders>,
}

/// Middleware that serves files below a root directory.
///
/// Only `GET` and `HEAD` are handled. The request path (relative to the
/// mount prefix) is percent-decoded, lexically contained within the root,
/// filtered by the dotfile policy, and resolved against the directory
/// index and extension fallbacks before anything is opened. Responses
/// carry validators for conditional requests and honor `If-None-Match`
/// and `If-Modified-Since` with 304.
///
pub struct ServeStatic {
    resolve: ResolveConfig,
    options: ServeOptions,
    fallthrough: bool,
}

/// Returns the static middleware rooted at the provided directory with
/// its default configuration.
///
pub fn serve_static(root: impl Into<PathBuf>) -> ServeStatic {
    ServeStatic {
        resolve: ResolveConfig {
            root: root.into(),
            index: vec!["index.html".to_owned()],
            extensions: Vec::new(),
            dotfiles: Dotfiles::Ignore,
            redirect: true,
        },
        options: ServeOptions {
            etag: true,
            weak_etags: true,
            last_modified: true,
            max_age: Duration::ZERO,
            set_headers: None,
        },
        fallthrough: true,
    }
}

impl ServeStatic {
    /// The file names tried, in order, when the target is a directory.
    /// Defaults to `index.html`.
    ///
    pub fn index<I, T>(mut self, index: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.resolve.index = index.into_iter().map(Into::into).collect();
        self
    }

    /// Disable directory index lookup.
    ///
    pub fn no_index(mut self) -> Self {
        self.resolve.index.clear();
        self
    }

    /// How dotfile segments are treated. Defaults to ignore (404).
    ///
    pub fn dotfiles(mut self, dotfiles: Dotfiles) -> Self {
        self.resolve.dotfiles = dotfiles;
        self
    }

    /// Extensions appended, in order, when the requested file is missing.
    ///
    pub fn extensions<I, T>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.resolve.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether responses carry an ETag. Defaults to true (weak).
    ///
    pub fn etag(mut self, etag: bool) -> Self {
        self.options.etag = etag;
        self
    }

    /// Use strong ETags instead of weak ones.
    ///
    pub fn strong_etags(mut self) -> Self {
        self.options.weak_etags = false;
        self
    }

    /// Whether responses carry a `Last-Modified` header. Defaults to
    /// true.
    ///
    pub fn last_modified(mut self, last_modified: bool) -> Self {
        self.options.last_modified = last_modified;
        self
    }

    /// Emit `Cache-Control: public, max-age=<seconds>` when non-zero.
    ///
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.options.max_age = max_age;
        self
    }

    /// Whether a directory reached without a trailing slash redirects to
    /// the slashed form. Defaults to true.
    ///
    pub fn redirect(mut self, redirect: bool) -> Self {
        self.resolve.redirect = redirect;
        self
    }

    /// Whether an unresolved request yields to the next middleware
    /// instead of responding 404. Defaults to true.
    ///
    pub fn fallthrough(mut self, fallthrough: bool) -> Self {
        self.fallthrough = fallthrough;
        self
    }

    /// A hook invoked with every successful response before it is
    /// returned, together with the file path and metadata.
    ///
    pub fn set_headers<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Response, &Path, &Metadata) + Send + Sync + 'static,
    {
        self.options.set_headers = Some(Arc::new(hook));
        self
    }
}

fn plain_status(status: StatusCode) -> Response {
    let mut response =
        Response::text(status.canonical_reason().unwrap_or("Error").to_owned());

    response.set_status(status);
    response
}

impl<State> Middleware<State> for ServeStatic
where
    State: Send + Sync + 'static,
{
    fn call(&self, request: Request<State>, next: Next<State>) -> BoxFuture {
        if *request.method() != Method::GET && *request.method() != Method::HEAD {
            if self.fallthrough {
                return next.call(request);
            }

            return Box::pin(async {
                let mut response = plain_status(StatusCode::METHOD_NOT_ALLOWED);

                response.set_header(ALLOW, http::HeaderValue::from_static("GET, HEAD"));
                Ok(response)
            });
        }

        let config = self.resolve.clone();
        let options = self.options.snapshot();
        let fallthrough = self.fallthrough;

        Box::pin(async move {
            let raw = request.path().to_owned();

            // NUL bytes and undecodable escapes are rejected outright.
            let decoded = match percent_decode_str(&raw).decode_utf8() {
                Ok(decoded) if !decoded.contains('\0') => decoded.into_owned(),
                _ => return Ok(plain_status(StatusCode::BAD_REQUEST)),
            };

            let trailing_slash = decoded.ends_with('/');
            let relative = decoded.trim_start_matches('/').to_owned();

            let resolution =
                task::spawn_blocking(move || resolve::resolve(&config, &relative, trailing_slash))
                    .await
                    .map_err(Error::internal_server_error)?;

            match resolution {
                Resolution::Found(file) => {
                    let if_none_match = request.header(http::header::IF_NONE_MATCH);
                    let if_modified_since = request.header(http::header::IF_MODIFIED_SINCE);
                    let is_head = *request.method() == Method::HEAD;

                    respond::respond_with_file(
                        if_none_match,
                        if_modified_since,
                        is_head,
                        file,
                        &options,
                    )
                    .await
                }

                Resolution::Directory => {
                    // Preserve the query string across the redirect.
                    let location = match request.uri().query() {
                        Some(query) => {
                            format!("{}{}/?{}", request.base_url(), request.path(), query)
                        }
                        None => format!("{}{}/", request.base_url(), request.path()),
                    };

                    crate::response::Redirect::moved_permanently(&location)
                }

                Resolution::NotFound if fallthrough => next.call(request).await,
                Resolution::NotFound => Ok(plain_status(StatusCode::NOT_FOUND)),

                Resolution::Denied => Ok(plain_status(StatusCode::FORBIDDEN)),

                // The candidate escaped the root: 403, or 404 when the
                // middleware does not fall through.
                Resolution::Escaped if fallthrough => Ok(plain_status(StatusCode::FORBIDDEN)),
                Resolution::Escaped => Ok(plain_status(StatusCode::NOT_FOUND)),
            }
        })
    }
}

impl ServeOptions {
    fn snapshot(&self) -> Self {
        Self {
            etag: self.etag,
            weak_etags: self.weak_etags,
            last_modified: self.last_modified,
            max_age: self.max_age,
            set_headers: self.set_headers.clone(),
        }
    }
}
