use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use http::{HeaderValue, Method, StatusCode};
use http_body::Body;
use hyper::body::Incoming;
use hyper::service::Service;
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use super::context::AppContext;
use super::final_handler;
use super::settings::EtagMode;
use crate::body::{RequestBody, ResponseBody};
use crate::error::AnyError;
use crate::middleware::Next;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The frozen, cloneable form of an application: the request handler the
/// HTTP binding drives. Decoration happens here, exactly once per request,
/// before the first layer runs; finalization (cookies, ETags, HEAD body
/// suppression) happens here after the last layer returns.
///
pub struct AppService<State = ()> {
    router: Arc<Router<State>>,
    context: Arc<AppContext>,
    state: Arc<State>,
    remote_addr: Option<SocketAddr>,
}

impl<State> AppService<State>
where
    State: Send + Sync + 'static,
{
    pub(crate) fn new(
        router: Arc<Router<State>>,
        context: Arc<AppContext>,
        state: Arc<State>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            router,
            context,
            state,
            remote_addr,
        }
    }

    /// Returns a clone of the service bound to the provided transport
    /// peer.
    ///
    pub fn with_remote_addr(&self, remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            ..self.clone()
        }
    }

    /// Dispatch one request through the pipeline and return the finalized
    /// response. This is the `(request, response)` seam the host HTTP
    /// layer plugs into; tests drive it directly.
    ///
    pub async fn dispatch<B>(&self, request: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<AnyError>,
    {
        let (parts, body) = request.into_parts();

        // Finalization needs a few request facts after the request value
        // itself has been consumed by the pipeline.
        let method = parts.method.clone();
        let accept = parts
            .headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let if_none_match = parts
            .headers
            .get(IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let (env, etag_mode, x_powered_by) = {
            let settings = self.context.settings();
            (
                settings.env.clone(),
                settings.etag,
                settings.x_powered_by,
            )
        };

        let request = Request::new(
            parts,
            RequestBody::new(body),
            Arc::clone(&self.state),
            Arc::clone(&self.context),
            self.remote_addr,
        );

        let next = Next::root(Arc::clone(&self.router), request.path().to_owned());

        let response = match next.call(request).await {
            Ok(response) => response,
            Err(error) => final_handler::render(accept.as_deref(), &env, &error),
        };

        finalize(
            response,
            &method,
            if_none_match.as_deref(),
            etag_mode,
            x_powered_by,
        )
    }
}

impl<State> Clone for AppService<State> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            context: Arc::clone(&self.context),
            state: Arc::clone(&self.state),
            remote_addr: self.remote_addr,
        }
    }
}

impl<State> Service<http::Request<Incoming>> for AppService<State>
where
    State: Send + Sync + 'static,
{
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, request: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();

        Box::pin(async move { Ok(service.dispatch(request).await) })
    }
}

/// Compute an entity tag from a buffered payload.
///
fn payload_etag(bytes: &Bytes, mode: EtagMode) -> String {
    let digest = Sha256::digest(bytes);
    let hash = URL_SAFE_NO_PAD.encode(&digest[..16]);
    let tag = format!("\"{:x}-{}\"", bytes.len(), hash);

    match mode {
        EtagMode::Strong => tag,
        _ => format!("W/{}", tag),
    }
}

/// Weak comparison of an `If-None-Match` header against an entity tag.
///
fn etag_matches(header: &str, etag: &str) -> bool {
    let normalize = |tag: &str| tag.trim().trim_start_matches("W/").to_owned();
    let expected = normalize(etag);

    header
        .split(',')
        .any(|candidate| candidate.trim() == "*" || normalize(candidate) == expected)
}

fn finalize(
    mut response: Response,
    method: &Method,
    if_none_match: Option<&str>,
    etag_mode: EtagMode,
    x_powered_by: bool,
) -> http::Response<ResponseBody> {
    if x_powered_by && !response.headers().contains_key("x-powered-by") {
        response.set_header(
            http::header::HeaderName::from_static("x-powered-by"),
            HeaderValue::from_static("trellis"),
        );
    }

    let cacheable = response.status().is_success()
        && (*method == Method::GET || *method == Method::HEAD);

    // Derive an ETag for buffered payloads that do not carry one.
    if cacheable && etag_mode != EtagMode::Disabled && !response.headers().contains_key(ETAG) {
        if let Some(bytes) = response.body().as_bytes() {
            if !bytes.is_empty() {
                let etag = payload_etag(bytes, etag_mode);

                if let Ok(value) = HeaderValue::from_str(&etag) {
                    response.set_header(ETAG, value);
                }
            }
        }
    }

    // A fresh conditional request short-circuits to 304.
    let fresh = cacheable
        && match (if_none_match, response.headers().get(ETAG)) {
            (Some(header), Some(etag)) => etag
                .to_str()
                .is_ok_and(|etag| etag_matches(header, etag)),
            _ => false,
        };

    // Fill in Content-Length for buffered payloads before any body
    // suppression so HEAD responses still advertise the entity size.
    // Statuses that forbid a body never carry the header.
    let bodyless = matches!(response.status().as_u16(), 204 | 304)
        || response.status().is_informational();

    if !bodyless {
        if let Some(len) = response.body().len() {
            let headers = response.headers_mut();

            if !headers.contains_key(CONTENT_LENGTH) {
                if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
                    headers.insert(CONTENT_LENGTH, value);
                }
            }
        }
    }

    let mut inner = response.into_inner();

    if fresh {
        *inner.status_mut() = StatusCode::NOT_MODIFIED;
        inner.headers_mut().remove(CONTENT_LENGTH);
        inner.headers_mut().remove(CONTENT_TYPE);
        *inner.body_mut() = ResponseBody::empty();
    } else if *method == Method::HEAD {
        // HEAD keeps the entity headers and suppresses the body.
        *inner.body_mut() = ResponseBody::empty();
    }

    inner
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::header::{CONTENT_TYPE, SET_COOKIE};
    use http::{Method, StatusCode};
    use http_body_util::{BodyExt, Empty, Full};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::app::app;
    use crate::app::AppService;
    use crate::body::ResponseBody;
    use crate::body_parser;
    use crate::cookies::SignedCookie;
    use crate::error::Error;
    use crate::middleware::{CookieParser, Next};
    use crate::request::Request;
    use crate::response::Response;
    use crate::router::Router;
    use crate::serve_static::serve_static;
    use crate::session::session;

    fn get(uri: &str) -> http::Request<Empty<Bytes>> {
        http::Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Empty::new())
            .unwrap()
    }

    async fn body_text(body: ResponseBody) -> String {
        let collected = body.collect().await.unwrap().to_bytes();
        String::from_utf8(collected.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn routes_extract_params_and_query() {
        let mut app = app(());

        app.get("/users/:id", |request: Request, _: Next| async move {
            let id = request.param("id").unwrap_or_default().to_owned();
            let x = request.query_str("x").map(str::to_owned);

            Response::build().json(&json!({ "id": id, "x": x }))
        });

        let service = app.into_service();

        let response = service.dispatch(get("/users/42")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response.into_body()).await;
        assert_eq!(body, r#"{"id":"42","x":null}"#);

        let response = service.dispatch(get("/users/42?x=1")).await;
        let body = body_text(response.into_body()).await;
        assert_eq!(body, r#"{"id":"42","x":"1"}"#);
    }

    #[tokio::test]
    async fn mounted_routers_strip_and_restore_the_path() {
        let mut router = Router::new();

        router.get("/", |request: Request, _: Next| async move {
            let seen = format!("{}|{}", request.base_url(), request.path());
            Response::build().text(seen)
        });

        let mut app = app(());
        app.use_router("/api", router);

        let service = app.into_service();

        let response = service.dispatch(get("/api")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response.into_body()).await, "/api|/");

        let response = service.dispatch(get("/api/other")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn middleware_sees_stripped_path_and_siblings_see_it_restored() {
        let mut app = app(());

        app.use_at("/p", |request: Request, next: Next| {
            assert_eq!(request.base_url(), "/p");
            assert_eq!(request.path(), "/q");
            next.call(request)
        });

        app.get("/p/q", |request: Request, _: Next| async move {
            // The sibling layer observes the pre-mount values again.
            assert_eq!(request.base_url(), "");
            assert_eq!(request.path(), "/p/q");

            Response::build().text("ok".to_owned())
        });

        let service = app.into_service();
        let response = service.dispatch(get("/p/q")).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn json_bodies_parse_or_reject() {
        let mut app = app(());

        app.route("/u")
            .post(body_parser::json())
            .post(|request: Request, _: Next| async move {
                let body = request.json_body().cloned().unwrap_or_default();
                Response::json(&body)
            });

        let service = app.into_service();

        let payload = Bytes::from_static(b"{\"a\":1}");
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/u")
            .header(CONTENT_TYPE, "application/json")
            .header(http::header::CONTENT_LENGTH, payload.len())
            .body(Full::new(payload))
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response.into_body()).await, r#"{"a":1}"#);

        let payload = Bytes::from_static(b"{bad");
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/u")
            .header(CONTENT_TYPE, "application/json")
            .header(http::header::CONTENT_LENGTH, payload.len())
            .body(Full::new(payload))
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn payloads_over_the_limit_are_rejected() {
        let mut app = app(());

        app.route("/u")
            .post(body_parser::json().limit("16b"))
            .post(|request: Request, _: Next| async move {
                Response::json(&request.json_body().cloned().unwrap_or_default())
            });

        let service = app.into_service();

        let payload = Bytes::from_static(b"{\"padding\":\"xxxxxxxxxx\"}");
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/u")
            .header(CONTENT_TYPE, "application/json")
            .header(http::header::CONTENT_LENGTH, payload.len())
            .body(Full::new(payload))
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn static_files_serve_with_conditional_get() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("hello.txt"), b"hello").unwrap();

        let mut app = app(());
        app.use_at("/s", serve_static(root.path()));

        let service = app.into_service();

        let response = service.dispatch(get("/s/hello.txt")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let etag = response
            .headers()
            .get(http::header::ETAG)
            .expect("an etag header")
            .to_str()
            .unwrap()
            .to_owned();

        assert_eq!(body_text(response.into_body()).await, "hello");

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/s/hello.txt")
            .header(http::header::IF_NONE_MATCH, &etag)
            .body(Empty::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.headers().get(http::header::CONTENT_LENGTH).is_none());
        assert_eq!(body_text(response.into_body()).await, "");
    }

    #[tokio::test]
    async fn traversal_attempts_never_reach_the_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("inside.txt"), b"in").unwrap();

        let mut app = app(());
        app.use_at("/s", serve_static(root.path()));

        let service = app.into_service();

        let response = service.dispatch(get("/s/%2e%2e/%2e%2e/etc/passwd")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn signed_cookies_round_trip_between_requests() {
        let mut app = app(());

        app.use_any(CookieParser::signed("sec"));

        app.get("/set", |request: Request, _: Next| async move {
            let secrets = request.secrets().unwrap().clone();
            let mut response = Response::build().text("set".to_owned())?;

            response.add_signed_cookie(cookie::Cookie::new("uid", "7"), &secrets);
            Ok(response)
        });

        app.get("/read", |request: Request, _: Next| async move {
            match request.signed_cookie("uid") {
                Some(SignedCookie::Valid(uid)) => Response::build().text(uid.clone()),
                Some(SignedCookie::Tampered) => Response::build().text("tampered".to_owned()),
                None => Response::build().text("missing".to_owned()),
            }
        });

        let service = app.into_service();

        let response = service.dispatch(get("/set")).await;
        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/read")
            .header(http::header::COOKIE, set_cookie.split(';').next().unwrap())
            .body(Empty::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(body_text(response.into_body()).await, "7");

        // A flipped byte in the cookie value reads as tampered, not
        // missing.
        let (name, value) = set_cookie
            .split(';')
            .next()
            .unwrap()
            .split_once('=')
            .unwrap();
        let mut tampered = value.to_owned();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/read")
            .header(http::header::COOKIE, format!("{}={}", name, tampered))
            .body(Empty::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(body_text(response.into_body()).await, "tampered");
    }

    #[tokio::test]
    async fn route_chaining_dispatches_by_method() {
        let mut app = app(());

        app.route("/r")
            .get(|_: Request, _: Next| async { Response::build().text("a".to_owned()) })
            .post(|_: Request, _: Next| async { Response::build().text("b".to_owned()) });

        let service = app.into_service();

        let response = service.dispatch(get("/r")).await;
        assert_eq!(body_text(response.into_body()).await, "a");

        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/r")
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(body_text(response.into_body()).await, "b");

        // A method the route does not declare reports 404.
        let request = http::Request::builder()
            .method(Method::PUT)
            .uri("/r")
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn errors_skip_normal_layers_and_stop_at_error_middleware() {
        let m2_ran = Arc::new(AtomicBool::new(false));
        let m2_flag = Arc::clone(&m2_ran);

        let mut app = app(());

        app.use_any(|request: Request, next: Next| {
            next.fail(request, Error::message("boom"))
        });

        app.use_any(move |request: Request, next: Next| {
            m2_flag.store(true, Ordering::SeqCst);
            next.call(request)
        });

        app.use_error(|error: Error, _: Request, _: Next| async move {
            let mut response = Response::text(format!("caught: {}", error));

            response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            Ok(response)
        });

        let service = app.into_service();
        let response = service.dispatch(get("/")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response.into_body()).await.contains("boom"));
        assert!(!m2_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unhandled_errors_reach_the_final_handler() {
        let mut app = app(());

        app.get("/fail", |_: Request, _: Next| async {
            Err(Error::message("exploded"))
        });

        let service = app.into_service();
        let response = service.dispatch(get("/fail")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_text(response.into_body()).await;
        assert!(body.contains("exploded"));
        assert!(body.contains("\"statusCode\":500"));
    }

    #[tokio::test]
    async fn unmatched_requests_render_404() {
        let app = app(());
        let service = app.into_service();

        let response = service.dispatch(get("/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_text(response.into_body()).await;
        assert!(body.contains("Cannot GET /missing"));
    }

    #[tokio::test]
    async fn head_requests_run_get_handlers_without_a_body() {
        let mut app = app(());

        app.get("/doc", |_: Request, _: Next| async {
            Response::build().text("body".to_owned())
        });

        let service = app.into_service();

        let request = http::Request::builder()
            .method(Method::HEAD)
            .uri("/doc")
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = service.dispatch(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(http::header::CONTENT_LENGTH).unwrap(),
            "4"
        );
        assert_eq!(body_text(response.into_body()).await, "");
    }

    #[tokio::test]
    async fn param_guards_run_in_order_and_short_circuit_on_error() {
        let mut app = app(());

        app.param("id", |_: &mut Request, value: &str| {
            if value.chars().all(|char| char.is_ascii_digit()) {
                Ok(())
            } else {
                Err(Error::message("id must be numeric")
                    .with_status(StatusCode::BAD_REQUEST)
                    .as_operational())
            }
        });

        app.get("/items/:id", |request: Request, _: Next| async move {
            Response::build().text(request.param("id").unwrap_or_default().to_owned())
        });

        let service = app.into_service();

        let response = service.dispatch(get("/items/10")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response.into_body()).await, "10");

        let response = service.dispatch(get("/items/ten")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn skip_route_moves_on_to_later_layers() {
        let mut app = app(());

        app.route("/r")
            .get(|request: Request, next: Next| next.skip_route(request))
            .get(|_: Request, _: Next| async {
                // Skipped together with the rest of the route.
                Response::build().text("unreachable".to_owned())
            });

        app.get("/r", |_: Request, _: Next| async {
            Response::build().text("fallback".to_owned())
        });

        let service = app.into_service();
        let response = service.dispatch(get("/r")).await;

        assert_eq!(body_text(response.into_body()).await, "fallback");
    }

    #[tokio::test]
    async fn sessions_persist_between_requests() {
        let mut app = app(());

        app.use_any(CookieParser::signed("keyboard cat"));
        app.use_any(session("keyboard cat"));

        app.get("/login", |request: Request, _: Next| async move {
            let session = request.session().unwrap();

            session.insert("user", serde_json::json!("ada"));
            Response::build().text("ok".to_owned())
        });

        app.get("/whoami", |request: Request, _: Next| async move {
            let session = request.session().unwrap();
            let user = session
                .get("user")
                .and_then(|value| value.as_str().map(str::to_owned))
                .unwrap_or_else(|| "anonymous".to_owned());

            Response::build().text(user)
        });

        let service = app.into_service();

        let response = service.dispatch(get("/login")).await;
        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .expect("the session cookie is set for a populated new session")
            .to_str()
            .unwrap()
            .to_owned();

        assert!(set_cookie.starts_with("connect.sid="));
        assert!(set_cookie.contains("HttpOnly"));

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/whoami")
            .header(http::header::COOKIE, set_cookie.split(';').next().unwrap())
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(body_text(response.into_body()).await, "ada");

        // No cookie at all: a fresh, empty session.
        let response = service.dispatch(get("/whoami")).await;
        assert_eq!(body_text(response.into_body()).await, "anonymous");
    }

    #[tokio::test]
    async fn session_writes_survive_a_failing_handler() {
        let mut app = app(());

        app.use_any(CookieParser::signed("keyboard cat"));
        app.use_any(session("keyboard cat"));

        app.get("/login", |request: Request, _: Next| async move {
            request.session().unwrap().insert("user", serde_json::json!("ada"));
            Response::build().text("ok".to_owned())
        });

        app.get("/explode", |request: Request, _: Next| async move {
            let session = request.session().unwrap();

            session.insert("attempts", serde_json::json!(1));
            Err(Error::message("downstream failure"))
        });

        app.get("/attempts", |request: Request, _: Next| async move {
            let attempts = request
                .session()
                .unwrap()
                .get("attempts")
                .unwrap_or(serde_json::Value::Null);

            Response::json(&attempts)
        });

        let service = app.into_service();

        let response = service.dispatch(get("/login")).await;
        let session_cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_owned();

        // The handler writes to the session and then fails; the error is
        // rendered, and the write is saved on the way out.
        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/explode")
            .header(http::header::COOKIE, &session_cookie)
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/attempts")
            .header(http::header::COOKIE, &session_cookie)
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(body_text(response.into_body()).await, "1");
    }

    #[tokio::test]
    async fn response_etags_enable_conditional_requests() {
        let mut app = app(());

        app.get("/data", |_: Request, _: Next| async {
            Response::build().text("stable payload".to_owned())
        });

        let service = app.into_service();

        let response = service.dispatch(get("/data")).await;
        let etag = response
            .headers()
            .get(http::header::ETAG)
            .expect("buffered 200 responses carry a derived etag")
            .to_str()
            .unwrap()
            .to_owned();

        assert!(etag.starts_with("W/"));

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/data")
            .header(http::header::IF_NONE_MATCH, &etag)
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = service.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn nested_routers_dispatch_depth_first() {
        let mut inner = Router::new();

        inner.get("/leaf", |request: Request, _: Next| async move {
            Response::build().text(format!("{}|{}", request.base_url(), request.path()))
        });

        let mut outer = Router::new();
        outer.use_router("/inner", inner);

        let mut app = app(());
        app.use_router("/outer", outer);

        let service = app.into_service();
        let response = service.dispatch(get("/outer/inner/leaf")).await;

        assert_eq!(
            body_text(response.into_body()).await,
            "/outer/inner|/leaf"
        );
    }

    fn dummy_service() -> AppService<()> {
        app(()).into_service()
    }

    #[tokio::test]
    async fn services_are_cheaply_cloneable() {
        let service = dummy_service();
        let clone = service.clone();

        let response = clone.dispatch(get("/")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
