use cookie::CookieJar;
use http::header::{AsHeaderName, REFERER};
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri, Version};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::params::Params;
use super::{accept, query};
use crate::app::context::AppContext;
use crate::body::RequestBody;
use crate::body_parser::ParsedBody;
use crate::cookies::{SecretChain, SignedCookie};
use crate::session::Session;

/// One HTTP request as seen inside the middleware pipeline.
///
#[derive(Debug)]
pub struct Request<State = ()> {
    head: RequestHead<State>,
    body: RequestBody,
}

/// The component parts of an HTTP request.
///
#[derive(Debug)]
pub struct RequestHead<State> {
    pub(crate) parts: Parts,

    /// The shared application state passed to the
    /// [`Application`](crate::Application) constructor.
    ///
    state: Arc<State>,

    /// Shared application context: settings, locals, engines.
    ///
    app: Arc<AppContext>,

    /// The transport peer, when the request arrived over a socket.
    ///
    remote_addr: Option<SocketAddr>,

    /// The concatenated mount prefixes consumed so far. Managed by the
    /// router while the request descends into mounted middleware and
    /// restored on the way back out.
    ///
    base_url: String,

    /// The request path relative to the innermost router.
    ///
    path: String,

    /// The path parameters captured by the most recent layer match.
    ///
    params: Params,

    /// The parsed query string. Parsed once, on entry to the application,
    /// according to the `query parser` setting.
    ///
    query: Map<String, Value>,

    /// Populated by the cookie parser middleware.
    ///
    pub(crate) cookies: Option<CookieJar>,
    pub(crate) signed_cookies: Option<HashMap<String, SignedCookie>>,
    pub(crate) secrets: Option<SecretChain>,

    /// Populated by the session middleware.
    ///
    pub(crate) session: Option<Session>,

    /// Parameter names (and the values they held) whose preprocessors
    /// already ran for this request.
    ///
    pub(crate) processed_params: Vec<(Arc<str>, String)>,
}

impl<State> Request<State> {
    pub(crate) fn new(
        parts: Parts,
        body: RequestBody,
        state: Arc<State>,
        app: Arc<AppContext>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let path = parts.uri.path().to_owned();
        let query = {
            let mode = app.settings().query_parser;
            query::parse(parts.uri.query().unwrap_or(""), mode)
        };

        Self {
            head: RequestHead {
                parts,
                state,
                app,
                remote_addr,
                base_url: String::new(),
                path,
                params: Params::new(),
                query,
                cookies: None,
                signed_cookies: None,
                secrets: None,
                session: None,
                processed_params: Vec::new(),
            },
            body,
        }
    }

    /// Returns a reference to the request's method.
    ///
    #[inline]
    pub fn method(&self) -> &Method {
        self.head.method()
    }

    /// Returns a reference to the request's URI, exactly as the client
    /// sent it.
    ///
    #[inline]
    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    /// Returns the HTTP version that was used to make the request.
    ///
    #[inline]
    pub fn version(&self) -> Version {
        self.head.version()
    }

    /// Returns a reference to the request's headers.
    ///
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    /// Returns the header value with the provided name as a string slice,
    /// or `None` when the header is absent or not visible ASCII.
    ///
    #[inline]
    pub fn header<K>(&self, key: K) -> Option<&str>
    where
        K: AsHeaderName,
    {
        self.head.header(key)
    }

    /// Returns a reference to the associated extensions.
    ///
    #[inline]
    pub fn extensions(&self) -> &Extensions {
        self.head.extensions()
    }

    /// Returns a mutable reference to the associated extensions.
    ///
    #[inline]
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        self.head.extensions_mut()
    }

    /// Returns the original request target: the full path plus the query
    /// string, unaffected by mount-path stripping.
    ///
    pub fn original_url(&self) -> String {
        self.head.original_url()
    }

    /// Returns the request path relative to the innermost router.
    ///
    #[inline]
    pub fn path(&self) -> &str {
        self.head.path()
    }

    /// Returns the concatenated mount prefixes consumed so far.
    ///
    #[inline]
    pub fn base_url(&self) -> &str {
        self.head.base_url()
    }

    /// Returns the path parameters captured for the current layer.
    ///
    #[inline]
    pub fn params(&self) -> &Params {
        self.head.params()
    }

    /// Returns the decoded path parameter with the provided name.
    ///
    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.head.params().get(name)
    }

    /// Returns the parsed query string.
    ///
    #[inline]
    pub fn query(&self) -> &Map<String, Value> {
        self.head.query()
    }

    /// Returns the query value with the provided name.
    ///
    pub fn query_value(&self, name: &str) -> Option<&Value> {
        self.head.query().get(name)
    }

    /// Returns the first string value of the query parameter with the
    /// provided name.
    ///
    pub fn query_str(&self, name: &str) -> Option<&str> {
        match self.head.query().get(name)? {
            Value::String(value) => Some(value),
            Value::Array(items) => items.iter().find_map(Value::as_str),
            _ => None,
        }
    }

    /// Negotiate the provided content types against the request's `Accept`
    /// header. Returns the first acceptable offer in the client's
    /// preference order, or `None`.
    ///
    pub fn accepts<'a>(&self, offers: &[&'a str]) -> Option<&'a str> {
        accept::negotiate(self.header(http::header::ACCEPT), offers)
    }

    /// Returns true when the request has a body whose `Content-Type`
    /// matches the provided pattern. Patterns accept the same shorthand
    /// as the body parsers: `json`, `urlencoded`, `text`, `text/*`,
    /// `*/json`, `*/*`, or a full type.
    ///
    pub fn is(&self, pattern: &str) -> bool {
        match self.header(http::header::CONTENT_TYPE) {
            Some(content_type) => accept::type_matches(content_type, pattern),
            None => false,
        }
    }

    /// Returns the client address, honoring the `trust proxy` setting:
    /// the transport peer by default, or an address derived from
    /// `X-Forwarded-For` when proxies are trusted.
    ///
    pub fn ip(&self) -> Option<IpAddr> {
        self.head.ip()
    }

    /// Returns the subdomains of the `Host` header, ordered from the
    /// deepest label outward, honoring the `subdomain offset` setting.
    ///
    pub fn subdomains(&self) -> Vec<String> {
        self.head.subdomains()
    }

    /// Returns the `Referer` header. The historical `referrer` spelling
    /// resolves to the same header.
    ///
    pub fn referrer(&self) -> Option<&str> {
        self.header(REFERER)
    }

    /// Returns the cookies parsed from the `Cookie` header, when the
    /// cookie parser middleware ran.
    ///
    pub fn cookies(&self) -> Option<&CookieJar> {
        self.head.cookies.as_ref()
    }

    /// Returns the value of the plain cookie with the provided name.
    ///
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.head
            .cookies
            .as_ref()
            .and_then(|jar| jar.get(name))
            .map(|cookie| cookie.value())
    }

    /// Decode a `j:`-prefixed JSON-typed cookie value.
    ///
    pub fn json_cookie(&self, name: &str) -> Option<Value> {
        let value = self.cookie(name)?;
        let json = value.strip_prefix(crate::cookies::JSON_PREFIX)?;

        serde_json::from_str(json).ok()
    }

    /// Returns the verified signed cookies, when the cookie parser ran
    /// with secrets. Tampered cookies are present with a
    /// [`SignedCookie::Tampered`] marker.
    ///
    pub fn signed_cookies(&self) -> Option<&HashMap<String, SignedCookie>> {
        self.head.signed_cookies.as_ref()
    }

    pub fn signed_cookie(&self, name: &str) -> Option<&SignedCookie> {
        self.head.signed_cookies.as_ref()?.get(name)
    }

    /// Returns the secret chain installed by the cookie parser, used by
    /// response helpers that write signed cookies.
    ///
    pub fn secrets(&self) -> Option<&SecretChain> {
        self.head.secrets.as_ref()
    }

    /// Returns a handle to the request session, when the session
    /// middleware ran.
    ///
    pub fn session(&self) -> Option<&Session> {
        self.head.session.as_ref()
    }

    /// Returns the payload attached by a body parser, if one matched.
    ///
    pub fn parsed_body(&self) -> Option<&ParsedBody> {
        self.extensions().get::<ParsedBody>()
    }

    /// Returns the JSON payload attached by the JSON body parser.
    ///
    pub fn json_body(&self) -> Option<&Value> {
        match self.parsed_body()? {
            ParsedBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the form payload attached by the url-encoded body parser.
    ///
    pub fn form_body(&self) -> Option<&Map<String, Value>> {
        match self.parsed_body()? {
            ParsedBody::Form(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the text payload attached by the text body parser.
    ///
    pub fn text_body(&self) -> Option<&str> {
        match self.parsed_body()? {
            ParsedBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the raw payload attached by the raw body parser.
    ///
    pub fn raw_body(&self) -> Option<&bytes::Bytes> {
        match self.parsed_body()? {
            ParsedBody::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns a reference to an [`Arc`] that contains the state argument
    /// that was passed to the [`Application`](crate::Application)
    /// constructor.
    ///
    #[inline]
    pub fn state(&self) -> &Arc<State> {
        self.head.state()
    }

    /// Returns the shared application context.
    ///
    #[inline]
    pub fn app(&self) -> &Arc<AppContext> {
        self.head.app()
    }

    /// Takes the request body, leaving an empty body in its place. Used by
    /// the body parsers to aggregate the payload exactly once.
    ///
    pub fn take_body(&mut self) -> RequestBody {
        std::mem::take(&mut self.body)
    }

    /// Consumes the request and returns a tuple containing the head and
    /// body.
    ///
    #[inline]
    pub fn into_parts(self) -> (RequestHead<State>, RequestBody) {
        (self.head, self.body)
    }
}

impl<State> Request<State> {
    #[inline]
    pub(crate) fn head_mut(&mut self) -> &mut RequestHead<State> {
        &mut self.head
    }

    /// Replace the mount state in place. The router calls this before a
    /// layer runs (to strip a matched prefix) and again before each
    /// sibling (to restore the pre-mount values).
    ///
    pub(crate) fn set_route_state(&mut self, base_url: String, path: String, params: Params) {
        self.head.base_url = base_url;
        self.head.path = path;
        self.head.params = params;
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.head.params = params;
    }

    pub(crate) fn param_processed(&self, name: &str, value: &str) -> bool {
        self.head
            .processed_params
            .iter()
            .any(|(seen, held)| &**seen == name && held == value)
    }

    pub(crate) fn mark_param_processed(&mut self, name: Arc<str>, value: String) {
        self.head.processed_params.push((name, value));
    }
}

impl<State> RequestHead<State> {
    #[inline]
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.parts.version
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    #[inline]
    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    #[inline]
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }

    pub fn header<K>(&self, key: K) -> Option<&str>
    where
        K: AsHeaderName,
    {
        self.headers().get(key)?.to_str().ok()
    }

    pub fn original_url(&self) -> String {
        match self.uri().query() {
            Some(query) => format!("{}?{}", self.uri().path(), query),
            None => self.uri().path().to_owned(),
        }
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[inline]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[inline]
    pub fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    #[inline]
    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    #[inline]
    pub fn app(&self) -> &Arc<AppContext> {
        &self.app
    }

    pub fn ip(&self) -> Option<IpAddr> {
        let trust = self.app.settings().trust_proxy.clone();
        let peer = self.remote_addr.map(|addr| addr.ip());

        let forwarded: Vec<IpAddr> = self
            .header(http::header::HeaderName::from_static("x-forwarded-for"))
            .map(|header| {
                header
                    .split(',')
                    .filter_map(|entry| entry.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        match peer {
            Some(peer) => Some(trust.resolve(peer, &forwarded)),
            // Without a transport peer only a fully trusted chain can
            // produce an address.
            None => match trust {
                crate::app::settings::TrustProxy::All => forwarded.first().copied(),
                _ => None,
            },
        }
    }

    pub fn subdomains(&self) -> Vec<String> {
        let offset = self.app.settings().subdomain_offset;

        let host = match self.header(http::header::HOST) {
            Some(host) => host.split(':').next().unwrap_or("").to_owned(),
            None => return Vec::new(),
        };

        if host.parse::<IpAddr>().is_ok() {
            return Vec::new();
        }

        let labels: Vec<&str> = host.split('.').collect();

        labels
            .iter()
            .rev()
            .skip(offset)
            .map(|label| (*label).to_owned())
            .collect()
    }
}
