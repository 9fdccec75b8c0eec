use cookie::Cookie;
use http::header::{HeaderName, SET_COOKIE};
use http::response::Parts;
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use serde::Serialize;
use std::fmt::{self, Debug, Formatter};

use super::ResponseBuilder;
use crate::body::ResponseBody;
use crate::cookies::{self, SecretChain};
use crate::error::Error;

/// An HTTP response under construction.
///
/// A response is an owned value: handlers build one and return it, and
/// returning it is the terminal act of the pipeline. Cookies accumulate in
/// the order they are added and serialize to one `Set-Cookie` header each
/// when the response is finalized; they are never overwritten.
///
pub struct Response {
    inner: http::Response<ResponseBody>,
    cookies: Vec<Cookie<'static>>,
}

impl Response {
    pub fn new(body: ResponseBody) -> Self {
        Self {
            inner: http::Response::new(body),
            cookies: Vec::new(),
        }
    }

    pub fn html(body: String) -> Self {
        ResponseBuilder::new()
            .html(body)
            .expect("a plain html response")
    }

    pub fn text(body: String) -> Self {
        ResponseBuilder::new()
            .text(body)
            .expect("a plain text response")
    }

    pub fn json<T: Serialize>(body: &T) -> Result<Self, Error> {
        ResponseBuilder::new().json(body)
    }

    pub fn not_found() -> Self {
        let mut response = Self::text("Not Found".to_owned());

        response.set_status(StatusCode::NOT_FOUND);
        response
    }

    pub fn build() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    pub fn from_parts(parts: Parts, body: ResponseBody) -> Self {
        Self {
            inner: http::Response::from_parts(parts, body),
            cookies: Vec::new(),
        }
    }

    pub fn body(&self) -> &ResponseBody {
        self.inner.body()
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        self.inner.body_mut()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// A shorthand method for `self.headers_mut().insert(name, value)`.
    ///
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers_mut().insert(name, value);
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn status_mut(&mut self) -> &mut StatusCode {
        self.inner.status_mut()
    }

    /// A shorthand method for `*self.status_mut() = status`.
    ///
    pub fn set_status(&mut self, status: StatusCode) {
        *self.inner.status_mut() = status;
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Append a cookie to the response. Each added cookie becomes its own
    /// `Set-Cookie` header, in insertion order.
    ///
    pub fn add_cookie(&mut self, cookie: Cookie<'static>) {
        self.cookies.push(cookie);
    }

    /// Append a cookie whose value is signed with the first secret of the
    /// provided chain.
    ///
    pub fn add_signed_cookie(&mut self, mut cookie: Cookie<'static>, secrets: &SecretChain) {
        let signed = cookies::sign(cookie.value(), secrets.signing_secret());

        cookie.set_value(signed);
        self.cookies.push(cookie);
    }

    /// Append a removal cookie for the provided name: an empty value with
    /// `Max-Age=0` and an `Expires` date in the past.
    ///
    pub fn clear_cookie(&mut self, name: impl Into<String>) {
        let mut cookie = Cookie::new(name.into(), "");

        cookie.set_path("/");
        cookie.set_max_age(cookie::time::Duration::ZERO);
        cookie.set_expires(cookie::time::OffsetDateTime::UNIX_EPOCH);

        self.cookies.push(cookie);
    }

    /// Returns the cookies added to the response so far, in insertion
    /// order.
    ///
    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    /// Consumes the response and returns a tuple containing the component
    /// parts of the response and the response body.
    ///
    pub fn into_parts(self) -> (Parts, ResponseBody) {
        self.inner.into_parts()
    }
}

impl Response {
    /// Serialize accumulated cookies to `Set-Cookie` headers, in insertion
    /// order, and return the inner response. Called once during
    /// finalization.
    ///
    pub(crate) fn into_inner(self) -> http::Response<ResponseBody> {
        let (mut parts, body) = self.inner.into_parts();

        for cookie in &self.cookies {
            match cookie.encoded().to_string().parse() {
                Ok(value) => {
                    parts.headers.append(SET_COOKIE, value);
                }
                Err(error) => {
                    tracing::warn!(
                        cookie = %cookie.name(),
                        %error,
                        "dropped a cookie that did not serialize to a valid header",
                    );
                }
            }
        }

        http::Response::from_parts(parts, body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.inner, f)
    }
}

impl From<http::Response<ResponseBody>> for Response {
    fn from(inner: http::Response<ResponseBody>) -> Self {
        Self {
            inner,
            cookies: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Response;
    use cookie::Cookie;
    use http::header::SET_COOKIE;

    use crate::cookies::{unsign, SecretChain, SignedCookie};

    #[test]
    fn cookies_serialize_in_insertion_order() {
        let mut response = Response::text("ok".to_owned());

        response.add_cookie(Cookie::new("first", "1"));
        response.add_cookie(Cookie::new("second", "2"));

        let inner = response.into_inner();
        let values: Vec<_> = inner.headers().get_all(SET_COOKIE).iter().collect();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0], "first=1");
        assert_eq!(values[1], "second=2");
    }

    #[test]
    fn signed_cookies_verify() {
        let secrets = SecretChain::from("sec");
        let mut response = Response::text("ok".to_owned());

        response.add_signed_cookie(Cookie::new("uid", "7"), &secrets);

        let value = response.cookies()[0].value().to_owned();
        assert_eq!(unsign(&value, &secrets), SignedCookie::Valid("7".into()));
    }

    #[test]
    fn clear_cookie_expires_in_the_past() {
        let mut response = Response::text("ok".to_owned());

        response.clear_cookie("uid");

        let inner = response.into_inner();
        let header = inner.headers().get(SET_COOKIE).unwrap().to_str().unwrap();

        assert!(header.starts_with("uid="));
        assert!(header.contains("Max-Age=0"));
        assert!(header.contains("Expires="));
    }
}
