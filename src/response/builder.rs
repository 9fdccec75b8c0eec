use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, StatusCode, Version};
use serde::Serialize;

use super::response::Response;
use crate::body::ResponseBody;
use crate::error::Error;

/// Incrementally build a [`Response`].
///
/// ```
/// use trellis::{Next, Request, Response};
///
/// async fn hello(request: Request, _: Next) -> trellis::Result {
///     let name = request.param("name").unwrap_or("world").to_owned();
///     Response::build().text(format!("Hello, {}!", name))
/// }
/// ```
///
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    inner: http::response::Builder,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn header<K, V>(self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        Self {
            inner: self.inner.header(key, value),
        }
    }

    /// Set each of the provided headers, skipping entries with a `None`
    /// value.
    ///
    pub fn headers<I, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (HeaderName, Option<V>)>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        for (name, value) in headers {
            if let Some(value) = value {
                self = self.header(name, value);
            }
        }

        self
    }

    #[inline]
    pub fn status<T>(self, status: T) -> Self
    where
        StatusCode: TryFrom<T>,
        <StatusCode as TryFrom<T>>::Error: Into<http::Error>,
    {
        Self {
            inner: self.inner.status(status),
        }
    }

    #[inline]
    pub fn version(self, version: Version) -> Self {
        Self {
            inner: self.inner.version(version),
        }
    }

    #[inline]
    pub fn body<T>(self, body: T) -> Result<Response, Error>
    where
        ResponseBody: From<T>,
    {
        Ok(self.inner.body(body.into())?.into())
    }

    /// Set a `Content-Type` from a shorthand or full type, appending a
    /// UTF-8 charset to text types.
    ///
    pub fn content_type(self, shorthand: &str) -> Self {
        let full = match shorthand {
            "json" => "application/json; charset=utf-8".to_owned(),
            "html" => "text/html; charset=utf-8".to_owned(),
            "text" => "text/plain; charset=utf-8".to_owned(),
            other if other.contains('/') => other.to_owned(),
            other => mime_guess::from_ext(other)
                .first()
                .map(|mime| mime.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_owned()),
        };

        self.header(CONTENT_TYPE, full)
    }

    #[inline]
    pub fn json(self, data: &impl Serialize) -> Result<Response, Error> {
        let json = serde_json::to_string(data)?;

        self.header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(CONTENT_LENGTH, json.len())
            .body(json)
    }

    #[inline]
    pub fn html(self, data: String) -> Result<Response, Error> {
        self.header(CONTENT_TYPE, "text/html; charset=utf-8")
            .header(CONTENT_LENGTH, data.len())
            .body(data)
    }

    #[inline]
    pub fn text(self, data: String) -> Result<Response, Error> {
        self.header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(CONTENT_LENGTH, data.len())
            .body(data)
    }

    /// Respond with raw bytes as `application/octet-stream`.
    ///
    #[inline]
    pub fn binary(self, data: Vec<u8>) -> Result<Response, Error> {
        self.header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, data.len())
            .body(data)
    }

    /// Convert self into a [Response] with an empty payload.
    ///
    #[inline]
    pub fn finish(self) -> Result<Response, Error> {
        self.body(ResponseBody::empty())
    }
}
