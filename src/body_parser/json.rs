use serde_json::Value;
use std::sync::Arc;

use super::{charset, decode_charset, has_body, read_body, require_limit};
use super::{ParsedBody, TypeMatcher, VerifyHook};
use crate::error::Error;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;

/// Returns the JSON body parser with its default configuration: 100kb
/// limit, `json` content types, strict object-or-array payloads.
///
pub fn json<State>() -> Json<State> {
    Json {
        types: TypeMatcher::Patterns(vec!["json".to_owned()]),
        limit: 100 * 1024,
        inflate: true,
        strict: true,
        reviver: None,
        verify: None,
    }
}

/// Middleware that parses `application/json` payloads into
/// [`ParsedBody::Json`].
///
pub struct Json<State = ()> {
    types: TypeMatcher<State>,
    limit: u64,
    inflate: bool,
    strict: bool,
    reviver: Option<fn(Value) -> Value>,
    verify: Option<VerifyHook<State>>,
}

impl<State> Json<State> {
    /// Accept payloads whose content type matches any of the provided
    /// patterns.
    ///
    pub fn types<I, T>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.types = TypeMatcher::Patterns(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Accept payloads for requests matching the provided predicate.
    ///
    pub fn type_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request<State>) -> bool + Send + Sync + 'static,
    {
        self.types = TypeMatcher::Predicate(Arc::new(predicate));
        self
    }

    /// Set the maximum payload size, accepting strings such as `"1mb"`.
    ///
    /// # Panics
    ///
    /// Panics when the string does not describe a size.
    ///
    pub fn limit(mut self, limit: &str) -> Self {
        self.limit = require_limit(limit);
        self
    }

    /// Whether compressed payloads are inflated. Defaults to true.
    ///
    pub fn inflate(mut self, inflate: bool) -> Self {
        self.inflate = inflate;
        self
    }

    /// When strict, the first non-whitespace byte must open an object or
    /// an array; bare primitives are rejected. Defaults to true.
    ///
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Transform the parsed value before it is attached to the request.
    ///
    pub fn reviver(mut self, reviver: fn(Value) -> Value) -> Self {
        self.reviver = Some(reviver);
        self
    }

    /// Observe the raw payload before parsing; an error rejects the
    /// request.
    ///
    pub fn verify<F>(mut self, verify: F) -> Self
    where
        F: Fn(&Request<State>, &bytes::Bytes) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.verify = Some(Arc::new(verify));
        self
    }
}

impl<State> Clone for Json<State> {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            limit: self.limit,
            inflate: self.inflate,
            strict: self.strict,
            reviver: self.reviver,
            verify: self.verify.clone(),
        }
    }
}

fn strict_violation(payload: &str) -> Option<Error> {
    let first = payload.trim_start().as_bytes().first()?;

    if matches!(first, b'{' | b'[') {
        None
    } else {
        Some(
            Error::bad_request(std::io::Error::other(format!(
                "strict JSON parsing requires an object or array, found {:?}",
                char::from(*first)
            )))
            .as_operational(),
        )
    }
}

impl<State> Json<State>
where
    State: Send + Sync + 'static,
{
    async fn parse(&self, request: &mut Request<State>) -> Result<ParsedBody, Error> {
        if let Some(charset) = charset(request) {
            if !matches!(charset.as_str(), "utf-8" | "utf8" | "us-ascii" | "ascii") {
                return Err(Error::unsupported_media_type(std::io::Error::other(
                    format!("unsupported charset {:?} for a JSON payload", charset),
                ))
                .as_operational());
            }
        }

        let bytes = read_body(request, self.limit, self.inflate).await?;

        if let Some(verify) = &self.verify {
            verify(request, &bytes)?;
        }

        let payload = decode_charset(&bytes, "utf-8")?;

        if self.strict {
            if let Some(error) = strict_violation(&payload) {
                return Err(error);
            }
        }

        // Parse failures are reported verbatim in development and masked
        // in production, so the error stays non-operational.
        let mut value: Value =
            serde_json::from_str(&payload).map_err(Error::bad_request)?;

        if let Some(reviver) = self.reviver {
            value = reviver(value);
        }

        Ok(ParsedBody::Json(value))
    }
}

impl<State> Middleware<State> for Json<State>
where
    State: Send + Sync + 'static,
{
    fn call(&self, mut request: Request<State>, next: Next<State>) -> BoxFuture {
        if request.parsed_body().is_some()
            || !has_body(&request)
            || !self.types.matches(&request)
        {
            return next.call(request);
        }

        let parser = self.clone();

        Box::pin(async move {
            match parser.parse(&mut request).await {
                Ok(parsed) => {
                    request.extensions_mut().insert(parsed);
                    next.call(request).await
                }
                Err(error) => next.fail(request, error).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::strict_violation;

    #[test]
    fn strict_accepts_objects_and_arrays() {
        assert!(strict_violation("  {\"a\":1}").is_none());
        assert!(strict_violation("\n[1,2]").is_none());
    }

    #[test]
    fn strict_rejects_primitives() {
        assert!(strict_violation("42").is_some());
        assert!(strict_violation("\"text\"").is_some());
        assert!(strict_violation("true").is_some());
    }
}
