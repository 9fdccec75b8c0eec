use std::sync::Arc;

use super::{charset, decode_charset, has_body, read_body, require_limit};
use super::{ParsedBody, TypeMatcher, VerifyHook};
use crate::error::Error;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::{parse_extended, parse_simple, Pairs, Request};

/// Returns the url-encoded form parser with its default configuration:
/// 100kb limit, extended bracket syntax, at most 1000 parameters.
///
pub fn urlencoded<State>() -> UrlEncoded<State> {
    UrlEncoded {
        types: TypeMatcher::Patterns(vec!["urlencoded".to_owned()]),
        limit: 100 * 1024,
        inflate: true,
        extended: true,
        parameter_limit: 1000,
        verify: None,
    }
}

/// Middleware that parses `application/x-www-form-urlencoded` payloads
/// into [`ParsedBody::Form`].
///
pub struct UrlEncoded<State = ()> {
    types: TypeMatcher<State>,
    limit: u64,
    inflate: bool,
    extended: bool,
    parameter_limit: usize,
    verify: Option<VerifyHook<State>>,
}

impl<State> UrlEncoded<State> {
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

    /// When extended, bracketed keys such as `a[b][c]=1` produce nested
    /// objects and `a[]=1` arrays; otherwise keys stay flat. Defaults to
    /// true.
    ///
    pub fn extended(mut self, extended: bool) -> Self {
        self.extended = extended;
        self
    }

    /// Reject payloads with more than this many parameters. Defaults to
    /// 1000.
    ///
    pub fn parameter_limit(mut self, limit: usize) -> Self {
        self.parameter_limit = limit;
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

impl<State> Clone for UrlEncoded<State> {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            limit: self.limit,
            inflate: self.inflate,
            extended: self.extended,
            parameter_limit: self.parameter_limit,
            verify: self.verify.clone(),
        }
    }
}

impl<State> UrlEncoded<State>
where
    State: Send + Sync + 'static,
{
    async fn parse(&self, request: &mut Request<State>) -> Result<ParsedBody, Error> {
        if let Some(charset) = charset(request) {
            if !matches!(charset.as_str(), "utf-8" | "utf8" | "us-ascii" | "ascii") {
                return Err(Error::unsupported_media_type(std::io::Error::other(
                    format!("unsupported charset {:?} for a form payload", charset),
                ))
                .as_operational());
            }
        }

        let bytes = read_body(request, self.limit, self.inflate).await?;

        if let Some(verify) = &self.verify {
            verify(request, &bytes)?;
        }

        let payload = decode_charset(&bytes, "utf-8")?;

        if Pairs::new(&payload).count() > self.parameter_limit {
            return Err(Error::payload_too_large(std::io::Error::other(format!(
                "form payload exceeded the limit of {} parameters",
                self.parameter_limit
            )))
            .as_operational());
        }

        let form = if self.extended {
            parse_extended(&payload)
        } else {
            parse_simple(&payload)
        };

        Ok(ParsedBody::Form(form))
    }
}

impl<State> Middleware<State> for UrlEncoded<State>
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
