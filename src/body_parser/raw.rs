use std::sync::Arc;

use super::{has_body, read_body, require_limit};
use super::{ParsedBody, TypeMatcher, VerifyHook};
use crate::error::Error;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;

/// Returns the raw body parser with its default configuration: 100kb
/// limit, `application/octet-stream` content types.
///
pub fn raw<State>() -> Raw<State> {
    Raw {
        types: TypeMatcher::Patterns(vec!["application/octet-stream".to_owned()]),
        limit: 100 * 1024,
        inflate: true,
        verify: None,
    }
}

/// Middleware that aggregates matching payloads into [`ParsedBody::Raw`]
/// without decoding them.
///
pub struct Raw<State = ()> {
    types: TypeMatcher<State>,
    limit: u64,
    inflate: bool,
    verify: Option<VerifyHook<State>>,
}

impl<State> Raw<State> {
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

    /// Observe the raw payload; an error rejects the request.
    ///
    pub fn verify<F>(mut self, verify: F) -> Self
    where
        F: Fn(&Request<State>, &bytes::Bytes) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.verify = Some(Arc::new(verify));
        self
    }
}

impl<State> Clone for Raw<State> {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            limit: self.limit,
            inflate: self.inflate,
            verify: self.verify.clone(),
        }
    }
}

impl<State> Middleware<State> for Raw<State>
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
            let result: Result<ParsedBody, Error> = async {
                let bytes = read_body(&mut request, parser.limit, parser.inflate).await?;

                if let Some(verify) = &parser.verify {
                    verify(&request, &bytes)?;
                }

                Ok(ParsedBody::Raw(bytes))
            }
            .await;

            match result {
                Ok(parsed) => {
                    request.extensions_mut().insert(parsed);
                    next.call(request).await
                }
                Err(error) => next.fail(request, error).await,
            }
        })
    }
}
