use std::sync::Arc;

use super::{charset, decode_charset, has_body, read_body, require_limit};
use super::{ParsedBody, TypeMatcher, VerifyHook};
use crate::error::Error;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;

/// Returns the text body parser with its default configuration: 100kb
/// limit, `text/plain` content types, UTF-8 when the request does not
/// declare a charset.
///
pub fn text<State>() -> Text<State> {
    Text {
        types: TypeMatcher::Patterns(vec!["text/plain".to_owned()]),
        limit: 100 * 1024,
        inflate: true,
        default_charset: "utf-8".to_owned(),
        verify: None,
    }
}

/// Middleware that decodes matching payloads into [`ParsedBody::Text`].
///
pub struct Text<State = ()> {
    types: TypeMatcher<State>,
    limit: u64,
    inflate: bool,
    default_charset: String,
    verify: Option<VerifyHook<State>>,
}

impl<State> Text<State> {
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

    /// The charset assumed when the request does not declare one.
    /// Defaults to UTF-8.
    ///
    pub fn default_charset(mut self, charset: impl Into<String>) -> Self {
        self.default_charset = charset.into().to_ascii_lowercase();
        self
    }

    /// Observe the raw payload before decoding; an error rejects the
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

impl<State> Clone for Text<State> {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            limit: self.limit,
            inflate: self.inflate,
            default_charset: self.default_charset.clone(),
            verify: self.verify.clone(),
        }
    }
}

impl<State> Middleware<State> for Text<State>
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
                let charset = charset(&request).unwrap_or_else(|| parser.default_charset.clone());
                let bytes = read_body(&mut request, parser.limit, parser.inflate).await?;

                if let Some(verify) = &parser.verify {
                    verify(&request, &bytes)?;
                }

                Ok(ParsedBody::Text(decode_charset(&bytes, &charset)?))
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
