use cookie::{Cookie, CookieJar};
use http::header::COOKIE;
use std::collections::HashMap;

use super::middleware::Middleware;
use super::next::Next;
use crate::cookies::{unsign, SecretChain};
use crate::request::Request;

/// Middleware that parses the `Cookie` header into the request's cookie
/// jar and, when constructed with secrets, verifies `s:`-prefixed values
/// into the signed cookie map.
///
/// Tampered signed cookies stay visible as [`SignedCookie::Tampered`] so
/// application code can tell "absent" from "present but invalid". The
/// secret chain is installed on the request for response helpers that
/// write signed cookies.
///
pub struct CookieParser {
    secrets: Option<SecretChain>,
}

impl CookieParser {
    /// Returns a parser for plain cookies only.
    ///
    pub fn new() -> Self {
        Self { secrets: None }
    }

    /// Returns a parser that verifies signed cookies against the provided
    /// secret chain. List the newest secret first; older secrets keep
    /// verifying cookies issued before a rotation.
    ///
    pub fn signed(secrets: impl Into<SecretChain>) -> Self {
        Self {
            secrets: Some(secrets.into()),
        }
    }
}

impl Default for CookieParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_header(header: &str) -> Vec<Cookie<'static>> {
    let mut cookies = Vec::new();

    for result in Cookie::split_parse_encoded(header.to_owned()) {
        match result {
            Ok(cookie) => cookies.push(cookie),
            Err(error) => {
                tracing::debug!(%error, "dropped a malformed cookie");
            }
        }
    }

    cookies
}

impl<State> Middleware<State> for CookieParser
where
    State: Send + Sync + 'static,
{
    fn call(&self, mut request: Request<State>, next: Next<State>) -> crate::middleware::BoxFuture {
        let parsed = request.header(COOKIE).map(parse_header).unwrap_or_default();

        let mut jar = CookieJar::new();
        let mut signed = HashMap::new();

        for cookie in parsed {
            if let Some(secrets) = &self.secrets {
                if cookie.value().starts_with("s:") {
                    signed.insert(
                        cookie.name().to_owned(),
                        unsign(cookie.value(), secrets),
                    );
                    continue;
                }
            }

            jar.add_original(cookie);
        }

        let head = request.head_mut();

        head.cookies = Some(jar);
        head.signed_cookies = self.secrets.as_ref().map(|_| signed);
        head.secrets = self.secrets.clone();

        next.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::CookieParser;
    use crate::cookies::{sign, SignedCookie};

    #[test]
    fn splits_signed_from_plain() {
        let signed_value = sign("7", "sec");
        let header = format!("uid={}; theme=dark", signed_value);

        let parsed = super::parse_header(&header);
        assert_eq!(parsed.len(), 2);

        let parser = CookieParser::signed("sec");
        let secrets = parser.secrets.as_ref().unwrap();

        assert_eq!(
            crate::cookies::unsign(&signed_value, secrets),
            SignedCookie::Valid("7".into())
        );
    }
}
