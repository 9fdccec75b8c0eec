//! Content-Type-gated request body parsers.
//!
//! Each parser is prefix middleware: when the request declares a body
//! whose content type matches the parser's `type` option, the body is
//! aggregated (up to `limit`), optionally inflated, decoded, parsed, and
//! attached to the request; otherwise the parser steps aside with
//! `next.call`. Failures switch the pipeline into error mode with the
//! appropriate status: 413 over `limit`, 415 for an unsupported charset
//! or content encoding, 400 for a payload that does not parse.

mod json;
mod raw;
mod text;
mod urlencoded;

pub use json::{json, Json};
pub use raw::{raw, Raw};
pub use text::{text, Text};
pub use urlencoded::{urlencoded, UrlEncoded};

use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use std::io::Read;
use std::sync::Arc;

use crate::body::parse_limit;
use crate::error::Error;
use crate::request::{type_matches, Request};

/// The payload a body parser attached to the request. Its presence also
/// marks the body as consumed, so later parsers step aside.
///
#[derive(Clone, Debug)]
pub enum ParsedBody {
    Json(serde_json::Value),
    Form(serde_json::Map<String, serde_json::Value>),
    Raw(Bytes),
    Text(String),
}

/// How a parser decides whether a request is for it.
///
pub(crate) enum TypeMatcher<State> {
    /// Content-type patterns with the same grammar as
    /// [`Request::is`](crate::Request::is): shorthands, full types, and
    /// wildcards.
    Patterns(Vec<String>),

    /// An arbitrary predicate on the request.
    Predicate(Arc<dyn Fn(&Request<State>) -> bool + Send + Sync>),
}

impl<State> Clone for TypeMatcher<State> {
    fn clone(&self) -> Self {
        match self {
            Self::Patterns(patterns) => Self::Patterns(patterns.clone()),
            Self::Predicate(predicate) => Self::Predicate(Arc::clone(predicate)),
        }
    }
}

impl<State> TypeMatcher<State> {
    pub fn matches(&self, request: &Request<State>) -> bool {
        match self {
            Self::Patterns(patterns) => match request.header(CONTENT_TYPE) {
                Some(content_type) => patterns
                    .iter()
                    .any(|pattern| type_matches(content_type, pattern)),
                None => false,
            },
            Self::Predicate(predicate) => predicate(request),
        }
    }
}

/// A hook that observes the raw payload before parsing. Returning an
/// error rejects the request.
///
pub(crate) type VerifyHook<State> =
    Arc<dyn Fn(&Request<State>, &Bytes) -> Result<(), Error> + Send + Sync>;

/// Parse a human readable limit at registration time.
///
/// # Panics
///
/// Panics when the string does not describe a size.
///
pub(crate) fn require_limit(input: &str) -> u64 {
    match parse_limit(input) {
        Some(limit) => limit,
        None => panic!("invalid body limit {:?}", input),
    }
}

/// Returns true when the request declares a body: a transfer encoding or
/// a non-zero content length. Methods without either have no body
/// semantics and fall through untouched.
///
pub(crate) fn has_body<State>(request: &Request<State>) -> bool {
    if request.headers().contains_key(TRANSFER_ENCODING) {
        return true;
    }

    request
        .header(CONTENT_LENGTH)
        .and_then(|value| value.parse::<u64>().ok())
        .is_some_and(|length| length > 0)
}

/// Returns the charset parameter of the request content type, lowercased.
///
pub(crate) fn charset<State>(request: &Request<State>) -> Option<String> {
    let content_type = request.header(CONTENT_TYPE)?;

    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;

        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

fn unsupported_encoding(encoding: &str) -> Error {
    Error::unsupported_media_type(std::io::Error::other(format!(
        "unsupported content encoding {:?}",
        encoding
    )))
    .as_operational()
}

/// Aggregate the request body up to `limit` bytes and reverse any content
/// encoding. The limit also applies to the inflated payload.
///
pub(crate) async fn read_body<State>(
    request: &mut Request<State>,
    limit: u64,
    inflate: bool,
) -> Result<Bytes, Error> {
    let encoding = request
        .header(CONTENT_ENCODING)
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "identity".to_owned());

    if encoding != "identity" && !inflate {
        return Err(unsupported_encoding(&encoding));
    }

    let body = request.take_body();
    let bytes = body.aggregate(limit).await?;

    match encoding.as_str() {
        "identity" => Ok(bytes),
        "gzip" | "x-gzip" => inflate_with(GzDecoder::new(&bytes[..]), limit),
        "deflate" => inflate_with(ZlibDecoder::new(&bytes[..]), limit),
        other => Err(unsupported_encoding(other)),
    }
}

fn inflate_with<R: Read>(reader: R, limit: u64) -> Result<Bytes, Error> {
    let mut output = Vec::new();
    let mut bounded = reader.take(limit + 1);

    bounded
        .read_to_end(&mut output)
        .map_err(|error| Error::bad_request(error).as_operational())?;

    if output.len() as u64 > limit {
        return Err(Error::payload_too_large(std::io::Error::other(format!(
            "inflated request entity exceeded the limit of {} bytes",
            limit
        )))
        .as_operational());
    }

    Ok(Bytes::from(output))
}

/// Decode a payload with the provided charset. UTF-8 and its US-ASCII
/// subset are decoded directly; ISO-8859-1 maps bytes to code points.
/// Anything else is unsupported.
///
pub(crate) fn decode_charset(bytes: &Bytes, charset: &str) -> Result<String, Error> {
    match charset {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|error| Error::unsupported_media_type(error).as_operational()),
        "iso-8859-1" | "latin1" => Ok(bytes.iter().map(|byte| *byte as char).collect()),
        other => Err(Error::unsupported_media_type(std::io::Error::other(format!(
            "unsupported charset {:?}",
            other
        )))
        .as_operational()),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_charset, inflate_with, require_limit};
    use bytes::Bytes;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use http::StatusCode;
    use std::io::Write;

    #[test]
    fn limits_parse_at_registration() {
        assert_eq!(require_limit("100kb"), 102400);
    }

    #[test]
    #[should_panic(expected = "invalid body limit")]
    fn bad_limits_panic_at_registration() {
        require_limit("several");
    }

    #[test]
    fn inflate_respects_the_limit() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

        encoder.write_all(&[0u8; 4096]).unwrap();

        let compressed = encoder.finish().unwrap();
        let error = inflate_with(
            flate2::read::GzDecoder::new(&compressed[..]),
            1024,
        )
        .unwrap_err();

        assert_eq!(error.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn charsets_decode_or_reject() {
        let bytes = Bytes::from_static(b"caf\xe9");

        assert!(decode_charset(&bytes, "utf-8").is_err());
        assert_eq!(decode_charset(&bytes, "iso-8859-1").unwrap(), "café");

        let error = decode_charset(&bytes, "utf-16").unwrap_err();
        assert_eq!(error.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
