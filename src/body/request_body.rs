use bytes::{Bytes, BytesMut};
use http_body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::error::{AnyError, Error};

/// The byte stream of an incoming request.
///
/// The stream can be aggregated into a contiguous buffer with
/// [`RequestBody::aggregate`], which enforces an upper bound on the number
/// of bytes read.
///
pub struct RequestBody {
    body: UnsyncBoxBody<Bytes, AnyError>,
}

impl RequestBody {
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<AnyError>,
    {
        Self {
            body: UnsyncBoxBody::new(body.map_err(|error| error.into())),
        }
    }

    /// Returns an empty request body.
    ///
    pub fn empty() -> Self {
        Self::new(Empty::new().map_err(|error: std::convert::Infallible| -> AnyError { match error {} }))
    }

    /// Returns a request body that yields the provided bytes as one frame.
    ///
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::new(Full::new(bytes).map_err(|error: std::convert::Infallible| -> AnyError { match error {} }))
    }

    /// Reads the entire stream into a contiguous buffer, failing with a
    /// `413 Payload Too Large` as soon as more than `limit` bytes have been
    /// observed.
    ///
    pub async fn aggregate(mut self, limit: u64) -> Result<Bytes, Error> {
        if self.body.size_hint().lower() > limit {
            return Err(too_large(limit));
        }

        let mut buffer = BytesMut::new();

        while let Some(result) = self.body.frame().await {
            let frame = result.map_err(Error::bad_request)?;

            if let Ok(data) = frame.into_data() {
                if (buffer.len() + data.len()) as u64 > limit {
                    return Err(too_large(limit));
                }

                buffer.extend_from_slice(&data);
            }
        }

        Ok(buffer.freeze())
    }
}

fn too_large(limit: u64) -> Error {
    Error::payload_too_large(std::io::Error::other(format!(
        "request entity exceeded the limit of {} bytes",
        limit
    )))
    .as_operational()
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::RequestBody;
    use bytes::Bytes;
    use http::StatusCode;

    #[tokio::test]
    async fn aggregates_within_limit() {
        let body = RequestBody::from_bytes(Bytes::from_static(b"hello"));
        let bytes = body.aggregate(5).await.unwrap();

        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn rejects_when_over_limit_by_one() {
        let body = RequestBody::from_bytes(Bytes::from_static(b"hello!"));
        let error = body.aggregate(5).await.unwrap_err();

        assert_eq!(error.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn empty_body_aggregates_to_nothing() {
        let body = RequestBody::empty();
        let bytes = body.aggregate(1024).await.unwrap();

        assert!(bytes.is_empty());
    }
}
