use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::AnyError;

/// The byte stream of an outgoing response.
///
/// Buffered payloads keep their bytes available so `Content-Length` and
/// response ETags can be derived without consuming the stream. Streaming
/// payloads are boxed and polled frame by frame.
///
pub enum ResponseBody {
    Buffer(BufferBody),
    Stream(UnsyncBoxBody<Bytes, AnyError>),
}

/// A response body that yields a single contiguous buffer.
///
#[derive(Debug, Default)]
pub struct BufferBody {
    data: Option<Bytes>,
}

impl ResponseBody {
    /// Returns an empty, buffered response body.
    ///
    pub fn empty() -> Self {
        Self::Buffer(BufferBody { data: None })
    }

    pub fn from_string(string: String) -> Self {
        Self::from_bytes(Bytes::from(string))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::from_bytes(Bytes::from(bytes))
    }

    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::Buffer(BufferBody { data: Some(bytes) })
    }

    /// Box the provided body so it can be streamed frame by frame.
    ///
    pub fn from_dyn<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<AnyError>,
    {
        Self::Stream(UnsyncBoxBody::new(body.map_err(|error| error.into())))
    }

    /// Returns the number of bytes in the body when it is buffered.
    ///
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Buffer(buffer) => {
                Some(buffer.data.as_ref().map_or(0, |bytes| bytes.len() as u64))
            }
            Self::Stream(_) => None,
        }
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }

    /// Returns a reference to the buffered bytes, if the body is buffered
    /// and has not been polled.
    ///
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Buffer(buffer) => buffer.data.as_ref(),
            Self::Stream(_) => None,
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl Body for BufferBody {
    type Data = Bytes;
    type Error = AnyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut().data.take() {
            Some(bytes) if !bytes.is_empty() => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            _ => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.data.as_ref().map_or(true, |bytes| bytes.is_empty())
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.data.as_ref().map_or(0, |bytes| bytes.len() as u64))
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = AnyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        context: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffer(buffer) => Pin::new(buffer).poll_frame(context),
            Self::Stream(stream) => Pin::new(stream).poll_frame(context),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffer(buffer) => buffer.is_end_stream(),
            Self::Stream(stream) => stream.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Buffer(buffer) => Body::size_hint(buffer),
            Self::Stream(stream) => stream.size_hint(),
        }
    }
}

impl From<String> for ResponseBody {
    fn from(string: String) -> Self {
        Self::from_string(string)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(buffer) => f.debug_tuple("Buffer").field(buffer).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}
