use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use futures_core::Stream;
use http::StatusCode;
use http_body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use super::etag;
use super::resolve::ResolvedFile;
use super::ServeOptions;
use crate::body::ResponseBody;
use crate::error::{AnyError, Error};
use crate::response::Response;

/// Files below this size are read into memory in one blocking call;
/// larger files are streamed from disk frame by frame.
///
const EAGER_READ_THRESHOLD: u64 = 1024 * 1024;

/// A response body that streams a file from disk. An I/O error during
/// streaming surfaces as a body error and terminates the connection; the
/// headers are already on the wire and cannot be rewritten.
///
struct FileStreamBody {
    stream: ReaderStream<tokio::fs::File>,
    remaining: u64,
}

impl Body for FileStreamBody {
    type Data = Bytes;
    type Error = AnyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        context: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        match Pin::new(&mut this.stream).poll_next(context) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.remaining = this.remaining.saturating_sub(bytes.len() as u64);
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Poll::Ready(Some(Err(error))) => Poll::Ready(Some(Err(error.into()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }
}

/// The freshness of a conditional request against the file's validators.
///
fn is_fresh(
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
    etag: Option<&str>,
    modified: Option<SystemTime>,
) -> bool {
    if let (Some(header), Some(etag)) = (if_none_match, etag) {
        return etag::matches(header, etag);
    }

    if let (Some(header), Some(modified)) = (if_modified_since, modified) {
        if let Ok(since) = httpdate::parse_http_date(header) {
            // HTTP dates carry second precision.
            let modified = round_to_seconds(modified);
            return modified <= since;
        }
    }

    false
}

fn round_to_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(elapsed) => SystemTime::UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()),
        Err(_) => time,
    }
}

/// Build the success response for a resolved file, honoring conditional
/// request headers and the configured cache headers.
///
pub(crate) async fn respond_with_file(
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
    is_head: bool,
    file: ResolvedFile,
    options: &ServeOptions,
) -> Result<Response, Error> {
    let size = file.metadata.len();
    let modified = file.metadata.modified().ok();

    let etag = if options.etag {
        modified.and_then(|time| etag::generate(time, size, options.weak_etags))
    } else {
        None
    };

    let mut response = Response::build()
        .header(CONTENT_TYPE, file.mime_type.as_str())
        .finish()?;

    if let Some(etag) = &etag {
        if let Ok(value) = etag.parse() {
            response.headers_mut().insert(ETAG, value);
        }
    }

    if options.last_modified {
        if let Some(modified) = modified {
            let value = httpdate::fmt_http_date(modified);

            if let Ok(value) = value.parse() {
                response.headers_mut().insert(LAST_MODIFIED, value);
            }
        }
    }

    if !options.max_age.is_zero() {
        let value = format!("public, max-age={}", options.max_age.as_secs());

        if let Ok(value) = value.parse() {
            response.headers_mut().insert(CACHE_CONTROL, value);
        }
    }

    if let Some(hook) = &options.set_headers {
        hook(&mut response, &file.path, &file.metadata);
    }

    // A fresh cached representation short-circuits to 304 without a body
    // and without a Content-Length.
    if is_fresh(if_none_match, if_modified_since, etag.as_deref(), modified) {
        response.set_status(StatusCode::NOT_MODIFIED);
        response.headers_mut().remove(CONTENT_LENGTH);
        response.headers_mut().remove(CONTENT_TYPE);
        return Ok(response);
    }

    if let Ok(value) = size.to_string().parse() {
        response.headers_mut().insert(CONTENT_LENGTH, value);
    }

    // HEAD responses carry the entity headers only; the service layer
    // also suppresses any body for HEAD as a backstop.
    if is_head {
        return Ok(response);
    }

    let mut handle = tokio::fs::File::open(&file.path)
        .await
        .map_err(Error::not_found)?;

    if size < EAGER_READ_THRESHOLD {
        let mut buffer = Vec::with_capacity(size as usize);

        handle
            .read_to_end(&mut buffer)
            .await
            .map_err(Error::internal_server_error)?;

        *response.body_mut() = ResponseBody::from_vec(buffer);
    } else {
        *response.body_mut() = ResponseBody::from_dyn(FileStreamBody {
            stream: ReaderStream::new(handle),
            remaining: size,
        });
    }

    Ok(response)
}

/// Respond with the file at `path`: content type from the extension,
/// derived validators, a streamed body for large files. The building
/// block behind `Response`-level file sending.
///
pub async fn send_file(path: impl AsRef<std::path::Path>) -> Result<Response, Error> {
    let path = path.as_ref().to_path_buf();

    let file = tokio::task::spawn_blocking(move || super::resolve::stat_for_send(path))
        .await
        .map_err(Error::internal_server_error)??;

    let size = file.metadata.len();
    let modified = file.metadata.modified().ok();

    let mut response = Response::build()
        .header(CONTENT_TYPE, file.mime_type.as_str())
        .header(CONTENT_LENGTH, size)
        .finish()?;

    if let Some(etag) = modified.and_then(|time| etag::generate(time, size, true)) {
        if let Ok(value) = etag.parse() {
            response.headers_mut().insert(ETAG, value);
        }
    }

    if let Some(modified) = modified {
        if let Ok(value) = httpdate::fmt_http_date(modified).parse() {
            response.headers_mut().insert(LAST_MODIFIED, value);
        }
    }

    let mut handle = tokio::fs::File::open(&file.path)
        .await
        .map_err(Error::not_found)?;

    if size < EAGER_READ_THRESHOLD {
        let mut buffer = Vec::with_capacity(size as usize);

        handle
            .read_to_end(&mut buffer)
            .await
            .map_err(Error::internal_server_error)?;

        *response.body_mut() = ResponseBody::from_vec(buffer);
    } else {
        *response.body_mut() = ResponseBody::from_dyn(FileStreamBody {
            stream: ReaderStream::new(handle),
            remaining: size,
        });
    }

    Ok(response)
}
