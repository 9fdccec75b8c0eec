//! Conveniently work with errors that may occur in an application.
//!

use http::StatusCode;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};

/// A type-erased source error.
///
pub type AnyError = Box<dyn StdError + Send + Sync + 'static>;

macro_rules! new_with_status {
    ($name:ident, $status:ident) => {
        #[inline]
        pub fn $name<E>(source: E) -> Self
        where
            E: Into<crate::error::AnyError>,
        {
            Self::new_with_status(source.into(), http::StatusCode::$status)
        }
    };
}

/// An error type that can be converted to a [`Response`](crate::Response).
///
/// Every error carries an HTTP status code and a boxed source. Errors that
/// describe an expected failure mode (a malformed request body, a payload
/// over the configured limit) are marked *operational*; their message is
/// safe to show to clients even in production. Everything else is reported
/// with a generic message unless the application runs in development.
///
#[derive(Debug)]
pub struct Error {
    status: StatusCode,
    operational: bool,
    source: AnyError,
}

/// An error type that contains an error message stored in a string.
///
#[derive(Debug)]
struct ErrorMessage {
    message: String,
}

impl Error {
    /// Returns a new `Error` with the provided source and a 500 status.
    ///
    #[inline]
    pub fn new<E>(source: E) -> Self
    where
        E: Into<AnyError>,
    {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            operational: false,
            source: source.into(),
        }
    }

    /// Returns a new `Error` with the provided message stored in a string.
    ///
    #[inline]
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorMessage {
            message: message.into(),
        })
    }

    new_with_status!(bad_request, BAD_REQUEST);
    new_with_status!(unauthorized, UNAUTHORIZED);
    new_with_status!(forbidden, FORBIDDEN);
    new_with_status!(not_found, NOT_FOUND);
    new_with_status!(payload_too_large, PAYLOAD_TOO_LARGE);
    new_with_status!(unsupported_media_type, UNSUPPORTED_MEDIA_TYPE);
    new_with_status!(gateway_timeout, GATEWAY_TIMEOUT);
    new_with_status!(internal_server_error, INTERNAL_SERVER_ERROR);

    /// Sets the status code of the response that will be generated from self.
    ///
    #[inline]
    pub fn with_status(self, status: StatusCode) -> Self {
        Self { status, ..self }
    }

    /// Marks the error as operational. Operational errors describe expected
    /// failure modes and keep their message in production.
    ///
    #[inline]
    pub fn as_operational(self) -> Self {
        Self {
            operational: true,
            ..self
        }
    }
}

impl Error {
    /// Returns the source of this error.
    ///
    pub fn source(&self) -> &(dyn StdError + 'static) {
        &*self.source
    }

    /// Returns the status code of this error.
    ///
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns true if the error is safe to report verbatim to clients.
    ///
    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Returns the chain of sources of this error, starting with the
    /// outermost.
    ///
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        let mut next = Some(self.source());

        std::iter::from_fn(move || {
            let current = next?;
            next = current.source();
            Some(current)
        })
    }
}

impl Error {
    #[inline]
    pub(crate) fn new_with_status(source: AnyError, status: StatusCode) -> Self {
        Self {
            status,
            operational: false,
            source,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.source, f)
    }
}

impl<T> From<T> for Error
where
    T: StdError + Send + Sync + 'static,
{
    #[inline]
    fn from(source: T) -> Self {
        Self::new(Box::new(source))
    }
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Payload<'a> {
            message: &'a str,
            #[serde(rename = "statusCode")]
            status_code: u16,
        }

        let message = self.source.to_string();
        let mut state = serializer.serialize_map(Some(1))?;

        state.serialize_entry(
            "error",
            &Payload {
                message: &message,
                status_code: self.status.as_u16(),
            },
        )?;
        state.end()
    }
}

impl StdError for ErrorMessage {}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.message, f)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use http::StatusCode;

    #[test]
    fn status_constructors() {
        let error = Error::bad_request(std::io::Error::other("invalid payload"));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let error = Error::payload_too_large(std::io::Error::other("too big"));
        assert_eq!(error.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn operational_marker() {
        let error = Error::message("boom");
        assert!(!error.is_operational());

        let error = error.as_operational();
        assert!(error.is_operational());
        assert_eq!(error.to_string(), "boom");
    }

    #[test]
    fn serializes_to_structured_payload() {
        let error = Error::message("boom").with_status(StatusCode::BAD_REQUEST);
        let json = serde_json::to_string(&error).unwrap();

        assert_eq!(json, r#"{"error":{"message":"boom","statusCode":400}}"#);
    }
}
