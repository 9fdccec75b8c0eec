use http::header::LOCATION;
use http::StatusCode;

use super::response::Response;
use crate::error::Error;
use crate::request::Request;

/// A collection of functions used to generate redirect responses.
///
pub struct Redirect;

impl Redirect {
    /// Returns a response that redirects the client to the specified
    /// `location` with the status code `302 Found`, the default redirect
    /// status.
    ///
    pub fn found(location: &str) -> Result<Response, Error> {
        Self::with_status(location, StatusCode::FOUND)
    }

    /// Returns a response that redirects the client to the specified
    /// `location` with the status code `301 Moved Permanently`.
    ///
    pub fn moved_permanently(location: &str) -> Result<Response, Error> {
        Self::with_status(location, StatusCode::MOVED_PERMANENTLY)
    }

    /// Returns a response that redirects the client to the specified
    /// `location` with the status code `303 See Other`.
    ///
    pub fn see_other(location: &str) -> Result<Response, Error> {
        Self::with_status(location, StatusCode::SEE_OTHER)
    }

    /// Returns a response that redirects the client to the specified
    /// `location` with the status code `307 Temporary Redirect`.
    ///
    pub fn temporary(location: &str) -> Result<Response, Error> {
        Self::with_status(location, StatusCode::TEMPORARY_REDIRECT)
    }

    /// Returns a response that redirects the client to the specified
    /// `location` with the status code `308 Permanent Redirect`.
    ///
    pub fn permanent(location: &str) -> Result<Response, Error> {
        Self::with_status(location, StatusCode::PERMANENT_REDIRECT)
    }

    /// Redirect back to the request's `Referer`, or to `/` when the
    /// header is absent.
    ///
    pub fn back<State>(request: &Request<State>) -> Result<Response, Error> {
        Self::found(request.referrer().unwrap_or("/"))
    }

    /// Returns a response that redirects the client to the specified
    /// `location` with the provided redirection status.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided `location` cannot be parsed into
    /// an HTTP header value or if `status` is not a redirect status.
    ///
    pub fn with_status(location: &str, status: StatusCode) -> Result<Response, Error> {
        if !status.is_redirection() {
            return Err(Error::message(format!(
                "redirect status out of range: {}",
                status
            )));
        }

        Response::build()
            .status(status)
            .header(LOCATION, location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Redirect;
    use http::header::LOCATION;
    use http::StatusCode;

    #[test]
    fn found_is_the_default() {
        let response = Redirect::found("/login").unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
    }

    #[test]
    fn rejects_non_redirect_statuses() {
        assert!(Redirect::with_status("/", StatusCode::OK).is_err());
    }
}
