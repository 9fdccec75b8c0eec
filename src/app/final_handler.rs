//! The handler of last resort.
//!
//! When the pipeline is exhausted in normal mode the request never
//! matched, so a 404 is rendered here. When an error unwinds out of the
//! pipeline (or error mode exhausts the stack) the error is rendered with
//! a JSON payload, or a minimal HTML page when the client prefers HTML.
//! Production mode replaces the message of non-operational errors with the
//! canonical status text so internal details never leak.

use http::header::ACCEPT;
use http::StatusCode;
use serde_json::json;

use super::settings::Env;
use crate::error::Error;
use crate::request::{negotiate, Request};
use crate::response::Response;

pub(crate) fn not_found<State>(request: &Request<State>) -> Response {
    let error = Error::message(format!(
        "Cannot {} {}",
        request.method(),
        request.original_url()
    ))
    .with_status(StatusCode::NOT_FOUND)
    .as_operational();

    render(request.header(ACCEPT), &request.app().settings().env, &error)
}

pub(crate) fn render(accept: Option<&str>, env: &Env, error: &Error) -> Response {
    let status = error.status();

    let message = if env.is_production() && !error.is_operational() {
        status
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_owned()
    } else {
        error.to_string()
    };

    let mut response = if negotiate(accept, &["json", "html"]) == Some("html") {
        render_html(status, &message)
    } else {
        render_json(status, &message, env, error)
    };

    response.set_status(status);
    response
}

fn render_json(status: StatusCode, message: &str, env: &Env, error: &Error) -> Response {
    let mut payload = json!({
        "error": {
            "message": message,
            "statusCode": status.as_u16(),
        }
    });

    // Development builds expose the source chain for debugging.
    if !env.is_production() {
        let chain: Vec<String> = error.chain().skip(1).map(|source| source.to_string()).collect();

        if !chain.is_empty() {
            payload["error"]["chain"] = json!(chain);
        }
    }

    Response::json(&payload).unwrap_or_else(|residual| {
        tracing::error!(%residual, "failed to serialize an error payload");
        Response::text(message.to_owned())
    })
}

fn render_html(status: StatusCode, message: &str) -> Response {
    let title = status
        .canonical_reason()
        .unwrap_or("Error");

    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    Response::html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{} {}</title></head>\n\
         <body>\n<pre>{}</pre>\n</body>\n</html>\n",
        status.as_u16(),
        title,
        escaped,
    ))
}

#[cfg(test)]
mod tests {
    use super::render;
    use crate::app::settings::Env;
    use crate::error::Error;
    use http::StatusCode;

    #[test]
    fn production_masks_non_operational_messages() {
        let error = Error::message("database password rejected");

        let response = render(None, &Env::Production, &error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.body().as_bytes().unwrap();
        let text = std::str::from_utf8(body).unwrap();

        assert!(!text.contains("password"));
        assert!(text.contains("Internal Server Error"));
    }

    #[test]
    fn operational_messages_survive_production() {
        let error = Error::message("request entity too large")
            .with_status(StatusCode::PAYLOAD_TOO_LARGE)
            .as_operational();

        let response = render(None, &Env::Production, &error);
        let body = response.body().as_bytes().unwrap();

        assert!(std::str::from_utf8(body).unwrap().contains("too large"));
    }

    #[test]
    fn html_is_rendered_when_the_client_prefers_it() {
        let error = Error::message("boom");
        let response = render(Some("text/html"), &Env::Development, &error);

        let content_type = response.headers().get(http::header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/html"));

        let body = response.body().as_bytes().unwrap();
        assert!(std::str::from_utf8(body).unwrap().contains("<pre>boom</pre>"));
    }
}
