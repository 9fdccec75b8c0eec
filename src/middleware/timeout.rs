use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use super::middleware::{BoxFuture, Middleware};
use super::next::Next;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Middleware that bounds how long downstream layers may take to produce
/// a response. The engine itself never imposes a deadline; this is
/// opt-in, per mount point.
///
/// On expiry the pipeline fails with an operational `504 Gateway
/// Timeout`, rendered by the final handler like any other error unless
/// an error layer intercepts it first. [`Timeout::or_respond`] replaces
/// the failure with a response of the application's choosing.
///
pub struct Timeout {
    duration: Duration,
    fallback: Option<Arc<dyn Fn() -> Result<Response, Error> + Send + Sync>>,
}

/// Returns middleware that fails downstream dispatch after `duration`.
///
pub fn timeout(duration: Duration) -> Timeout {
    Timeout {
        duration,
        fallback: None,
    }
}

fn deadline_error(duration: Duration) -> Error {
    Error::gateway_timeout(std::io::Error::other(format!(
        "no response within {} seconds",
        duration.as_secs_f64()
    )))
    .as_operational()
}

impl Timeout {
    /// Respond with the provided closure's response on expiry instead of
    /// failing the pipeline.
    ///
    pub fn or_respond<F>(mut self, respond: F) -> Self
    where
        F: Fn() -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(respond));
        self
    }
}

impl<State> Middleware<State> for Timeout
where
    State: Send + Sync + 'static,
{
    fn call(&self, request: Request<State>, next: Next<State>) -> BoxFuture {
        let duration = self.duration;
        let fallback = self.fallback.clone();

        Box::pin(async move {
            match time::timeout(duration, next.call(request)).await {
                Ok(result) => result,
                Err(_) => match fallback {
                    Some(respond) => respond(),
                    None => Err(deadline_error(duration)),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::timeout;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Empty;
    use std::time::Duration;

    use crate::app::app;
    use crate::middleware::Next;
    use crate::request::Request;
    use crate::response::Response;

    fn get(uri: &str) -> http::Request<Empty<Bytes>> {
        http::Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .body(Empty::new())
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_fails_with_a_gateway_timeout() {
        let mut app = app(());

        app.use_any(timeout(Duration::from_secs(1)));

        app.get("/slow", |_: Request, _: Next| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Response::build().text("too late".to_owned())
        });

        let service = app.into_service();
        let response = service.dispatch(get("/slow")).await;

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn or_respond_overrides_the_failure() {
        let mut app = app(());

        app.use_any(timeout(Duration::from_secs(1)).or_respond(|| {
            let mut response = Response::text("try again shortly".to_owned());

            response.set_status(StatusCode::SERVICE_UNAVAILABLE);
            Ok(response)
        }));

        app.get("/slow", |_: Request, _: Next| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Response::build().text("too late".to_owned())
        });

        let service = app.into_service();
        let response = service.dispatch(get("/slow")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_responses_pass_through() {
        let mut app = app(());

        app.use_any(timeout(Duration::from_secs(1)));

        app.get("/fast", |_: Request, _: Next| async {
            Response::build().text("in time".to_owned())
        });

        let service = app.into_service();
        let response = service.dispatch(get("/fast")).await;

        assert_eq!(response.status(), StatusCode::OK);
    }
}
