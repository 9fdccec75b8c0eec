use std::future::Future;
use std::pin::Pin;

use super::next::Next;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// The output of the `Future` returned from middleware.
///
pub type Result = std::result::Result<Response, Error>;
pub type BoxFuture<T = Result> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// One unit of the dispatch pipeline.
///
/// A middleware either produces a response itself, delegates by calling
/// [`Next::call`], or switches the pipeline into error mode with
/// [`Next::fail`]. Returning an `Err` unwinds through the enclosing
/// middleware to the application's final handler.
///
pub trait Middleware<State = ()>: Send + Sync {
    fn call(&self, request: Request<State>, next: Next<State>) -> BoxFuture;
}

impl<State, F, T> Middleware<State> for T
where
    T: Fn(Request<State>, Next<State>) -> F + Send + Sync,
    F: Future<Output = Result> + Send + 'static,
{
    fn call(&self, request: Request<State>, next: Next<State>) -> BoxFuture {
        Box::pin(self(request, next))
    }
}

/// A middleware that only runs while the pipeline is in error mode.
///
/// Error middleware is tagged explicitly at registration (see
/// [`Router::use_error`](crate::Router::use_error)); it receives the live
/// error and may respond, repair the pipeline by calling [`Next::call`],
/// or pass the error along with [`Next::fail`].
///
pub trait ErrorMiddleware<State = ()>: Send + Sync {
    fn call(&self, error: Error, request: Request<State>, next: Next<State>) -> BoxFuture;
}

impl<State, F, T> ErrorMiddleware<State> for T
where
    T: Fn(Error, Request<State>, Next<State>) -> F + Send + Sync,
    F: Future<Output = Result> + Send + 'static,
{
    fn call(&self, error: Error, request: Request<State>, next: Next<State>) -> BoxFuture {
        Box::pin(self(error, request, next))
    }
}
