//! A composable HTTP web framework built around a request-dispatch
//! engine: a `next`-driven middleware pipeline, a mountable router with
//! compiled path patterns and parameter extraction, and the protocol
//! helpers that lean on the engine's contracts — body parsers, static
//! file serving with conditional GET, signed cookies, and server-side
//! sessions.
//!
//! ```no_run
//! use trellis::{Application, Next, Request, Response};
//!
//! async fn hello(request: Request, _: Next) -> trellis::Result {
//!     let name = request.param("name").unwrap_or("world").to_owned();
//!     Response::build().text(format!("Hello, {}!", name))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), trellis::Error> {
//!     let mut app = Application::new();
//!
//!     app.get("/hello/:name?", hello);
//!     app.listen("127.0.0.1:3000").await
//! }
//! ```

mod app;
mod error;
mod router;
mod view;

pub mod body;
pub mod body_parser;
pub mod cookies;
pub mod middleware;
pub mod request;
pub mod response;
pub mod serve_static;
pub mod session;

pub use http;

pub use crate::{
    app::{app, AppContext, Application, AppService},
    app::{Cidr, Env, EtagMode, QueryParserMode, SettingValue, Settings, TrustProxy},
    error::{AnyError, Error},
    middleware::{BoxFuture, CookieParser, ErrorMiddleware, Middleware, Next, Result},
    request::{Params, Request},
    response::{Redirect, Response, ResponseBuilder},
    router::{InvalidPattern, Key, ParamGuard, PathPattern, PatternMatch, PatternOptions, Route, Router},
    view::ViewEngine,
};
