pub mod cookie_parser;

mod middleware;
mod next;
mod timeout;

pub use cookie_parser::CookieParser;
pub use middleware::{BoxFuture, ErrorMiddleware, Middleware, Result};
pub use next::Next;
pub use timeout::{timeout, Timeout};
