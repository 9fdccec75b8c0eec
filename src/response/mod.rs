mod builder;
mod format;
mod redirect;
mod response;

pub use builder::ResponseBuilder;
pub use format::{json, jsonp};
pub use redirect::Redirect;
pub use response::Response;
