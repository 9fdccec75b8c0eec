mod layer;
mod pattern;
mod route;
#[allow(clippy::module_inception)]
mod router;

pub use pattern::{InvalidPattern, Key, PathPattern, PatternMatch, PatternOptions};
pub use route::Route;
pub use router::{ParamGuard, Router};

pub(crate) use layer::LayerKind;
