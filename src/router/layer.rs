use std::sync::Arc;

use super::pattern::{PathPattern, PatternMatch};
use super::route::Route;
use super::router::Router;
use crate::middleware::{ErrorMiddleware, Middleware};

/// One entry in a router's stack: a compiled pattern bound to a handler.
///
/// Route layers match in exact mode and never strip the path. Every other
/// kind matches in prefix mode; the matched prefix moves from `path` to
/// `base_url` for the duration of the handler.
///
pub(crate) struct Layer<State> {
    pub pattern: PathPattern,
    pub kind: LayerKind<State>,
}

pub(crate) enum LayerKind<State> {
    /// Plain middleware, skipped while the pipeline is in error mode.
    Middleware(Arc<dyn Middleware<State>>),

    /// Error middleware, only reachable while the pipeline is in error
    /// mode.
    ErrorHandler(Arc<dyn ErrorMiddleware<State>>),

    /// An exact-match collection of method handlers.
    Route(Arc<Route<State>>),

    /// A nested router. Its stack is fully walked before control returns
    /// to this router.
    Router(Arc<Router<State>>),
}

impl<State> Layer<State> {
    pub fn new(pattern: PathPattern, kind: LayerKind<State>) -> Self {
        Self { pattern, kind }
    }

    #[inline]
    pub fn matches(&self, path: &str) -> Option<PatternMatch> {
        self.pattern.matches(path)
    }

    /// Returns true if the layer participates in the current dispatch
    /// mode.
    ///
    pub fn runs_in(&self, error_mode: bool) -> bool {
        matches!(self.kind, LayerKind::ErrorHandler(_)) == error_mode
    }
}
