use serde_json::{Map, Value};
use std::path::Path;
use std::pin::Pin;

use crate::error::Error;

/// The contract a template engine satisfies to be registered with an
/// application. Rendering itself is out of scope for the framework; the
/// registry only dispatches on the view file extension.
///
pub trait ViewEngine: Send + Sync {
    /// Render the template at `path` with the provided locals.
    ///
    fn render(
        &self,
        path: &Path,
        locals: &Map<String, Value>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<String, Error>> + Send + 'static>>;
}
