use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::layer::{Layer, LayerKind};
use super::pattern::{PathPattern, PatternOptions};
use super::route::Route;
use crate::error::Error;
use crate::middleware::{ErrorMiddleware, Middleware};
use crate::request::Request;

pub type BoxParamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

/// A preprocessor for one named path parameter.
///
/// Preprocessors registered with [`Router::param`] run in registration
/// order after a layer matches and before its handler is invoked, once per
/// distinct captured value per request. An error short-circuits the
/// pipeline into error mode.
///
pub trait ParamGuard<State = ()>: Send + Sync {
    fn call<'a>(&'a self, request: &'a mut Request<State>, value: &'a str) -> BoxParamFuture<'a>;
}

impl<State, F> ParamGuard<State> for F
where
    F: Fn(&mut Request<State>, &str) -> Result<(), Error> + Send + Sync,
{
    fn call<'a>(&'a self, request: &'a mut Request<State>, value: &'a str) -> BoxParamFuture<'a> {
        let result = self(request, value);
        Box::pin(std::future::ready(result))
    }
}

/// An ordered stack of layers with mount-path stripping and parameter
/// preprocessors.
///
/// Layers dispatch strictly in registration order. Middleware registered
/// with [`Router::use_at`] matches path prefixes at segment boundaries;
/// routes created with [`Router::route`] match the whole path. Routers
/// nest with [`Router::use_router`], which walks the nested stack to
/// completion before control returns to this router.
///
pub struct Router<State = ()> {
    pub(crate) stack: Vec<Arc<Layer<State>>>,
    pub(crate) params: HashMap<String, Vec<Arc<dyn ParamGuard<State>>>>,
    pub(crate) merge_params: bool,
    sensitive: bool,
    strict: bool,
}

macro_rules! router_method {
    ($name:ident, $method:ident) => {
        /// Register a handler for this method at the provided path. Sugar
        /// over `route(path)`.
        ///
        pub fn $name<T>(&mut self, path: &str, handler: T) -> &mut Self
        where
            T: Middleware<State> + 'static,
        {
            self.route(path).$name(handler);
            self
        }
    };
}

impl<State> Router<State> {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            params: HashMap::new(),
            merge_params: false,
            sensitive: false,
            strict: false,
        }
    }

    /// Literal characters in patterns registered after this call match
    /// case-sensitively.
    ///
    pub fn case_sensitive(&mut self, sensitive: bool) -> &mut Self {
        self.sensitive = sensitive;
        self
    }

    /// Routes registered after this call distinguish trailing slashes.
    ///
    pub fn strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    /// Layers of this router see parameters captured by the parent router
    /// merged underneath their own captures.
    ///
    pub fn merge_params(&mut self, merge: bool) -> &mut Self {
        self.merge_params = merge;
        self
    }

    /// Append prefix-mode middleware at the provided path.
    ///
    /// While the middleware runs, the matched prefix moves from the
    /// request's `path` to its `base_url`; both are restored before the
    /// next sibling layer is considered.
    ///
    /// # Panics
    ///
    /// Panics when the path is not a valid pattern.
    ///
    pub fn use_at<T>(&mut self, path: &str, middleware: T) -> &mut Self
    where
        T: Middleware<State> + 'static,
    {
        let pattern = self.compile(path, false);

        self.stack.push(Arc::new(Layer::new(
            pattern,
            LayerKind::Middleware(Arc::new(middleware)),
        )));
        self
    }

    /// Append prefix-mode middleware that runs for every request.
    ///
    pub fn use_any<T>(&mut self, middleware: T) -> &mut Self
    where
        T: Middleware<State> + 'static,
    {
        self.use_at("/", middleware)
    }

    /// Append error middleware at the provided path. Error middleware is
    /// skipped in normal dispatch and only runs once the pipeline has
    /// switched into error mode.
    ///
    pub fn use_error_at<T>(&mut self, path: &str, middleware: T) -> &mut Self
    where
        T: ErrorMiddleware<State> + 'static,
    {
        let pattern = self.compile(path, false);

        self.stack.push(Arc::new(Layer::new(
            pattern,
            LayerKind::ErrorHandler(Arc::new(middleware)),
        )));
        self
    }

    /// Append error middleware that runs for every request in error mode.
    ///
    pub fn use_error<T>(&mut self, middleware: T) -> &mut Self
    where
        T: ErrorMiddleware<State> + 'static,
    {
        self.use_error_at("/", middleware)
    }

    /// Mount another router at the provided path prefix. The nested
    /// router's layers see the request path relative to the prefix.
    ///
    pub fn use_router(&mut self, path: &str, router: Router<State>) -> &mut Self {
        let pattern = self.compile(path, false);

        self.stack.push(Arc::new(Layer::new(
            pattern,
            LayerKind::Router(Arc::new(router)),
        )));
        self
    }

    pub(crate) fn use_router_shared(&mut self, path: &str, router: Arc<Router<State>>) -> &mut Self {
        let pattern = self.compile(path, false);

        self.stack
            .push(Arc::new(Layer::new(pattern, LayerKind::Router(router))));
        self
    }

    /// Create (and return for chaining) a route matching the whole path.
    ///
    /// ```
    /// use trellis::{Next, Request, Response, Router};
    ///
    /// async fn list(_: Request, _: Next) -> trellis::Result {
    ///     Response::build().text("list".to_owned())
    /// }
    ///
    /// let mut router = Router::new();
    /// router.route("/articles").get(list);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics when the path is not a valid pattern, or when called after
    /// the router has started dispatching requests.
    ///
    pub fn route(&mut self, path: &str) -> &mut Route<State> {
        let pattern = self.compile(path, true);

        self.stack.push(Arc::new(Layer::new(
            pattern,
            LayerKind::Route(Arc::new(Route::new())),
        )));

        match &mut Arc::get_mut(self.stack.last_mut().expect("a layer was just pushed"))
            .expect("a route cannot be modified once dispatching has begun")
            .kind
        {
            LayerKind::Route(route) => Arc::get_mut(route)
                .expect("a route cannot be modified once dispatching has begun"),
            _ => unreachable!("the layer was just created as a route"),
        }
    }

    router_method!(connect, CONNECT);
    router_method!(delete, DELETE);
    router_method!(get, GET);
    router_method!(head, HEAD);
    router_method!(options, OPTIONS);
    router_method!(patch, PATCH);
    router_method!(post, POST);
    router_method!(put, PUT);
    router_method!(trace, TRACE);

    /// Register a handler at the provided path that runs for every
    /// method.
    ///
    pub fn all<T>(&mut self, path: &str, handler: T) -> &mut Self
    where
        T: Middleware<State> + 'static,
    {
        self.route(path).all(handler);
        self
    }

    /// Register a preprocessor for the named parameter. Preprocessors for
    /// a given parameter run in registration order.
    ///
    pub fn param<T>(&mut self, name: impl Into<String>, guard: T) -> &mut Self
    where
        T: ParamGuard<State> + 'static,
    {
        self.params
            .entry(name.into())
            .or_default()
            .push(Arc::new(guard));
        self
    }

    pub(crate) fn guards_for(&self, name: &str) -> Option<&[Arc<dyn ParamGuard<State>>]> {
        self.params.get(name).map(Vec::as_slice)
    }

    fn compile(&self, path: &str, end: bool) -> PathPattern {
        let options = PatternOptions {
            end,
            strict: self.strict,
            sensitive: self.sensitive,
        };

        match PathPattern::compile(path, options) {
            Ok(pattern) => pattern,
            Err(error) => panic!("{}", error),
        }
    }
}

impl<State> Default for Router<State> {
    fn default() -> Self {
        Self::new()
    }
}
