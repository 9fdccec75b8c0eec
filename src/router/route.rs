use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::middleware::Middleware;

/// An exact-match collection of method-specific handlers sharing one path.
///
/// Handlers registered for the same method run in registration order. A
/// `HEAD` request falls through to `GET` handlers when no explicit `HEAD`
/// handler exists; the response body is suppressed during finalization.
///
/// A route whose method set does not cover the request method is skipped
/// as if it had not matched, so an exhausted pipeline reports 404 rather
/// than 405.
///
pub struct Route<State = ()> {
    pub(crate) stack: Vec<RouteLayer<State>>,
    methods: MethodSet,
}

pub(crate) struct RouteLayer<State> {
    method: Option<Method>,
    pub handler: Arc<dyn Middleware<State>>,
}

#[derive(Default)]
struct MethodSet {
    methods: SmallVec<[Method; 4]>,
    all: bool,
}

macro_rules! route_method {
    ($name:ident, $method:ident) => {
        pub fn $name<T>(&mut self, handler: T) -> &mut Self
        where
            T: Middleware<State> + 'static,
        {
            self.method(Method::$method, handler)
        }
    };
}

impl<State> Route<State> {
    pub(crate) fn new() -> Self {
        Self {
            stack: Vec::new(),
            methods: MethodSet::default(),
        }
    }

    route_method!(connect, CONNECT);
    route_method!(delete, DELETE);
    route_method!(get, GET);
    route_method!(head, HEAD);
    route_method!(options, OPTIONS);
    route_method!(patch, PATCH);
    route_method!(post, POST);
    route_method!(put, PUT);
    route_method!(trace, TRACE);

    /// Append a handler for the provided method.
    ///
    pub fn method<T>(&mut self, method: Method, handler: T) -> &mut Self
    where
        T: Middleware<State> + 'static,
    {
        self.methods.insert(&method);
        self.stack.push(RouteLayer {
            method: Some(method),
            handler: Arc::new(handler),
        });
        self
    }

    /// Append a handler that runs for every method.
    ///
    pub fn all<T>(&mut self, handler: T) -> &mut Self
    where
        T: Middleware<State> + 'static,
    {
        self.methods.all = true;
        self.stack.push(RouteLayer {
            method: None,
            handler: Arc::new(handler),
        });
        self
    }

    /// Returns true if at least one handler would run for the provided
    /// method.
    ///
    pub fn handles_method(&self, method: &Method) -> bool {
        self.methods.all
            || self.methods.contains(method)
            || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }

    /// Returns the methods the route declares handlers for.
    ///
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.methods.iter()
    }

    pub(crate) fn layer(&self, index: usize) -> Option<&RouteLayer<State>> {
        self.stack.get(index)
    }
}

impl<State> RouteLayer<State> {
    /// Returns true if this layer runs for the provided request method.
    ///
    pub fn accepts(&self, method: &Method) -> bool {
        match &self.method {
            None => true,
            Some(own) => own == method || (*method == Method::HEAD && *own == Method::GET),
        }
    }
}

impl MethodSet {
    fn insert(&mut self, method: &Method) {
        if !self.contains(method) {
            self.methods.push(method.clone());
        }
    }

    fn contains(&self, method: &Method) -> bool {
        self.methods.iter().any(|own| own == method)
    }
}

#[cfg(test)]
mod tests {
    use super::Route;
    use http::Method;

    use crate::middleware::Next;
    use crate::request::Request;
    use crate::response::Response;

    async fn noop(_: Request, _: Next) -> crate::Result {
        Response::build().finish()
    }

    #[test]
    fn handles_registered_methods() {
        let mut route: Route = Route::new();

        route.get(noop).post(noop);

        assert!(route.handles_method(&Method::GET));
        assert!(route.handles_method(&Method::POST));
        assert!(!route.handles_method(&Method::PUT));
    }

    #[test]
    fn head_falls_through_to_get() {
        let mut route: Route = Route::new();

        route.get(noop);
        assert!(route.handles_method(&Method::HEAD));

        let layer = route.layer(0).unwrap();
        assert!(layer.accepts(&Method::HEAD));
        assert!(layer.accepts(&Method::GET));
        assert!(!layer.accepts(&Method::POST));
    }

    #[test]
    fn all_covers_every_method() {
        let mut route: Route = Route::new();

        route.all(noop);

        assert!(route.handles_method(&Method::DELETE));
        assert!(route.handles_method(&Method::PATCH));
    }
}
