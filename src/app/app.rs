use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};

use super::context::AppContext;
use super::service::AppService;
use super::settings::Settings;
use crate::error::Error;
use crate::middleware::{ErrorMiddleware, Middleware};
use crate::router::{ParamGuard, Route, Router};
use crate::view::ViewEngine;

/// The root of a trellis application: a router plus the settings store,
/// locals, view engine registry, and mount graph.
///
/// Registration happens while the application is owned; calling
/// [`Application::listen`] or [`Application::into_service`] freezes the
/// router and hands it to the HTTP binding.
///
pub struct Application<State = ()> {
    router: Router<State>,
    context: Arc<AppContext>,
    state: Arc<State>,
}

/// Returns a new application that shares `state` with every request.
///
pub fn app<State>(state: State) -> Application<State>
where
    State: Send + Sync + 'static,
{
    Application {
        router: Router::new(),
        context: Arc::new(AppContext::new()),
        state: Arc::new(state),
    }
}

macro_rules! app_method {
    ($name:ident) => {
        /// Register a handler for this method at the provided path.
        ///
        pub fn $name<T>(&mut self, path: &str, handler: T) -> &mut Self
        where
            T: Middleware<State> + 'static,
        {
            self.sync_router_flags();
            self.router.$name(path, handler);
            self
        }
    };
}

impl Application<()> {
    /// Returns a new application without shared state.
    ///
    pub fn new() -> Self {
        app(())
    }
}

impl Default for Application<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<State> Application<State>
where
    State: Send + Sync + 'static,
{
    /// Returns the shared application context: settings, locals, and the
    /// view engine registry.
    ///
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Read or mutate the settings store. Routing-related settings apply
    /// to layers registered after the change.
    ///
    pub fn update_settings(&self, f: impl FnOnce(&mut Settings)) {
        self.context.update_settings(f);
    }

    /// Returns a snapshot of one value from the settings store.
    ///
    pub fn setting<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        f(&self.context.settings())
    }

    /// Set an application local visible to handlers and views.
    ///
    pub fn set_local(&self, name: impl Into<String>, value: Value) -> &Self {
        self.context.set_local(name, value);
        self
    }

    /// Register a view engine for a file extension.
    ///
    pub fn engine(&self, extension: &str, engine: Arc<dyn ViewEngine>) -> &Self {
        self.context.register_engine(extension, engine);
        self
    }

    /// Returns a mutable reference to the root router.
    ///
    pub fn router(&mut self) -> &mut Router<State> {
        self.sync_router_flags();
        &mut self.router
    }

    app_method!(connect);
    app_method!(delete);
    app_method!(get);
    app_method!(head);
    app_method!(options);
    app_method!(patch);
    app_method!(post);
    app_method!(put);
    app_method!(trace);

    /// Register a handler at the provided path for every method.
    ///
    pub fn all<T>(&mut self, path: &str, handler: T) -> &mut Self
    where
        T: Middleware<State> + 'static,
    {
        self.sync_router_flags();
        self.router.all(path, handler);
        self
    }

    /// Create a route at the provided path for chained method handlers.
    ///
    pub fn route(&mut self, path: &str) -> &mut Route<State> {
        self.sync_router_flags();
        self.router.route(path)
    }

    /// Append prefix-mode middleware at the provided path.
    ///
    pub fn use_at<T>(&mut self, path: &str, middleware: T) -> &mut Self
    where
        T: Middleware<State> + 'static,
    {
        self.sync_router_flags();
        self.router.use_at(path, middleware);
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

    /// Append error middleware at the provided path.
    ///
    pub fn use_error_at<T>(&mut self, path: &str, middleware: T) -> &mut Self
    where
        T: ErrorMiddleware<State> + 'static,
    {
        self.sync_router_flags();
        self.router.use_error_at(path, middleware);
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

    /// Mount a router at the provided path prefix.
    ///
    pub fn use_router(&mut self, path: &str, router: Router<State>) -> &mut Self {
        self.sync_router_flags();
        self.router.use_router(path, router);
        self
    }

    /// Register a preprocessor for the named path parameter on the root
    /// router.
    ///
    pub fn param<T>(&mut self, name: impl Into<String>, guard: T) -> &mut Self
    where
        T: ParamGuard<State> + 'static,
    {
        self.router.param(name, guard);
        self
    }

    /// Mount another application at the provided path prefix. The mounted
    /// application records its mount path and notifies its `on_mount`
    /// observers. Requests below the prefix dispatch through the mounted
    /// application's router; decoration (query parsing, settings) stays
    /// with the root application.
    ///
    pub fn mount(&mut self, path: &str, child: Application<State>) -> &mut Self {
        let Application {
            router, context, ..
        } = child;

        context.notify_mounted(path);

        self.sync_router_flags();
        self.router.use_router_shared(path, Arc::new(router));
        self
    }

    /// Freeze the application into a cloneable request service, the form
    /// consumed by the HTTP binding and by tests.
    ///
    pub fn into_service(self) -> AppService<State> {
        AppService::new(
            Arc::new(self.router),
            self.context,
            self.state,
            None,
        )
    }

    /// Bind a TCP listener at `address` and serve connections until the
    /// process is interrupted.
    ///
    pub async fn listen<T>(self, address: T) -> Result<(), Error>
    where
        T: ToSocketAddrs,
    {
        let tcp_listener = TcpListener::bind(address).await?;
        let service = self.into_service();
        let address = tcp_listener.local_addr()?;

        tracing::info!(%address, "server ready to accept connections");

        loop {
            // Accept a new connection from the TCP listener.
            let (stream, remote_addr) = tcp_listener.accept().await?;
            let io = TokioIo::new(stream);

            // Clone the service so it can be moved into the tokio task.
            // Every field is behind an Arc, so the clone is cheap.
            let service = service.with_remote_addr(remote_addr);

            // Spawn a tokio task to serve multiple connections
            // concurrently.
            tokio::spawn(async move {
                let connection = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .serve_connection(io, service);

                if let Err(error) = connection.await {
                    // Surface the connection error at the application
                    // level; the connection itself is already gone.
                    tracing::warn!(%error, "connection error");
                }
            });
        }
    }

    /// Routing flags live on the router but are configured through the
    /// settings store; re-read them before compiling new patterns.
    ///
    fn sync_router_flags(&mut self) {
        let (sensitive, strict) = {
            let settings = self.context.settings();
            (settings.case_sensitive_routing, settings.strict_routing)
        };

        self.router.case_sensitive(sensitive).strict(strict);
    }
}
