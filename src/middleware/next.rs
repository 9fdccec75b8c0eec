use std::sync::Arc;

use super::middleware::{BoxFuture, ErrorMiddleware, Middleware};
use crate::app::final_handler;
use crate::error::Error;
use crate::request::{Params, Request};
use crate::router::{LayerKind, ParamGuard, Route, Router};

/// The continuation of the middleware pipeline.
///
/// `Next` owns the engine's dispatch state: a stack of frames, one per
/// router or route the request has descended into. Each frame records a
/// cursor into its layer stack together with the `base_url`, `path`, and
/// `params` to restore before every sibling layer, so mount-path
/// stripping unwinds exactly as it was applied.
///
/// A handler finishes in one of four ways:
///
/// - return a response, ending the pipeline;
/// - [`Next::call`], passing the request to the next matching layer;
/// - [`Next::fail`], switching dispatch into error mode so only error
///   middleware registered later in the stack runs;
/// - return an `Err`, unwinding to the application's final handler.
///
pub struct Next<State = ()> {
    frames: Vec<Frame<State>>,
}

struct Frame<State> {
    kind: FrameKind<State>,
    cursor: usize,
    base_url: String,
    path: String,
    params: Params,
}

enum FrameKind<State> {
    Router(Arc<Router<State>>),
    Route(Arc<Route<State>>),
}

/// A pending parameter preprocessor run: the parameter name, the captured
/// value, and the guards registered for it.
///
type PendingGuards<State> = Vec<(Arc<str>, String, Vec<Arc<dyn ParamGuard<State>>>)>;

struct Matched<State> {
    /// The mount state the layer's handler observes.
    base_url: String,
    path: String,
    params: Params,
    guards: PendingGuards<State>,
    action: Action<State>,
}

enum Action<State> {
    Handler(Arc<dyn Middleware<State>>),
    ErrorHandler(Arc<dyn ErrorMiddleware<State>>),
    Push(Frame<State>),
}

enum Advanced<State> {
    Finished,
    Matched(Box<Matched<State>>),
}

fn strip(base_url: &str, path: &str, matched: usize) -> (String, String) {
    let mut stripped = String::with_capacity(base_url.len() + matched);

    stripped.push_str(base_url);
    stripped.push_str(&path[..matched]);

    let remainder = &path[matched..];
    let remainder = if remainder.is_empty() {
        "/".to_owned()
    } else {
        remainder.to_owned()
    };

    (stripped, remainder)
}

impl<State> Next<State>
where
    State: Send + Sync + 'static,
{
    pub(crate) fn root(router: Arc<Router<State>>, path: String) -> Self {
        Self {
            frames: vec![Frame {
                kind: FrameKind::Router(router),
                cursor: 0,
                base_url: String::new(),
                path,
                params: Params::new(),
            }],
        }
    }

    /// Continue the pipeline with the next matching layer.
    ///
    pub fn call(self, request: Request<State>) -> BoxFuture {
        self.run(request, None)
    }

    /// Switch the pipeline into error mode. Dispatch advances to the next
    /// error middleware registered later in the stack; when none remains,
    /// the error unwinds to the application's final handler.
    ///
    pub fn fail(self, request: Request<State>, error: Error) -> BoxFuture {
        self.run(request, Some(error))
    }

    /// Skip the remaining handlers of the current route and resume
    /// dispatch in the owning router's stack. Outside a route this is
    /// equivalent to [`Next::call`].
    ///
    pub fn skip_route(mut self, request: Request<State>) -> BoxFuture {
        if let Some(frame) = self.frames.last() {
            if matches!(frame.kind, FrameKind::Route(_)) {
                self.frames.pop();
            }
        }

        self.run(request, None)
    }

    /// Terminate the current router and resume dispatch at its parent.
    ///
    pub fn skip_router(mut self, request: Request<State>) -> BoxFuture {
        while let Some(frame) = self.frames.pop() {
            if matches!(frame.kind, FrameKind::Router(_)) {
                break;
            }
        }

        self.run(request, None)
    }

    fn run(mut self, mut request: Request<State>, mut error: Option<Error>) -> BoxFuture {
        Box::pin(async move {
            loop {
                let matched = match self.advance(&mut request, error.is_some()) {
                    Advanced::Matched(matched) => matched,
                    Advanced::Finished => {
                        // An exhausted pipeline renders 404 in normal mode.
                        // A live error unwinds to the final handler.
                        return match error {
                            Some(error) => Err(error),
                            None => Ok(final_handler::not_found(&request)),
                        };
                    }
                };

                let Matched {
                    base_url,
                    path,
                    params,
                    guards,
                    action,
                } = *matched;

                // Parameter preprocessors observe the captured params at
                // the owning router's path, before any prefix stripping.
                request.set_params(params.clone());

                if let Some(failure) = run_guards(&mut request, &guards).await {
                    error = Some(failure);
                    continue;
                }

                request.set_route_state(base_url, path, params);

                match action {
                    Action::Push(frame) => {
                        self.frames.push(frame);
                    }

                    Action::Handler(handler) => {
                        return handler.call(request, self).await;
                    }

                    Action::ErrorHandler(handler) => {
                        let live = error.take().expect("error mode carries an error");
                        return handler.call(live, request, self).await;
                    }
                }
            }
        })
    }

    /// Restore the request to the top frame's mount state and advance its
    /// cursor to the next layer that participates in the current mode and
    /// matches the path. Exhausted frames pop; their parent resumes.
    ///
    fn advance(&mut self, request: &mut Request<State>, error_mode: bool) -> Advanced<State> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Advanced::Finished;
            };

            request.set_route_state(
                frame.base_url.clone(),
                frame.path.clone(),
                frame.params.clone(),
            );

            match &frame.kind {
                FrameKind::Route(route) => {
                    if error_mode {
                        // Route handlers never run in error mode.
                        self.frames.pop();
                        continue;
                    }

                    let route = Arc::clone(route);
                    let index = frame.cursor;

                    frame.cursor += 1;

                    let Some(layer) = route.layer(index) else {
                        self.frames.pop();
                        continue;
                    };

                    if !layer.accepts(request.method()) {
                        continue;
                    }

                    return Advanced::Matched(Box::new(Matched {
                        base_url: frame.base_url.clone(),
                        path: frame.path.clone(),
                        params: frame.params.clone(),
                        guards: Vec::new(),
                        action: Action::Handler(Arc::clone(&layer.handler)),
                    }));
                }

                FrameKind::Router(router) => {
                    let router = Arc::clone(router);
                    let index = frame.cursor;

                    frame.cursor += 1;

                    let Some(layer) = router.stack.get(index).cloned() else {
                        self.frames.pop();
                        continue;
                    };

                    if !layer.runs_in(error_mode) {
                        continue;
                    }

                    let Some(matched) = layer.matches(request.path()) else {
                        continue;
                    };

                    let params = if router.merge_params {
                        matched.params.merged_over(&frame.params)
                    } else {
                        matched.params
                    };

                    let guards = pending_guards(&router, &params, request);

                    match &layer.kind {
                        LayerKind::Route(route) => {
                            if !route.handles_method(request.method()) {
                                continue;
                            }

                            return Advanced::Matched(Box::new(Matched {
                                base_url: frame.base_url.clone(),
                                path: frame.path.clone(),
                                params: params.clone(),
                                guards,
                                action: Action::Push(Frame {
                                    kind: FrameKind::Route(Arc::clone(route)),
                                    cursor: 0,
                                    base_url: frame.base_url.clone(),
                                    path: frame.path.clone(),
                                    params,
                                }),
                            }));
                        }

                        LayerKind::Middleware(handler) => {
                            let (base_url, path) =
                                strip(&frame.base_url, request.path(), matched.matched);

                            return Advanced::Matched(Box::new(Matched {
                                base_url,
                                path,
                                params,
                                guards,
                                action: Action::Handler(Arc::clone(handler)),
                            }));
                        }

                        LayerKind::ErrorHandler(handler) => {
                            let (base_url, path) =
                                strip(&frame.base_url, request.path(), matched.matched);

                            return Advanced::Matched(Box::new(Matched {
                                base_url,
                                path,
                                params,
                                guards,
                                action: Action::ErrorHandler(Arc::clone(handler)),
                            }));
                        }

                        LayerKind::Router(nested) => {
                            let (base_url, path) =
                                strip(&frame.base_url, request.path(), matched.matched);

                            return Advanced::Matched(Box::new(Matched {
                                base_url: base_url.clone(),
                                path: path.clone(),
                                params: params.clone(),
                                guards,
                                action: Action::Push(Frame {
                                    kind: FrameKind::Router(Arc::clone(nested)),
                                    cursor: 0,
                                    base_url,
                                    path,
                                    params,
                                }),
                            }));
                        }
                    }
                }
            }
        }
    }
}

/// Collect the preprocessors that must run for the parameters captured by
/// a layer match, skipping (name, value) pairs already processed for this
/// request.
///
fn pending_guards<State>(
    router: &Router<State>,
    params: &Params,
    request: &Request<State>,
) -> PendingGuards<State> {
    let mut pending = Vec::new();

    for (name, value) in params.entries() {
        let Some(value) = value else { continue };

        if request.param_processed(name, value) {
            continue;
        }

        if let Some(guards) = router.guards_for(name) {
            pending.push((Arc::clone(name), value.clone(), guards.to_vec()));
        }
    }

    pending
}

/// Run the pending preprocessors in order. Returns the first failure.
///
async fn run_guards<State>(
    request: &mut Request<State>,
    pending: &PendingGuards<State>,
) -> Option<Error> {
    for (name, value, guards) in pending {
        for guard in guards {
            if let Err(error) = guard.call(request, value).await {
                return Some(error);
            }
        }

        request.mark_param_processed(Arc::clone(name), value.clone());
    }

    None
}
