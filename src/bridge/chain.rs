//! Callback-driven middleware chain.
//!
//! A middleware receives the synthetic request, the response handle and a
//! `next` continuation. It either finishes the response (now or from a
//! spawned task) or hands control onward through `next`.

use std::sync::Arc;

use crate::bridge::forward::{Completion, CompletionSignal};
use crate::bridge::request::LegacyRequest;
use crate::bridge::response::LegacyResponse;

/// Error passed along a chain with [`Next::fail`].
pub type MiddlewareError = Box<dyn std::error::Error + Send + Sync>;

/// A callback-style request handler.
pub trait Middleware: Send + Sync {
    fn handle(&self, req: Arc<LegacyRequest>, res: LegacyResponse, next: Next);
}

type Continuation = Box<dyn FnOnce(Option<MiddlewareError>) + Send>;

/// Continuation handed to a middleware.
pub struct Next {
    continuation: Continuation,
}

impl Next {
    pub fn new(continuation: impl FnOnce(Option<MiddlewareError>) + Send + 'static) -> Self {
        Self {
            continuation: Box::new(continuation),
        }
    }

    /// Continuation at the edge of the bridge: the chain did not answer.
    pub(crate) fn outer(signal: Arc<CompletionSignal>) -> Self {
        Self::new(move |err| {
            if let Some(err) = err {
                tracing::warn!(error = %err, "Middleware error reached the bridge");
            }
            signal.fire(Completion::Fallthrough);
        })
    }

    /// Continue with the next middleware.
    pub fn run(self) {
        (self.continuation)(None)
    }

    /// Continue in error mode.
    pub fn fail(self, err: impl Into<MiddlewareError>) {
        (self.continuation)(Some(err.into()))
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// Ordered list of middleware, run first to last.
///
/// When a layer fails, the stack answers 500 with the error text instead of
/// continuing.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layer: impl Middleware + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn push(&mut self, layer: Arc<dyn Middleware>) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Middleware for MiddlewareStack {
    fn handle(&self, req: Arc<LegacyRequest>, res: LegacyResponse, next: Next) {
        dispatch(Arc::from(self.layers.clone()), 0, req, res, next);
    }
}

fn dispatch(
    layers: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    req: Arc<LegacyRequest>,
    res: LegacyResponse,
    outer: Next,
) {
    let Some(layer) = layers.get(index).cloned() else {
        outer.run();
        return;
    };
    let next = {
        let req = req.clone();
        let res = res.clone();
        Next::new(move |err| match err {
            None => dispatch(layers, index + 1, req, res, outer),
            Some(err) => fail_response(&req, &res, err),
        })
    };
    layer.handle(req, res, next);
}

fn fail_response(req: &LegacyRequest, res: &LegacyResponse, err: MiddlewareError) {
    tracing::error!(url = %req.url, error = %err, "Dev middleware failed");
    if res.finished() {
        return;
    }
    let _ = res.set_status_code(500);
    let _ = res.set_header("content-type", "text/plain; charset=utf-8");
    res.end(Some(err.to_string().into()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::forward::{forward, Forwarded};
    use axum::body::Bytes;
    use axum::http::{Request, StatusCode};
    use std::sync::Mutex;

    struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Middleware for Tag {
        fn handle(&self, _req: Arc<LegacyRequest>, _res: LegacyResponse, next: Next) {
            self.1.lock().unwrap().push(self.0);
            next.run();
        }
    }

    struct Answer;

    impl Middleware for Answer {
        fn handle(&self, _req: Arc<LegacyRequest>, res: LegacyResponse, _next: Next) {
            res.end(Some("answered".into()));
        }
    }

    struct Broken;

    impl Middleware for Broken {
        fn handle(&self, _req: Arc<LegacyRequest>, _res: LegacyResponse, next: Next) {
            next.fail("transform failed");
        }
    }

    async fn run(stack: &MiddlewareStack) -> Forwarded {
        let (parts, _) = Request::builder()
            .uri("/src/main.tsx")
            .body(())
            .unwrap()
            .into_parts();
        forward(stack, &parts, Bytes::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_layers_run_in_order_until_answered() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stack = MiddlewareStack::new()
            .with(Tag("a", seen.clone()))
            .with(Tag("b", seen.clone()))
            .with(Answer)
            .with(Tag("unreached", seen.clone()));

        assert!(matches!(run(&stack).await, Forwarded::Handled(_)));
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_exhausted_stack_falls_through() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stack = MiddlewareStack::new().with(Tag("only", seen.clone()));
        assert!(matches!(run(&stack).await, Forwarded::Fallthrough));
    }

    #[tokio::test]
    async fn test_failure_becomes_server_error() {
        let stack = MiddlewareStack::new().with(Broken).with(Answer);
        let Forwarded::Handled(response) = run(&stack).await else {
            panic!("expected handled response");
        };
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"transform failed");
    }
}
