//! Driving one exchange through the middleware chain.

use std::sync::{Arc, Mutex, PoisonError};

use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::response::Response;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::bridge::chain::{Middleware, Next};
use crate::bridge::request::LegacyRequest;
use crate::bridge::response::LegacyResponse;

/// Errors surfaced by the bridge itself (not by the middleware chain).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to buffer request body: {0}")]
    Body(#[source] axum::Error),

    #[error("middleware produced an invalid response: {0}")]
    InvalidResponse(String),
}

/// How the chain settled an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Finished,
    Fallthrough,
}

/// One-shot completion channel shared by the response and the outer `next`.
///
/// Dropping every holder without firing closes the channel, which the
/// bridge reads as a fallthrough.
pub(crate) struct CompletionSignal {
    tx: Mutex<Option<oneshot::Sender<Completion>>>,
}

impl CompletionSignal {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Deliver the first completion; later calls are ignored.
    pub(crate) fn fire(&self, completion: Completion) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => tx.send(completion).is_ok(),
            None => false,
        }
    }
}

/// Result of forwarding a request into the chain.
#[derive(Debug)]
pub enum Forwarded {
    /// The chain finished the response.
    Handled(Response),
    /// The chain passed the request on without answering it.
    Fallthrough,
}

/// Buffer the request body in memory, up to `limit` bytes.
pub async fn buffer_request(
    request: Request<Body>,
    limit: usize,
) -> Result<(Parts, Bytes), BridgeError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(BridgeError::Body)?;
    Ok((parts, bytes))
}

/// Run one request through `chain` and collect what it wrote.
pub async fn forward(
    chain: &dyn Middleware,
    parts: &Parts,
    body: Bytes,
) -> Result<Forwarded, BridgeError> {
    let request = Arc::new(LegacyRequest::from_parts(parts, body));
    let (signal, completed) = CompletionSignal::new();
    let response = LegacyResponse::new(signal.clone());
    let state = response.state();
    let next = Next::outer(signal);

    tracing::debug!(
        method = %request.method,
        url = %request.url,
        "Forwarding to dev middleware"
    );

    chain.handle(request.clone(), response, next);

    let completion = match completed.await {
        Ok(completion) => completion,
        Err(_) => {
            tracing::warn!(
                url = %request.url,
                "Middleware dropped the response without finishing it"
            );
            Completion::Fallthrough
        }
    };

    // Listeners that captured the response would otherwise keep it alive.
    let listeners = state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take_listeners();
    drop(listeners);

    match completion {
        Completion::Fallthrough => {
            tracing::debug!(url = %request.url, "Middleware fell through");
            Ok(Forwarded::Fallthrough)
        }
        Completion::Finished => {
            let parts = state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take_parts();
            let mut builder = Response::builder().status(
                StatusCode::from_u16(parts.status_code)
                    .map_err(|e| BridgeError::InvalidResponse(e.to_string()))?,
            );
            if let Some(headers) = builder.headers_mut() {
                for (name, value) in parts.headers.iter() {
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|e| BridgeError::InvalidResponse(format!("{name}: {e}")))?;
                    let value = HeaderValue::from_str(value)
                        .map_err(|e| BridgeError::InvalidResponse(format!("{name}: {e}")))?;
                    headers.insert(name, value);
                }
            }
            let response = builder
                .body(Body::from(parts.body))
                .map_err(|e| BridgeError::InvalidResponse(e.to_string()))?;
            Ok(Forwarded::Handled(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder;

    impl Middleware for Recorder {
        fn handle(&self, req: Arc<LegacyRequest>, res: LegacyResponse, _next: Next) {
            res.set_header("x-url", req.url.clone()).unwrap();
            res.write_head(202, [("content-type", "text/plain")]).unwrap();
            res.write("one,");
            res.write("two");
            res.end(None);
        }
    }

    struct Pass;

    impl Middleware for Pass {
        fn handle(&self, _req: Arc<LegacyRequest>, _res: LegacyResponse, next: Next) {
            next.run();
        }
    }

    struct Forget;

    impl Middleware for Forget {
        fn handle(&self, _req: Arc<LegacyRequest>, res: LegacyResponse, next: Next) {
            res.write("partial");
            drop(next);
        }
    }

    struct Later;

    impl Middleware for Later {
        fn handle(&self, _req: Arc<LegacyRequest>, res: LegacyResponse, _next: Next) {
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                res.end(Some(vec![0u8, 159, 146, 150].into()));
            });
        }
    }

    /// Registers a listener that only uses the handle it is given.
    struct Listening;

    impl Middleware for Listening {
        fn handle(&self, _req: Arc<LegacyRequest>, res: LegacyResponse, next: Next) {
            res.on(
                "close",
                Arc::new(|res: &LegacyResponse, _args: &[String]| {
                    res.status_code();
                }),
            );
            drop(next);
        }
    }

    /// Registers a listener holding a clone of the response and `token`.
    struct Capturing {
        token: Arc<()>,
        finish: bool,
    }

    impl Middleware for Capturing {
        fn handle(&self, _req: Arc<LegacyRequest>, res: LegacyResponse, next: Next) {
            let token = self.token.clone();
            let inner = res.clone();
            res.on(
                "close",
                Arc::new(move |_res: &LegacyResponse, _args: &[String]| {
                    let _ = (&token, inner.finished());
                }),
            );
            if self.finish {
                res.end(Some("done".into()));
            } else {
                next.run();
            }
        }
    }

    fn parts(uri: &str) -> Parts {
        Request::builder()
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn test_finished_response_is_relayed() {
        let forwarded = forward(&Recorder, &parts("/src/app.css?v=1"), Bytes::new())
            .await
            .unwrap();
        let Forwarded::Handled(response) = forwarded else {
            panic!("expected handled response");
        };
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-url"], "/src/app.css?v=1");
        assert_eq!(response.headers()["content-type"], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"one,two");
    }

    #[tokio::test]
    async fn test_next_without_end_falls_through() {
        let forwarded = forward(&Pass, &parts("/missing.js"), Bytes::new()).await.unwrap();
        assert!(matches!(forwarded, Forwarded::Fallthrough));
    }

    #[tokio::test]
    async fn test_dropped_response_falls_through() {
        let forwarded = forward(&Forget, &parts("/missing.js"), Bytes::new()).await.unwrap();
        assert!(matches!(forwarded, Forwarded::Fallthrough));
    }

    #[tokio::test]
    async fn test_dropped_handles_with_listener_fall_through() {
        let forwarded = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            forward(&Listening, &parts("/missing.js"), Bytes::new()),
        )
        .await
        .expect("forward settles once every handle is dropped")
        .unwrap();
        assert!(matches!(forwarded, Forwarded::Fallthrough));
    }

    #[tokio::test]
    async fn test_finished_exchange_releases_listeners() {
        let chain = Capturing {
            token: Arc::new(()),
            finish: true,
        };
        let forwarded = forward(&chain, &parts("/src/app.css"), Bytes::new()).await.unwrap();
        assert!(matches!(forwarded, Forwarded::Handled(_)));
        assert_eq!(Arc::strong_count(&chain.token), 1);
    }

    #[tokio::test]
    async fn test_fallthrough_releases_listeners() {
        let chain = Capturing {
            token: Arc::new(()),
            finish: false,
        };
        let forwarded = forward(&chain, &parts("/missing.js"), Bytes::new()).await.unwrap();
        assert!(matches!(forwarded, Forwarded::Fallthrough));
        assert_eq!(Arc::strong_count(&chain.token), 1);
    }

    #[tokio::test]
    async fn test_async_finish_keeps_binary_body() {
        let forwarded = forward(&Later, &parts("/logo.png"), Bytes::new()).await.unwrap();
        let Forwarded::Handled(response) = forwarded else {
            panic!("expected handled response");
        };
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[0u8, 159, 146, 150]);
    }

    #[tokio::test]
    async fn test_body_limit_is_enforced() {
        let request = Request::builder()
            .uri("/src/upload.ts")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        assert!(matches!(
            buffer_request(request, 16).await,
            Err(BridgeError::Body(_))
        ));
    }
}
