//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the SSR handler on every path
//! - Wire up middleware (tracing, request ID, dev asset bridge)
//! - Serve built client assets in production
//! - Bind server to listener and stop on shutdown

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::http::middleware::dev_assets;
use crate::lifecycle::shutdown;
use crate::observability::metrics::{self, Outcome};
use crate::ssr::{self, RenderSource};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub source: RenderSource,
    /// Largest request body the dev bridge buffers.
    pub body_limit: usize,
}

/// HTTP server for the SSR application.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Build the server. `static_dir` is only served in production.
    pub fn new(state: AppState, static_dir: impl Into<PathBuf>) -> Self {
        let router = Self::build_router(state, &static_dir.into());
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, static_dir: &Path) -> Router {
        let app = match &state.source {
            RenderSource::Development { .. } => Router::new()
                .route("/", any(ssr_handler))
                .route("/{*path}", any(ssr_handler))
                .layer(middleware::from_fn_with_state(state.clone(), dev_assets))
                .with_state(state),
            RenderSource::Production(_) => {
                tracing::info!(static_dir = ?static_dir, "Serving client assets");
                let assets = ServeDir::new(static_dir)
                    .append_index_html_on_directories(false)
                    .call_fallback_on_method_not_allowed(true)
                    .fallback(any(ssr_handler).with_state(state.clone()));
                Router::new()
                    .route("/", any(ssr_handler))
                    .fallback_service(assets)
                    .with_state(state)
            }
        };

        app.layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Render the requested page, or explain why not.
async fn ssr_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let pathname = request.uri().path().to_string();

    if !ssr::is_document_path(&pathname) {
        tracing::debug!(request_id = %request_id, path = %pathname, "Not a router path");
        metrics::record_ssr(Outcome::NotFound);
        return ssr::not_found(&pathname);
    }

    match ssr::render_document(&state.source, &pathname).await {
        Ok(response) => {
            metrics::record_ssr(Outcome::Rendered);
            response
        }
        Err(mut e) => {
            state.source.fix_stacktrace(&mut e);
            tracing::error!(
                request_id = %request_id,
                path = %pathname,
                error = %e,
                trace = %e.trace(),
                "SSR Error"
            );
            metrics::record_ssr(Outcome::Error);
            ssr::error_page(&e)
        }
    }
}
