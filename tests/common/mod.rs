//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::net::TcpListener;

use ssr_host::bridge::Middleware;
use ssr_host::dev::DevServer;
use ssr_host::http::{AppState, HttpServer};
use ssr_host::render::{RenderEntry, RenderError};
use ssr_host::ssr::RenderSource;

/// Serve `router` on an ephemeral local port.
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start a production server over `static_dir` rendering with `entry`.
pub async fn spawn_production(entry: impl RenderEntry + 'static, static_dir: &Path) -> SocketAddr {
    let state = AppState {
        source: RenderSource::Production(Arc::new(entry)),
        body_limit: 1024,
    };
    spawn(HttpServer::new(state, static_dir).into_router()).await
}

/// Start a development server around `dev`.
pub async fn spawn_development(dev: impl DevServer + 'static, body_limit: usize) -> SocketAddr {
    let state = AppState {
        source: RenderSource::Development {
            dev: Arc::new(dev),
            module: "/src/entry-server.tsx".to_string(),
        },
        body_limit,
    };
    spawn(HttpServer::new(state, "unused").into_router()).await
}

/// Always returns the same value.
pub struct StaticEntry(pub Value);

impl RenderEntry for StaticEntry {
    fn render<'a>(
        &'a self,
        _pathname: &'a str,
        _head: &'a str,
    ) -> BoxFuture<'a, Result<Value, RenderError>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

/// Renders `<p>{pathname}</p>` followed by the head it was given.
pub struct EchoEntry;

impl RenderEntry for EchoEntry {
    fn render<'a>(
        &'a self,
        pathname: &'a str,
        head: &'a str,
    ) -> BoxFuture<'a, Result<Value, RenderError>> {
        Box::pin(async move { Ok(Value::String(format!("<p>{pathname}</p>{head}"))) })
    }
}

/// Fails like a renderer that threw.
pub struct FailingEntry(pub &'static str);

impl RenderEntry for FailingEntry {
    fn render<'a>(
        &'a self,
        _pathname: &'a str,
        _head: &'a str,
    ) -> BoxFuture<'a, Result<Value, RenderError>> {
        Box::pin(async move {
            Err(RenderError::Failed {
                status: Some(1),
                trace: self.0.to_string(),
            })
        })
    }
}

/// Dev server with a caller-supplied chain and entry.
pub struct FakeDev {
    pub chain: Arc<dyn Middleware>,
    pub entry: Arc<dyn RenderEntry>,
}

impl DevServer for FakeDev {
    fn middlewares(&self) -> Arc<dyn Middleware> {
        self.chain.clone()
    }

    fn transform_index_html(&self, _url: &str, html: &str) -> String {
        html.replace("<head>", "<head><meta name=\"dev\">")
    }

    fn ssr_load_module(&self, _url: &str) -> Result<Arc<dyn RenderEntry>, RenderError> {
        Ok(self.entry.clone())
    }

    fn ssr_fix_stacktrace(&self, err: &mut RenderError) {
        if let Some(trace) = err.trace_mut() {
            *trace = trace.replace("/abs/project/", "/");
        }
    }
}
