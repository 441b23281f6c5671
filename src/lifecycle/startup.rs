//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the render source for the configured mode
//! - Start the dev server's watcher and HMR socket in development
//! - Assemble the HTTP server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The HMR port is bound before the dev server is built, so the client
//!   script always names the port actually in use
//! - The HTTP listener is bound by the caller, last

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{Mode, ServerConfig};
use crate::dev::{
    DevServerError, DevServerOptions, FileDevServer, HmrHandle, LogLevel, WatchOptions,
};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::render::{CommandEntry, RenderError};
use crate::ssr::RenderSource;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind HMR port {port}: {source}")]
    HmrBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    DevServer(#[from] DevServerError),

    #[error("invalid render command: {0}")]
    Render(#[from] RenderError),
}

/// Everything `main` needs to start serving.
pub struct App {
    pub server: HttpServer,
    /// Present in development; dropping it stops the watcher.
    pub hmr: Option<HmrHandle>,
}

/// Build the application for `config`.
pub async fn build(config: &ServerConfig, shutdown: &Shutdown) -> Result<App, StartupError> {
    let (source, hmr) = if config.mode.is_production() {
        let entry = CommandEntry::new(&config.production.render_command, &config.root)?;
        tracing::info!(
            program = entry.program(),
            args = ?entry.args(),
            "Production render entry ready"
        );
        (RenderSource::Production(Arc::new(entry)), None)
    } else {
        let (dev, hmr) = start_dev_server(config, shutdown).await?;
        (
            RenderSource::Development {
                dev: Arc::new(dev),
                module: config.dev.entry_module.clone(),
            },
            Some(hmr),
        )
    };

    let state = AppState {
        source,
        body_limit: config.limits.max_body_size,
    };
    let server = HttpServer::new(state, config.resolve(&config.production.static_dir));

    Ok(App { server, hmr })
}

async fn start_dev_server(
    config: &ServerConfig,
    shutdown: &Shutdown,
) -> Result<(FileDevServer, HmrHandle), StartupError> {
    let port = config.dev.hmr_port;
    let listener = TcpListener::bind((config.listener.host.as_str(), port))
        .await
        .map_err(|source| StartupError::HmrBind { port, source })?;
    let hmr_port = listener
        .local_addr()
        .map_err(|source| StartupError::HmrBind { port, source })?
        .port();

    let dev = FileDevServer::new(DevServerOptions {
        root: config.root.clone(),
        log_level: if config.mode == Mode::Test {
            LogLevel::Error
        } else {
            LogLevel::Info
        },
        watch: WatchOptions {
            use_polling: config.dev.use_polling,
            interval: config.dev.poll_interval(),
        },
        hmr_port,
        ssr_command: config.dev.ssr_command.clone(),
    });
    let hmr = dev.spawn_hmr(listener, shutdown)?;
    Ok((dev, hmr))
}
