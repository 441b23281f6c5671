//! Development server.
//!
//! # Data Flow
//! ```text
//! startup
//!     → FileDevServer::new (one per process, shared as Arc<dyn DevServer>)
//!     → spawn_hmr: watcher.rs (file changes) → hmr.rs (WebSocket broadcast)
//!
//! per request
//!     → middlewares()          HMR client script, static files under root
//!     → transform_index_html() head injection for SSR
//!     → ssr_load_module()      render entry for the SSR module
//!     → ssr_fix_stacktrace()   root-relative traces on failure
//! ```
//!
//! # Design Decisions
//! - `DevServer` is a trait so the HTTP layer never names the implementation
//! - The dev server is built once and passed by handle, never looked up globally
//! - Watching is polled by default; editors that swap files confuse native events

pub mod hmr;
pub mod server;
pub mod static_files;
pub mod watcher;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::bridge::Middleware;
use crate::render::{RenderEntry, RenderError};

pub use hmr::{HmrEvent, HmrHub};
pub use server::{FileDevServer, HmrHandle};

/// What the HTTP layer needs from a dev server.
pub trait DevServer: Send + Sync {
    /// Callback-style chain for asset requests.
    fn middlewares(&self) -> Arc<dyn Middleware>;

    /// Apply dev-time HTML transforms for `url`.
    fn transform_index_html(&self, url: &str, html: &str) -> String;

    /// Load the render entry for the SSR module at `url` (root-relative).
    fn ssr_load_module(&self, url: &str) -> Result<Arc<dyn RenderEntry>, RenderError>;

    /// Rewrite a failure's trace so it points at project files.
    fn ssr_fix_stacktrace(&self, err: &mut RenderError);
}

#[derive(Debug, Error)]
pub enum DevServerError {
    #[error("failed to bind HMR socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to start file watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// How chatty the dev server is about reloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[default]
    Info,
    Error,
    Silent,
}

impl LogLevel {
    pub fn logs_reloads(self) -> bool {
        self == LogLevel::Info
    }
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub use_polling: bool,
    pub interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            use_polling: true,
            interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DevServerOptions {
    pub root: PathBuf,
    pub log_level: LogLevel,
    pub watch: WatchOptions,
    /// Port the browser connects to for reload events.
    pub hmr_port: u16,
    /// Program and arguments that execute an SSR module; the module path is appended.
    pub ssr_command: Vec<String>,
}
