//! File-backed dev server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::Watcher;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::bridge::{Middleware, MiddlewareStack};
use crate::dev::hmr::{self, HmrClient, HmrHub, CLIENT_PATH};
use crate::dev::static_files::StaticFiles;
use crate::dev::watcher::SourceWatcher;
use crate::dev::{DevServer, DevServerError, DevServerOptions};
use crate::lifecycle::Shutdown;
use crate::render::{CommandEntry, RenderEntry, RenderError};

/// Serves project files, injects the HMR client and runs SSR modules
/// through an external command.
pub struct FileDevServer {
    options: DevServerOptions,
    root: PathBuf,
    middlewares: Arc<MiddlewareStack>,
}

/// Keeps the watcher and HMR socket alive.
pub struct HmrHandle {
    pub hub: HmrHub,
    pub addr: SocketAddr,
    pub task: JoinHandle<std::io::Result<()>>,
    _watcher: Box<dyn Watcher + Send>,
}

impl FileDevServer {
    pub fn new(options: DevServerOptions) -> Self {
        let root = options
            .root
            .canonicalize()
            .unwrap_or_else(|_| options.root.clone());
        let middlewares = Arc::new(
            MiddlewareStack::new()
                .with(HmrClient::new(options.hmr_port))
                .with(StaticFiles::new(root.clone())),
        );

        tracing::info!(
            root = ?root,
            hmr_port = options.hmr_port,
            log_level = ?options.log_level,
            "Dev server created"
        );

        Self {
            options,
            root,
            middlewares,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start the file watcher and the HMR socket on `listener`.
    pub fn spawn_hmr(
        &self,
        listener: TcpListener,
        shutdown: &Shutdown,
    ) -> Result<HmrHandle, DevServerError> {
        let addr = listener.local_addr().map_err(DevServerError::Bind)?;
        let hub = HmrHub::default();
        let watcher = SourceWatcher::new(&self.root, self.options.watch.clone(), self.options.log_level)
            .run(hub.clone())?;
        let task = tokio::spawn(hmr::serve(listener, hub.clone(), shutdown.subscribe()));
        Ok(HmrHandle {
            hub,
            addr,
            task,
            _watcher: watcher,
        })
    }
}

impl DevServer for FileDevServer {
    fn middlewares(&self) -> Arc<dyn Middleware> {
        self.middlewares.clone()
    }

    fn transform_index_html(&self, _url: &str, html: &str) -> String {
        let tag = format!(r#"<script type="module" src="{CLIENT_PATH}"></script>"#);
        match html.find("<head>") {
            Some(i) => {
                let at = i + "<head>".len();
                format!("{}{}{}", &html[..at], tag, &html[at..])
            }
            None => format!("{tag}{html}"),
        }
    }

    fn ssr_load_module(&self, url: &str) -> Result<Arc<dyn RenderEntry>, RenderError> {
        let path = self.root.join(url.trim_start_matches('/'));
        if !path.is_file() {
            return Err(RenderError::ModuleNotFound(path));
        }
        let entry = CommandEntry::new(&self.options.ssr_command, &self.root)?
            .arg(path.to_string_lossy());
        Ok(Arc::new(entry))
    }

    fn ssr_fix_stacktrace(&self, err: &mut RenderError) {
        let mut prefixes = vec![self.root.to_string_lossy().into_owned()];
        let given = self.options.root.to_string_lossy().into_owned();
        if given != prefixes[0] && given.starts_with('/') {
            prefixes.push(given);
        }
        if let RenderError::ModuleNotFound(path) = err {
            for prefix in &prefixes {
                if let Ok(rel) = path.strip_prefix(prefix) {
                    let relative = Path::new("/").join(rel);
                    *path = relative;
                    break;
                }
            }
        }
        if let Some(trace) = err.trace_mut() {
            for prefix in &prefixes {
                let prefix = prefix.trim_end_matches('/');
                if !prefix.is_empty() {
                    *trace = trace.replace(&format!("{prefix}/"), "/");
                }
            }
        }
    }
}
