//! Project file watcher feeding HMR reloads.

use std::path::{Component, Path, PathBuf};

use notify::{Config, Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};

use crate::dev::hmr::{HmrEvent, HmrHub};
use crate::dev::{LogLevel, WatchOptions};

/// Directories never watched or reported.
const IGNORED: &[&str] = &[".git", "node_modules", "dist", "target"];

/// A watcher that turns project file changes into reload events.
pub struct SourceWatcher {
    root: PathBuf,
    options: WatchOptions,
    log_level: LogLevel,
}

impl SourceWatcher {
    pub fn new(root: &Path, options: WatchOptions, log_level: LogLevel) -> Self {
        Self {
            root: root.to_path_buf(),
            options,
            log_level,
        }
    }

    /// Start watching. Dropping the returned watcher stops it.
    pub fn run(self, hub: HmrHub) -> Result<Box<dyn Watcher + Send>, notify::Error> {
        let root = self.root.clone();
        let log_reloads = self.log_level.logs_reloads();

        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
                    return;
                }
                for path in event.paths.iter().filter_map(|p| relative_url(&root, p)) {
                    if log_reloads {
                        tracing::info!(path = %path, "page reload");
                    } else {
                        tracing::debug!(path = %path, "page reload");
                    }
                    hub.notify(HmrEvent::FullReload { path });
                }
            }
            Err(e) => tracing::error!("Watch error: {:?}", e),
        };

        let mut watcher: Box<dyn Watcher + Send> = if self.options.use_polling {
            Box::new(PollWatcher::new(
                handler,
                Config::default().with_poll_interval(self.options.interval),
            )?)
        } else {
            Box::new(RecommendedWatcher::new(handler, Config::default())?)
        };

        // Top level shallowly, then each non-ignored subtree; polling
        // node_modules recursively would dominate the interval.
        watcher.watch(&self.root, RecursiveMode::NonRecursive)?;
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if path.is_dir() && !is_ignored(&entry.file_name().to_string_lossy()) {
                watcher.watch(&path, RecursiveMode::Recursive)?;
            }
        }

        tracing::info!(
            root = ?self.root,
            polling = self.options.use_polling,
            interval_ms = self.options.interval.as_millis() as u64,
            "Source watcher started"
        );
        Ok(watcher)
    }
}

fn is_ignored(name: &str) -> bool {
    IGNORED.contains(&name)
}

/// `path` as a root-relative URL, or `None` when outside the root or ignored.
pub fn relative_url(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                if is_ignored(&name) {
                    return None;
                }
                segments.push(name.into_owned());
            }
            _ => return None,
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(format!("/{}", segments.join("/")))
}
