//! Static files under the project root, served through the middleware chain.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::bridge::{LegacyRequest, LegacyResponse, Middleware, Next};

pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Map a URL path under the root; `None` for anything that escapes it.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.root.clone();
        let mut pushed = false;
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => {
                    pb.push(s);
                    pushed = true;
                }
                Component::CurDir => {}
                _ => return None,
            }
        }
        pushed.then_some(pb)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "html" => "text/html",
            "css" => "text/css",
            "js" | "mjs" | "jsx" | "ts" | "tsx" => "application/javascript",
            "json" | "map" => "application/json",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "ico" => "image/x-icon",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "eot" => "application/vnd.ms-fontobject",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    }
}

impl Middleware for StaticFiles {
    fn handle(&self, req: Arc<LegacyRequest>, res: LegacyResponse, next: Next) {
        let head_only = match req.method.as_str() {
            "GET" => false,
            "HEAD" => true,
            _ => return next.run(),
        };
        let Some(path) = self.map_path(req.path()) else {
            return next.run();
        };

        tokio::spawn(async move {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                _ => return next.run(),
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => return next.fail(e),
            };
            let headers = [
                ("Content-Type", Self::content_type(&path).to_string()),
                ("Content-Length", bytes.len().to_string()),
                ("Cache-Control", "no-cache".to_string()),
            ];
            if let Err(e) = res.write_head(200, headers) {
                return next.fail(e);
            }
            tracing::debug!(path = %req.path(), len = bytes.len(), "Serving dev asset");
            res.end((!head_only).then(|| bytes.into()));
        });
    }
}
