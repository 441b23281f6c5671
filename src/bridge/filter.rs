//! Which requests belong to the dev middleware chain.
//!
//! Dev-internal prefixes, anything carrying a query string, and a fixed set
//! of asset extensions go to the chain. Everything else is a document
//! request for SSR.

use axum::http::Uri;

const DEV_PREFIXES: &[&str] = &["/@", "/src/", "/node_modules/"];

const ASSET_EXTENSIONS: &[&str] = &[
    ".js", ".ts", ".tsx", ".jsx", ".css", ".scss", ".sass", ".less", ".svg", ".png", ".jpg",
    ".jpeg", ".gif", ".ico", ".woff", ".woff2", ".ttf", ".eot",
];

/// Returns true if `uri` should be answered by the dev middleware chain.
pub fn is_dev_asset(uri: &Uri) -> bool {
    let path = uri.path();
    DEV_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        || uri.query().is_some()
        || ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
