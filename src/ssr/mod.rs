//! SSR invocation shim.
//!
//! # Data Flow
//! ```text
//! pathname
//!     → is_document_path (extension paths → 404)
//!     → head fragment (development: dev server head injection)
//!     → RenderSource::entry (dev module loader | production entry)
//!     → RenderEntry::render → RenderOutput::from_value
//!     → into_response (content-type, headers, status)
//!
//! Any failure → error_page (500 with the diagnostic trace)
//! ```
//!
//! # Design Decisions
//! - Each request is independent; failures are neither retried nor cached
//! - Structured headers are applied after the default content type

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::dev::DevServer;
use crate::observability::metrics;
use crate::render::{RenderEntry, RenderError, RenderOutput};

/// Minimal document handed to the dev server's head transform.
pub const HTML_SKELETON: &str = "<html><head></head><body></body></html>";

/// Where the render entry comes from.
#[derive(Clone)]
pub enum RenderSource {
    /// Loaded through the dev server on every request.
    Development {
        dev: Arc<dyn DevServer>,
        module: String,
    },
    /// Built once at startup.
    Production(Arc<dyn RenderEntry>),
}

impl RenderSource {
    pub fn dev(&self) -> Option<&Arc<dyn DevServer>> {
        match self {
            RenderSource::Development { dev, .. } => Some(dev),
            RenderSource::Production(_) => None,
        }
    }

    /// Head fragment to inject; empty in production.
    pub fn head(&self, pathname: &str) -> String {
        match self {
            RenderSource::Development { dev, .. } => {
                extract_head(&dev.transform_index_html(pathname, HTML_SKELETON)).to_string()
            }
            RenderSource::Production(_) => String::new(),
        }
    }

    pub fn entry(&self) -> Result<Arc<dyn RenderEntry>, RenderError> {
        match self {
            RenderSource::Development { dev, module } => dev.ssr_load_module(module),
            RenderSource::Production(entry) => Ok(entry.clone()),
        }
    }

    /// Let the dev server rewrite the trace before it is logged.
    pub fn fix_stacktrace(&self, err: &mut RenderError) {
        if let RenderSource::Development { dev, .. } = self {
            dev.ssr_fix_stacktrace(err);
        }
    }
}

/// True if the final path segment has no extension.
pub fn is_document_path(pathname: &str) -> bool {
    Path::new(pathname).extension().is_none()
}

/// 404 for paths that cannot be routes.
pub fn not_found(pathname: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("{pathname} is not valid router path"),
    )
        .into_response()
}

/// Text between the first `<head>` and the following `</head>`.
pub fn extract_head(html: &str) -> &str {
    const OPEN: &str = "<head>";
    let Some(start) = html.find(OPEN).map(|i| i + OPEN.len()) else {
        return "";
    };
    match html[start..].find("</head>") {
        Some(len) => &html[start..start + len],
        None => "",
    }
}

/// Render `pathname` through `source` and shape the result.
pub async fn render_document(source: &RenderSource, pathname: &str) -> Result<Response, RenderError> {
    let head = source.head(pathname);
    let entry = source.entry()?;

    tracing::info!(path = %pathname, "Rendering");

    let start = Instant::now();
    let value = entry.render(pathname, &head).await;
    metrics::record_render(start);

    into_response(RenderOutput::from_value(value?)?)
}

/// Build the HTTP response for a render result.
pub fn into_response(output: RenderOutput) -> Result<Response, RenderError> {
    let (html, status, extra) = match output {
        RenderOutput::Html(html) => (html, StatusCode::OK, Vec::new()),
        RenderOutput::Document {
            html,
            status,
            headers,
        } => (html, status, headers),
    };

    let mut response = Response::new(Body::from(html));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    for (name, value) in extra {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RenderError::InvalidHeader { name: name.clone() })?;
        let header_value = HeaderValue::from_str(&value)
            .map_err(|_| RenderError::InvalidHeader { name: name.clone() })?;
        headers.insert(header_name, header_value);
    }
    Ok(response)
}

/// 500 page embedding the failure's trace.
pub fn error_page(err: &RenderError) -> Response {
    let body = format!(
        "<html><body><h1>500 - Internal Server Error</h1><pre>{}</pre></body></html>",
        escape_html(&err.trace())
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/html")],
        body,
    )
        .into_response()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
