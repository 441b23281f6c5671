//! Synthetic callback-style request.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::request::Parts;

/// The request as the middleware chain sees it.
///
/// Header names are lowercased and repeated headers are joined with `, `.
/// `url` is the path plus query, never an absolute URI.
#[derive(Debug, Clone)]
pub struct LegacyRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub http_version: &'static str,
    pub http_version_major: u8,
    pub http_version_minor: u8,
    pub complete: bool,
    pub encrypted: bool,
    pub body: Bytes,
}

impl LegacyRequest {
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let value = String::from_utf8_lossy(value.as_bytes());
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert_with(|| value.into_owned());
        }

        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Self {
            method: parts.method.as_str().to_string(),
            url,
            headers,
            http_version: "1.1",
            http_version_major: 1,
            http_version_minor: 1,
            complete: true,
            encrypted: false,
            body,
        }
    }

    /// Header value by name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `url` without its query string.
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }
}
