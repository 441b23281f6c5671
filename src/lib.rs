//! Host for a server-rendered web application.
//!
//! In development, asset requests are bridged into a callback-style
//! middleware chain and pages are rendered by reloading the SSR module on
//! every request. In production, built client assets are served from disk
//! and pages come from the built render entry.

pub mod bridge;
pub mod config;
pub mod dev;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod render;
pub mod ssr;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
