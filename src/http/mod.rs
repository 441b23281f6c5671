//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → development: middleware/dev_assets.rs (bridge into the dev chain)
//!       production:  ServeDir over the built client assets
//!     → server.rs ssr_handler (render or 404/500)
//!     → Send to client
//! ```

pub mod middleware;
pub mod server;

pub use server::{AppState, HttpServer};
