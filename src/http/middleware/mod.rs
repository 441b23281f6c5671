//! Axum middleware.

pub mod dev_assets;

pub use dev_assets::dev_assets;
