//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig (host, port range)
//!     → listener.rs (probe ports in order, keep the first that binds)
//!     → Hand off to HTTP layer
//! ```

pub mod listener;

pub use listener::{bind_first_free, ListenerError};
