//! Dev middleware bridge.
//!
//! # Data Flow
//! ```text
//! axum Request
//!     → filter.rs (is this a dev asset request?)
//!     → forward.rs (buffer body, build request/response pair)
//!     → request.rs / response.rs (callback-style objects)
//!     → chain.rs (middleware stack, next continuation)
//!     → completion signal: Finished | Fallthrough
//!     → axum Response, or continue to SSR
//! ```
//!
//! # Design Decisions
//! - Whole exchange is buffered; this path only runs in development
//! - Calling `next` without finishing resolves as a fallthrough
//! - A chain that drops every handle without answering also falls through

pub mod chain;
pub mod events;
pub mod filter;
pub mod forward;
pub mod request;
pub mod response;

pub use chain::{Middleware, MiddlewareError, MiddlewareStack, Next};
pub use events::Listener;
pub use filter::is_dev_asset;
pub use forward::{buffer_request, forward, BridgeError, Forwarded};
pub use request::LegacyRequest;
pub use response::{Chunk, Encoding, HeaderList, LegacyResponse, ResponseError};
