//! Render entrypoint abstraction.
//!
//! # Responsibilities
//! - Define the object-safe `RenderEntry` seam the SSR handler calls
//! - Validate what an entry returns (`output.rs`)
//! - Run an external renderer process (`command.rs`)
//!
//! # Design Decisions
//! - Entries return raw JSON; shape checking happens in one place
//! - Errors carry the renderer's diagnostic trace for logs and the 500 page

pub mod command;
pub mod output;

use std::path::PathBuf;

use futures_util::future::BoxFuture;
use thiserror::Error;

pub use command::CommandEntry;
pub use output::RenderOutput;

/// Produces HTML (or a structured result) for a document path.
pub trait RenderEntry: Send + Sync {
    /// Render `pathname`, injecting `head` into the document head.
    ///
    /// The value is either a string of HTML or an object with `html`,
    /// optional `statusCode` and optional `headers`.
    fn render<'a>(
        &'a self,
        pathname: &'a str,
        head: &'a str,
    ) -> BoxFuture<'a, Result<serde_json::Value, RenderError>>;
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render command is empty")]
    EmptyCommand,

    #[error("failed to spawn renderer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("renderer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode render request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("renderer exited with {}", exit_label(.status))]
    Failed { status: Option<i32>, trace: String },

    #[error("Invalid SSR result: {0}")]
    InvalidResult(&'static str),

    #[error("Invalid SSR status code: {0}")]
    InvalidStatus(String),

    #[error("Invalid SSR header `{name}`")]
    InvalidHeader { name: String },

    #[error("module not found: {}", .0.display())]
    ModuleNotFound(PathBuf),
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl RenderError {
    /// Message plus whatever trace the renderer printed.
    pub fn trace(&self) -> String {
        match self {
            RenderError::Failed { trace, .. } if !trace.trim().is_empty() => {
                format!("{self}\n{}", trace.trim_end())
            }
            _ => self.to_string(),
        }
    }

    /// Mutable access to the renderer-provided trace, if any.
    pub fn trace_mut(&mut self) -> Option<&mut String> {
        match self {
            RenderError::Failed { trace, .. } => Some(trace),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_includes_stderr() {
        let err = RenderError::Failed {
            status: Some(1),
            trace: "Error: boom\n    at render (/app/src/entry-server.tsx:4:9)\n".into(),
        };
        assert_eq!(
            err.trace(),
            "renderer exited with status 1\nError: boom\n    at render (/app/src/entry-server.tsx:4:9)"
        );
    }

    #[test]
    fn test_trace_without_stderr_is_message() {
        let err = RenderError::InvalidResult("number");
        assert_eq!(err.trace(), "Invalid SSR result: number");

        let err = RenderError::Failed { status: None, trace: String::new() };
        assert_eq!(err.trace(), "renderer exited with a signal");
    }
}
