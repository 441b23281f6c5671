//! Port selection for the HTTP listener.
//!
//! # Responsibilities
//! - Bind the first free port of the configured range
//! - Skip ports that are taken or not permitted; fail on anything else

use std::io::ErrorKind;

use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind for a reason other than the port being unavailable.
    Bind(std::io::Error),
    /// Every port in the range was unavailable.
    NoFreePort { start: u16, end: u16 },
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::NoFreePort { start, end } => {
                write!(f, "No free port in range {}-{}", start, end)
            }
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) => Some(e),
            ListenerError::NoFreePort { .. } => None,
        }
    }
}

/// Bind `host` on the first port of the range that accepts us.
pub async fn bind_first_free(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    for port in config.port_range_start..=config.port_range_end {
        match TcpListener::bind((config.host.as_str(), port)).await {
            Ok(listener) => {
                let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
                tracing::info!(address = %local_addr, "Listener bound");
                return Ok(listener);
            }
            Err(e) if matches!(e.kind(), ErrorKind::AddrInUse | ErrorKind::PermissionDenied) => {
                tracing::debug!(port, error = %e, "Port unavailable, trying next");
            }
            Err(e) => return Err(ListenerError::Bind(e)),
        }
    }

    Err(ListenerError::NoFreePort {
        start: config.port_range_start,
        end: config.port_range_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u16, end: u16) -> ListenerConfig {
        ListenerConfig {
            host: "127.0.0.1".to_string(),
            port_range_start: start,
            port_range_end: end,
        }
    }

    #[tokio::test]
    async fn test_skips_taken_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        if port == u16::MAX {
            return;
        }

        match bind_first_free(&range(port, port.saturating_add(20))).await {
            Ok(listener) => assert!(listener.local_addr().unwrap().port() > port),
            // Every following port happened to be busy too.
            Err(e) => assert!(matches!(e, ListenerError::NoFreePort { .. })),
        }
    }

    #[tokio::test]
    async fn test_exhausted_range() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_first_free(&range(port, port)).await.unwrap_err();
        assert_eq!(err.to_string(), format!("No free port in range {port}-{port}"));
    }
}
