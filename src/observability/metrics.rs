//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ssr_requests_total` (counter): requests by outcome
//!   (rendered, not_found, error, asset, fallthrough)
//! - `ssr_render_duration_seconds` (histogram): time spent in the render entry
//! - `dev_bridge_requests_total` (counter): bridge responses by status

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// How a request left the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Rendered,
    NotFound,
    Error,
    Asset,
    Fallthrough,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Rendered => "rendered",
            Outcome::NotFound => "not_found",
            Outcome::Error => "error",
            Outcome::Asset => "asset",
            Outcome::Fallthrough => "fallthrough",
        }
    }
}

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_ssr(outcome: Outcome) {
    metrics::counter!("ssr_requests_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_render(start: Instant) {
    metrics::histogram!("ssr_render_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_bridge(status: u16) {
    metrics::counter!("dev_bridge_requests_total", "status" => status.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::NotFound.as_str(), "not_found");
        assert_eq!(Outcome::Fallthrough.as_str(), "fallthrough");
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_ssr(Outcome::Rendered);
        record_render(Instant::now());
        record_bridge(200);
    }
}
