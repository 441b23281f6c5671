//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, intervals, limits)
//! - Check that the command for the active mode is present
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener port range {start}-{end} is empty")]
    EmptyPortRange { start: u16, end: u16 },

    #[error("listener port range must not start at 0")]
    ZeroPort,

    #[error("HMR port {0} overlaps the listener port range")]
    HmrPortInRange(u16),

    #[error("dev.poll_interval_ms must be greater than 0")]
    ZeroPollInterval,

    #[error("dev.ssr_command must name a program")]
    EmptySsrCommand,

    #[error("dev.entry_module must be root-relative (start with '/'), got `{0}`")]
    RelativeEntryModule(String),

    #[error("production.render_command must name a program")]
    EmptyRenderCommand,

    #[error("limits.max_body_size must be greater than 0")]
    ZeroBodyLimit,

    #[error("unknown log level `{0}`")]
    UnknownLogLevel(String),

    #[error("invalid metrics address `{0}`")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.port_range_start > listener.port_range_end {
        errors.push(ValidationError::EmptyPortRange {
            start: listener.port_range_start,
            end: listener.port_range_end,
        });
    }
    if listener.port_range_start == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    if config.mode.is_production() {
        if config.production.render_command.is_empty() {
            errors.push(ValidationError::EmptyRenderCommand);
        }
    } else {
        let dev = &config.dev;
        if dev.hmr_port != 0
            && (listener.port_range_start..=listener.port_range_end).contains(&dev.hmr_port)
        {
            errors.push(ValidationError::HmrPortInRange(dev.hmr_port));
        }
        if dev.poll_interval_ms == 0 {
            errors.push(ValidationError::ZeroPollInterval);
        }
        if dev.ssr_command.is_empty() {
            errors.push(ValidationError::EmptySsrCommand);
        }
        if !dev.entry_module.starts_with('/') {
            errors.push(ValidationError::RelativeEntryModule(dev.entry_module.clone()));
        }
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
