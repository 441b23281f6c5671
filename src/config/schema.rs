//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults, so an empty file is a valid development
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Development, production or test behavior.
    pub mode: Mode,

    /// Project root: dev server root and base for relative paths.
    pub root: PathBuf,

    /// Listener configuration (host, port range).
    pub listener: ListenerConfig,

    /// Dev server settings (HMR, watching, SSR module loading).
    pub dev: DevConfig,

    /// Production settings (static assets, built render entry).
    pub production: ProductionConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            root: PathBuf::from("."),
            listener: ListenerConfig::default(),
            dev: DevConfig::default(),
            production: ProductionConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// `path` resolved against the project root unless already absolute.
    pub fn resolve(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Log level after applying the mode (test mode is quiet).
    pub fn effective_log_level(&self) -> &str {
        if self.mode == Mode::Test {
            "error"
        } else {
            &self.observability.log_level
        }
    }
}

/// Runtime mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
    /// Development behavior with quiet logging; the binary does not listen.
    Test,
}

impl Mode {
    /// Interpret an environment value such as `NODE_ENV`.
    ///
    /// Only `production` and `test` are special; anything else is development.
    pub fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Mode::Production,
            "test" => Mode::Test,
            _ => Mode::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Mode::Production
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// First port tried.
    pub port_range_start: u16,

    /// Last port tried (inclusive).
    pub port_range_end: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port_range_start: 3000,
            port_range_end: 3100,
        }
    }
}

/// Development server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevConfig {
    /// HMR WebSocket port (0 picks a free one).
    pub hmr_port: u16,

    /// Poll the file system instead of relying on native events.
    pub use_polling: bool,

    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Program and arguments that execute an SSR module.
    pub ssr_command: Vec<String>,

    /// Root-relative SSR module loaded per request.
    pub entry_module: String,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            hmr_port: 24678,
            use_polling: true,
            poll_interval_ms: 100,
            ssr_command: vec!["npx".to_string(), "tsx".to_string()],
            entry_module: "/src/entry-server.tsx".to_string(),
        }
    }
}

impl DevConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Production configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Built client assets, served under `/`.
    pub static_dir: PathBuf,

    /// Program and arguments of the built render entry.
    pub render_command: Vec<String>,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("dist/client"),
            render_command: vec![
                "node".to_string(),
                "dist/server/entry-server.js".to_string(),
            ],
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body buffered for the dev bridge, in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.listener.port_range_start, 3000);
        assert_eq!(config.listener.port_range_end, 3100);
        assert_eq!(config.dev.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.production.static_dir, PathBuf::from("dist/client"));
    }

    #[test]
    fn test_partial_sections() {
        let config: ServerConfig = toml::from_str(
            r#"
            mode = "production"

            [dev]
            hmr_port = 5174

            [production]
            render_command = ["bun", "dist/server/entry-server.js"]
            "#,
        )
        .unwrap();
        assert!(config.mode.is_production());
        assert_eq!(config.dev.hmr_port, 5174);
        assert!(config.dev.use_polling);
        assert_eq!(config.production.render_command[0], "bun");
    }

    #[test]
    fn test_mode_from_env_value() {
        assert_eq!(Mode::from_env_value("production"), Mode::Production);
        assert_eq!(Mode::from_env_value("TEST"), Mode::Test);
        assert_eq!(Mode::from_env_value("development"), Mode::Development);
        assert_eq!(Mode::from_env_value(""), Mode::Development);
    }

    #[test]
    fn test_test_mode_is_quiet() {
        let mut config = ServerConfig::default();
        assert_eq!(config.effective_log_level(), "info");
        config.mode = Mode::Test;
        assert_eq!(config.effective_log_level(), "error");
    }
}
