//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{check, read_config, ConfigError};
use crate::config::schema::{Mode, ServerConfig};

/// Serve a server-rendered web application.
#[derive(Debug, Clone, Parser)]
#[command(name = "ssr-host", version, about)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "SSR_HOST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project root.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Runtime mode (`production`, `test`, anything else is development).
    #[arg(long, env = "NODE_ENV")]
    pub mode: Option<String>,

    /// HMR WebSocket port.
    #[arg(long)]
    pub hmr_port: Option<u16>,
}

impl Cli {
    /// Load the file (if any), apply overrides, then validate.
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        check(config)
    }

    fn apply(&self, config: &mut ServerConfig) {
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(mode) = &self.mode {
            config.mode = Mode::from_env_value(mode);
        }
        if let Some(port) = self.hmr_port {
            config.dev.hmr_port = port;
        }
    }
}
