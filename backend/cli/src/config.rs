use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// locshare runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// Inactivity after which a session is reaped
    pub idle_timeout_secs: u64,
    /// Time between reaper sweeps
    pub sweep_interval_secs: u64,
    /// Browser client directory, served at `/`
    pub static_dir: Option<PathBuf>,
    /// Directory for rolling JSON logs
    pub log_dir: Option<PathBuf>,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            idle_timeout_secs: 600,
            sweep_interval_secs: 60,
            static_dir: None,
            log_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] over an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_address: var("LOCSHARE_BIND").unwrap_or(defaults.bind_address),
            port: var("LOCSHARE_PORT")
                .or_else(|| var("PORT"))
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            idle_timeout_secs: var("LOCSHARE_IDLE_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.idle_timeout_secs),
            sweep_interval_secs: var("LOCSHARE_SWEEP_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.sweep_interval_secs),
            static_dir: var("LOCSHARE_STATIC_DIR").map(PathBuf::from),
            log_dir: var("LOCSHARE_LOG_DIR").map(PathBuf::from),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.bind_address, self.port))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
