//! # Metrics Server Settings
//!
//! Port and startup deadline of the `/metrics`, `/healthz` and `/readyz` listener.

use std::time::Duration;

/// Settings of the metrics and health listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub metrics_port: u16,
    /// Startup fails when the listener is not accepting by then
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout: Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// `METRICS_PORT` and `SERVER_STARTUP_TIMEOUT_SECS`, defaults for unset or unparsable values
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            metrics_port: var("METRICS_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_port),
            startup_timeout: var("SERVER_STARTUP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map_or(defaults.startup_timeout, Duration::from_secs),
        }
    }
}
