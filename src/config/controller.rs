//! # Controller Settings
//!
//! HTTP client and logging settings for the controller process.

use super::env_var_or_default;
use std::time::Duration;

/// Controller process configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Timeout for a single provider API request
    pub http_timeout: Duration,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            http_timeout: Duration::from_secs(DEFAULT_GIT_HTTP_TIMEOUT_SECS),
            log_filter: "netpol_gitops_controller=info".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        let defaults = Self::default();
        Self {
            http_timeout: Duration::from_secs(env_var_or_default(
                "GIT_HTTP_TIMEOUT_SECS",
                DEFAULT_GIT_HTTP_TIMEOUT_SECS,
            )),
            log_filter: env_var_or_default("LOG_FILTER", defaults.log_filter),
        }
    }
}
