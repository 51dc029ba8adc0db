//! Application metadata and environment helpers

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;

/// Process-level settings shared by binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    /// Application name
    pub app_name: String,
    /// Application version
    pub app_version: String,
    /// Default log level (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Log line format
    pub log_format: LogFormat,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            app_name: "stock-research".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl AppInfo {
    /// Read `LOG_LEVEL` and `LOG_FORMAT`, keeping defaults for anything unset or invalid
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env_var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env_parse("LOG_FORMAT").unwrap_or(defaults.log_format),
            ..defaults
        }
    }
}

/// Read a non-empty environment variable
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read and parse an environment variable, ignoring unset or unparsable values
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|value| value.parse().ok())
}
