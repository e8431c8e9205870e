//! Telemetry configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::TelemetryError;

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, for terminals
    Text,
    /// One JSON object per line, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "text" | "pretty" | "fmt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::Config(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Configuration for node logging.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// `EnvFilter` directive (trace, debug, info, warn, error or per-target)
    pub log_level: String,

    pub log_format: LogFormat,

    /// Include the event target (module path) in text output
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tidal-chain".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            with_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TC_SERVICE_NAME`: Service name (default: tidal-chain)
    /// - `TC_LOG_LEVEL` or `RUST_LOG`: Filter directive (default: info)
    /// - `TC_LOG_FORMAT`: `text` or `json` (default: text, json in containers)
    /// - `TC_LOG_TARGET`: Show module targets (default: false)
    pub fn from_env() -> Result<Self, TelemetryError> {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();
        let defaults = Self::default();

        let log_format = match env::var("TC_LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) if is_container => LogFormat::Json,
            Err(_) => defaults.log_format,
        };

        Ok(Self {
            service_name: env::var("TC_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: env::var("TC_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            log_format,

            with_target: env::var("TC_LOG_TARGET")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.with_target),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "tidal-chain");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(TelemetryError::Config(_))
        ));
    }
}
