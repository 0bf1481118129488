//! Greenlight Telemetry - Logging and Metrics for the Catalog Service
//!
//! - **Structured Logging**: JSON or human-readable logs on stderr, filtered
//!   by `RUST_LOG` or the configured level
//! - **Metrics Collection**: admission and update counters through the
//!   `metrics` facade, with optional Prometheus export
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gl_telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::default())?;
//!
//! tracing::info!(clients = 4, "starting simulation");
//! gl_telemetry::metrics::record_admission("admitted");
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod logging;
pub mod metrics;

pub use logging::init_logging;

use serde::{Deserialize, Serialize};

/// Configuration for telemetry initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to every log line.
    pub service_name: String,

    /// Log level filter (e.g., "info", "debug", "trace"). `RUST_LOG` wins.
    pub log_level: String,

    /// Enable JSON log output.
    pub json_logs: bool,

    /// Serve Prometheus metrics on this port when set.
    pub prometheus_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "greenlight".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            prometheus_port: None,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable JSON logs.
    #[must_use]
    pub const fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    /// Enable Prometheus metrics on the given port.
    #[must_use]
    pub const fn with_prometheus(mut self, port: u16) -> Self {
        self.prometheus_port = Some(port);
        self
    }

    /// # Errors
    /// Returns `TelemetryError::Config` if the log level is not a valid filter.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .map_err(|e| TelemetryError::Config(format!("log_level {:?}: {e}", self.log_level)))?;
        if self.prometheus_port == Some(0) {
            return Err(TelemetryError::Config(
                "prometheus_port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Initialize logging, metric descriptions and, if configured, the
/// Prometheus exporter.
///
/// Call once at startup.
///
/// # Errors
///
/// Returns an error if a global subscriber or recorder is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    init_logging(config)?;

    if let Some(port) = config.prometheus_port {
        crate::metrics::install_prometheus_exporter(port)?;
    }
    crate::metrics::describe_metrics();

    tracing::debug!(service = %config.service_name, "telemetry initialized");
    Ok(())
}

/// Telemetry error type.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Failed to initialize metrics.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "greenlight");
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert_eq!(config.prometheus_port, None);
    }

    #[test]
    fn test_telemetry_config_builder() {
        let config = TelemetryConfig::new("catalog")
            .with_log_level("debug")
            .with_json_logs(true)
            .with_prometheus(9100);

        assert_eq!(config.service_name, "catalog");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_logs);
        assert_eq!(config.prometheus_port, Some(9100));
    }

    #[test]
    fn test_validate_rejects_bad_filter() {
        let config = TelemetryConfig::default().with_log_level("gl_store=loud");
        assert!(matches!(config.validate(), Err(TelemetryError::Config(_))));
        assert!(TelemetryConfig::default()
            .with_log_level("gl_ratelimit=debug,info")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let config = TelemetryConfig::default().with_prometheus(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"json_logs": true}"#).unwrap();
        assert!(config.json_logs);
        assert_eq!(config.log_level, "info");
    }
}
