//! Service configuration: TOML file, then command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use gl_ratelimit::{AdmissionConfig, RateLimitError};
use gl_store::CoordinatorConfig;
use gl_telemetry::{TelemetryConfig, TelemetryError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Effective configuration for every command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub admission: AdmissionConfig,
    pub store: CoordinatorConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid admission config: {0}")]
    Admission(#[from] RateLimitError),

    #[error("invalid telemetry config: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("invalid store config: store_timeout must be > 0")]
    StoreTimeout,
}

/// Flags shared by every command. Each one overrides the config file.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Path to a TOML configuration file.
    #[arg(long, global = true, env = "GREENLIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Per-client refill rate in requests per second.
    #[arg(long, global = true)]
    pub limiter_rps: Option<f64>,

    /// Per-client burst.
    #[arg(long, global = true)]
    pub limiter_burst: Option<u32>,

    /// Global refill rate in requests per second.
    #[arg(long, global = true)]
    pub global_rps: Option<f64>,

    /// Global burst.
    #[arg(long, global = true)]
    pub global_burst: Option<u32>,

    /// Upper bound on one store transaction, in seconds.
    #[arg(long, global = true)]
    pub store_timeout_secs: Option<u64>,

    /// Log level filter; `RUST_LOG` takes precedence.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit JSON logs on stderr.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Serve Prometheus metrics on this port.
    #[arg(long, global = true)]
    pub metrics_port: Option<u16>,
}

impl ServiceConfig {
    /// Load the file named by `args` (if any), apply flag overrides and validate.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the file cannot be read or parsed, or the
    /// result is invalid.
    pub fn load(args: &ConfigArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `Read` or `Parse` on failure.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_overrides(&mut self, args: &ConfigArgs) {
        if let Some(rps) = args.limiter_rps {
            self.admission.client.rate_per_second = rps;
        }
        if let Some(burst) = args.limiter_burst {
            self.admission.client.burst = burst;
        }
        if let Some(rps) = args.global_rps {
            self.admission.global.rate_per_second = rps;
        }
        if let Some(burst) = args.global_burst {
            self.admission.global.burst = burst;
        }
        if let Some(secs) = args.store_timeout_secs {
            self.store.store_timeout = Duration::from_secs(secs);
        }
        if let Some(level) = &args.log_level {
            self.telemetry.log_level.clone_from(level);
        }
        if args.json_logs {
            self.telemetry.json_logs = true;
        }
        if args.metrics_port.is_some() {
            self.telemetry.prometheus_port = args.metrics_port;
        }
    }

    /// # Errors
    /// Returns the first invalid section found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.admission.validate()?;
        if self.store.store_timeout.is_zero() {
            return Err(ConfigError::StoreTimeout);
        }
        self.telemetry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_the_service() {
        let config = ServiceConfig::load(&ConfigArgs::default()).unwrap();
        assert_eq!(config.admission.global.burst, 50);
        assert_eq!(config.admission.client.burst, 4);
        assert_eq!(config.admission.client.idle_timeout, Duration::from_secs(900));
        assert_eq!(config.store.store_timeout, Duration::from_secs(10));
    }

    #[test]
    fn file_sections_are_partial() {
        let file = write_config(
            r#"
            [admission.client]
            burst = 8
            sweep_interval = 30

            [store]
            store_timeout = 3
            "#,
        );
        let args = ConfigArgs {
            config: Some(file.path().to_path_buf()),
            ..ConfigArgs::default()
        };
        let config = ServiceConfig::load(&args).unwrap();

        assert_eq!(config.admission.client.burst, 8);
        assert_eq!(config.admission.client.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.admission.client.idle_timeout, Duration::from_secs(900));
        assert_eq!(config.store.store_timeout, Duration::from_secs(3));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn flags_override_file() {
        let file = write_config("[admission.global]\nburst = 10\nrate_per_second = 5.0\n");
        let args = ConfigArgs {
            config: Some(file.path().to_path_buf()),
            global_burst: Some(99),
            limiter_rps: Some(0.5),
            store_timeout_secs: Some(1),
            log_level: Some("debug".into()),
            json_logs: true,
            ..ConfigArgs::default()
        };
        let config = ServiceConfig::load(&args).unwrap();

        assert_eq!(config.admission.global.burst, 99);
        assert!((config.admission.global.rate_per_second - 5.0).abs() < f64::EPSILON);
        assert!((config.admission.client.rate_per_second - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.store.store_timeout, Duration::from_secs(1));
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn missing_file_is_read_error() {
        let args = ConfigArgs {
            config: Some(PathBuf::from("/nonexistent/greenlight.toml")),
            ..ConfigArgs::default()
        };
        assert!(matches!(
            ServiceConfig::load(&args),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let file = write_config("[admission.client\nburst = ");
        let args = ConfigArgs {
            config: Some(file.path().to_path_buf()),
            ..ConfigArgs::default()
        };
        assert!(matches!(
            ServiceConfig::load(&args),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let negative = ConfigArgs {
            limiter_rps: Some(-1.0),
            ..ConfigArgs::default()
        };
        assert!(matches!(
            ServiceConfig::load(&negative),
            Err(ConfigError::Admission(_))
        ));

        let zero_timeout = ConfigArgs {
            store_timeout_secs: Some(0),
            ..ConfigArgs::default()
        };
        assert!(matches!(
            ServiceConfig::load(&zero_timeout),
            Err(ConfigError::StoreTimeout)
        ));

        let bad_level = ConfigArgs {
            log_level: Some("gl_cli=loud".into()),
            ..ConfigArgs::default()
        };
        assert!(matches!(
            ServiceConfig::load(&bad_level),
            Err(ConfigError::Telemetry(_))
        ));
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let file = write_config("[admission.client]\nsweep_interval = 0\n");
        let args = ConfigArgs {
            config: Some(file.path().to_path_buf()),
            ..ConfigArgs::default()
        };
        assert!(matches!(
            ServiceConfig::load(&args),
            Err(ConfigError::Admission(RateLimitError::InvalidConfig(_)))
        ));
    }
}
