//! Admission control configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RateLimitError;

/// Shared bucket protecting aggregate capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalLimitConfig {
    /// Tokens added per second.
    ///
    /// Default: 20
    pub rate_per_second: f64,

    /// Bucket capacity.
    ///
    /// Default: 50
    pub burst: u32,
}

impl Default for GlobalLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 20.0,
            burst: 50,
        }
    }
}

impl GlobalLimitConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the rate is negative or not finite.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        validate_rate("global.rate_per_second", self.rate_per_second)
    }
}

/// Per-client buckets and their idle eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientLimitConfig {
    /// Tokens added per second to each client bucket.
    ///
    /// Default: 2
    pub rate_per_second: f64,

    /// Capacity of each client bucket.
    ///
    /// Default: 4
    pub burst: u32,

    /// How often the eviction sweep runs.
    ///
    /// Default: 10 minutes
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,

    /// Entries idle for longer than this are evicted.
    ///
    /// Default: 15 minutes
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
}

impl Default for ClientLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 2.0,
            burst: 4,
            sweep_interval: Duration::from_secs(10 * 60),
            idle_timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl ClientLimitConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a bad rate or a zero sweep interval / idle timeout.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        validate_rate("client.rate_per_second", self.rate_per_second)?;
        if self.sweep_interval.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "client.sweep_interval must be > 0".into(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "client.idle_timeout must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Both tiers of the admission gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub global: GlobalLimitConfig,
    pub client: ClientLimitConfig,
}

impl AdmissionConfig {
    /// Validate both tiers.
    ///
    /// # Errors
    /// Returns the first `InvalidConfig` found.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        self.global.validate()?;
        self.client.validate()
    }
}

fn validate_rate(field: &str, rate: f64) -> Result<(), RateLimitError> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(RateLimitError::InvalidConfig(format!(
            "{field} must be a finite, non-negative number (got {rate})"
        )));
    }
    Ok(())
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
