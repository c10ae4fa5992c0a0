//! Limiter configuration.
//!
//! `RateLimiterConfig` can be deserialized from any serde format. Durations
//! are written in human-readable form:
//!
//! ```
//! use weighted_throttle::RateLimiterConfig;
//! use std::time::Duration;
//!
//! let config: RateLimiterConfig = serde_json::from_str(
//!     r#"{ "name": "billing-api", "max_rate": 12.5, "rate_interval": "1h" }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.rate_interval, Duration::from_secs(3600));
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Default bound on distinct operation names with cached weight estimates.
pub const DEFAULT_MAX_TRACKED_OPERATIONS: usize = 10_000;

/// Longest accepted rate interval (100 years).
pub const MAX_RATE_INTERVAL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Error returned when limiter configuration is invalid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The max rate must be a positive, finite number
    #[error("max_rate must be a positive finite number, got {0}")]
    InvalidMaxRate(f64),
    /// The rate interval must be longer than zero
    #[error("rate_interval must be greater than 0")]
    ZeroRateInterval,
    /// The rate interval must stay within `MAX_RATE_INTERVAL`
    #[error("rate_interval must be at most 100 years, got {0:?}")]
    RateIntervalTooLong(Duration),
    /// A bounded operation cache needs room for at least one entry
    #[error("max_tracked_operations must be greater than 0")]
    ZeroMaxTrackedOperations,
}

/// Settings for one limiter instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateLimiterConfig {
    /// Label attached to log events, usually the limited resource
    #[serde(default)]
    pub name: Option<String>,
    /// Budget of accumulated weight per interval
    pub max_rate: f64,
    /// Length of the admission window
    #[serde(deserialize_with = "deserialize_duration")]
    pub rate_interval: Duration,
    /// Bound on cached weight estimates; `null` disables the bound
    #[serde(default = "default_max_tracked_operations")]
    pub max_tracked_operations: Option<usize>,
}

impl RateLimiterConfig {
    /// Create a config with defaults for everything but the rate.
    pub fn new(max_rate: f64, rate_interval: Duration) -> Self {
        Self {
            name: None,
            max_rate,
            rate_interval,
            max_tracked_operations: default_max_tracked_operations(),
        }
    }

    /// Check the config for values the limiter cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_max_rate(self.max_rate)?;
        if self.rate_interval.is_zero() {
            return Err(ConfigError::ZeroRateInterval);
        }
        if self.rate_interval > MAX_RATE_INTERVAL {
            return Err(ConfigError::RateIntervalTooLong(self.rate_interval));
        }
        if self.max_tracked_operations == Some(0) {
            return Err(ConfigError::ZeroMaxTrackedOperations);
        }
        Ok(())
    }
}

pub(crate) fn validate_max_rate(max_rate: f64) -> Result<(), ConfigError> {
    if max_rate.is_finite() && max_rate > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidMaxRate(max_rate))
    }
}

fn default_max_tracked_operations() -> Option<usize> {
    Some(DEFAULT_MAX_TRACKED_OPERATIONS)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
