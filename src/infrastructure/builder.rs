//! Builder and default wiring for the limiter.
//!
//! Wires the limiter to the in-memory adapters: `SystemClock`, an LRU-bounded
//! `ShardedStorage` for weight estimates and a `TracingListener`.

use crate::application::config::{ConfigError, RateLimiterConfig};
use crate::application::estimates::{EstimatedWeight, WeightEstimates};
use crate::application::limiter::WeightedRateLimiter;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, EvictionPolicy, RateLimitListener};
use crate::domain::operation::OperationName;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::eviction::LruEviction;
use crate::infrastructure::listeners::{FanoutListener, TracingListener};
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;
use std::time::Duration;

/// Storage used for weight estimates by the default limiter.
pub type EstimateStorage = Arc<ShardedStorage<OperationName, EstimatedWeight>>;

/// Limiter with in-memory estimate storage.
pub type RateLimiter = WeightedRateLimiter<EstimateStorage>;

/// Builder for configuring a [`RateLimiter`].
#[derive(Debug)]
pub struct RateLimiterBuilder {
    config: RateLimiterConfig,
    clock: Option<Arc<dyn Clock>>,
    listeners: Vec<Arc<dyn RateLimitListener>>,
    tracing_events: bool,
}

impl RateLimiterBuilder {
    fn from_config(config: RateLimiterConfig) -> Self {
        Self {
            config,
            clock: None,
            listeners: Vec::new(),
            tracing_events: true,
        }
    }

    /// Set the name attached to log events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Add a listener for limiter events.
    ///
    /// May be called several times; listeners are notified in the order they
    /// were added.
    pub fn with_listener(mut self, listener: Arc<dyn RateLimitListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Enable or disable logging limiter events through `tracing`.
    ///
    /// Default: enabled
    pub fn with_tracing_events(mut self, enabled: bool) -> Self {
        self.tracing_events = enabled;
        self
    }

    /// Set the maximum number of operation names with a cached weight estimate.
    ///
    /// When the limit is reached, the least recently used estimate is evicted.
    /// An evicted operation runs its next call as a first observation again.
    ///
    /// Default: 10,000 operation names
    ///
    /// The value will be validated when `build()` is called.
    pub fn with_max_tracked_operations(mut self, max_tracked_operations: usize) -> Self {
        self.config.max_tracked_operations = Some(max_tracked_operations);
        self
    }

    /// Disable the estimate limit, allowing unbounded growth.
    ///
    /// **Warning**: only use this when the set of operation names is known
    /// to be small, e.g. a fixed list of endpoints.
    pub fn with_unlimited_tracked_operations(mut self) -> Self {
        self.config.max_tracked_operations = None;
        self
    }

    /// Build the limiter.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn build(self) -> Result<RateLimiter, ConfigError> {
        self.config.validate()?;

        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        let mut storage = ShardedStorage::new().with_metrics(metrics.clone());
        if let Some(max_entries) = self.config.max_tracked_operations {
            let policy: Arc<dyn EvictionPolicy<OperationName, EstimatedWeight>> =
                Arc::new(LruEviction::new(max_entries));
            storage = storage.with_eviction_policy(policy);
        }

        let mut listeners = Vec::with_capacity(self.listeners.len() + 1);
        if self.tracing_events {
            let name = self.config.name.as_deref().unwrap_or("default");
            listeners.push(Arc::new(TracingListener::new(name)) as Arc<dyn RateLimitListener>);
        }
        listeners.extend(self.listeners);

        let listener: Arc<dyn RateLimitListener> = match listeners.len() {
            1 => listeners.remove(0),
            _ => Arc::new(FanoutListener::new(listeners)),
        };

        WeightedRateLimiter::from_parts(
            &self.config,
            WeightEstimates::new(Arc::new(storage)),
            clock,
            listener,
            metrics,
        )
    }
}

impl RateLimiter {
    /// Create a builder for a limiter admitting `max_rate` weight per
    /// `rate_interval`.
    ///
    /// Defaults:
    /// - Name: `default`
    /// - Clock: `SystemClock`
    /// - Max tracked operations: 10,000 (with LRU eviction)
    /// - Events: logged through `tracing`
    pub fn builder(max_rate: f64, rate_interval: Duration) -> RateLimiterBuilder {
        RateLimiterBuilder::from_config(RateLimiterConfig::new(max_rate, rate_interval))
    }

    /// Create a limiter with default settings.
    ///
    /// # Errors
    /// Returns `ConfigError` for a non-positive or non-finite `max_rate`, or a
    /// `rate_interval` that is zero or longer than 100 years.
    pub fn new(max_rate: f64, rate_interval: Duration) -> Result<Self, ConfigError> {
        Self::builder(max_rate, rate_interval).build()
    }

    /// Create a limiter from a deserialized config.
    ///
    /// # Example
    /// ```
    /// use weighted_throttle::{RateLimiter, RateLimiterConfig};
    ///
    /// let config: RateLimiterConfig = serde_json::from_str(
    ///     r#"{ "name": "search", "max_rate": 100, "rate_interval": "1m",
    ///          "max_tracked_operations": 500 }"#,
    /// )
    /// .unwrap();
    ///
    /// let limiter = RateLimiter::from_config(config).unwrap();
    /// assert_eq!(limiter.name(), "search");
    /// assert_eq!(limiter.max_rate(), 100.0);
    /// ```
    ///
    /// # Errors
    /// Returns `ConfigError` if the config does not validate.
    pub fn from_config(config: RateLimiterConfig) -> Result<Self, ConfigError> {
        RateLimiterBuilder::from_config(config).build()
    }
}
