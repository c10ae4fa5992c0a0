//! # weighted-throttle
//!
//! Weighted sliding-window rate limiting for async operations.
//!
//! A limiter admits operations so that, within a rate interval, the sum of
//! their weights stays within a maximum rate. Weights are arbitrary
//! non-negative numbers: a cost in API credits, a number of rows, a payload
//! size. Callers are never rejected; when the budget of the current window is
//! spent they wait until the window ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use weighted_throttle::{RateLimiter, Weight};
//! use std::time::Duration;
//!
//! # async fn fetch_page(_: u32) -> Vec<u8> { Vec::new() }
//! # #[tokio::main]
//! # async fn main() {
//! // 12.5 credits per hour
//! let limiter = RateLimiter::new(12.5, Duration::from_secs(3600)).unwrap();
//!
//! // Each page costs 1.5 credits
//! let page = limiter
//!     .execute_weighted(Weight::new(1.5).unwrap(), || fetch_page(1))
//!     .await;
//! # let _ = page;
//! # }
//! ```
//!
//! ## Admission
//!
//! Admission decisions are serialized in FIFO order. For an operation of
//! weight `w`:
//!
//! - if the current window is older than the rate interval, it is reset
//! - if `w` fits into the remaining budget, or nothing was admitted in the
//!   window yet, the operation starts immediately
//! - otherwise the operation waits until the window ends and opens the next
//!   window with its own weight
//!
//! The second rule lets a single operation heavier than the whole budget
//! through instead of blocking forever. While one caller waits out a delay,
//! callers queued behind it wait too.
//!
//! ## Estimated Weights
//!
//! Some operations only reveal their cost once they completed. Give them a
//! name and a weight calculator; the highest weight observed per name is
//! used to admit later calls:
//!
//! ```rust,no_run
//! # use weighted_throttle::RateLimiter;
//! # use std::time::Duration;
//! # async fn search(_: &str) -> Vec<String> { Vec::new() }
//! # #[tokio::main]
//! # async fn main() {
//! # let limiter = RateLimiter::new(1000.0, Duration::from_secs(60)).unwrap();
//! let hits = limiter
//!     .execute_with_estimated_weight(
//!         "search",
//!         || search("rust"),
//!         |hits| Some(hits.len() as f64),
//!     )
//!     .await;
//! # let _ = hits;
//! # }
//! ```
//!
//! The first call for a name runs while holding the admission lock, so no
//! other operation is admitted until its weight is known. Operation names
//! are case-insensitive. At most 10,000 names are tracked by default; the
//! least recently used estimate is evicted beyond that.
//!
//! ## Errors and Cancellation
//!
//! Fallible operations go through `try_execute_weighted` and
//! `try_execute_with_estimated_weight`. Their errors are returned as they
//! are. Weight admitted for a failed operation stays spent, but no usage is
//! recorded.
//!
//! `execute_weighted_cancellable` races a `CancellationToken` against the
//! wait for admission and against the operation itself.
//!
//! ## Observability
//!
//! Limiter events are delivered to [`RateLimitListener`]s:
//!
//! - [`TracingListener`] logs them as structured `tracing` events (installed
//!   by default)
//! - [`ChannelListener`] forwards [`LimiterEvent`]s to a bounded channel
//! - custom listeners implement the trait directly
//!
//! ```rust,no_run
//! use weighted_throttle::{ChannelListener, RateLimiter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let (events, mut receiver) = ChannelListener::bounded(64);
//! let limiter = RateLimiter::builder(100.0, Duration::from_secs(1))
//!     .with_name("billing-api")
//!     .with_listener(Arc::new(events))
//!     .build()
//!     .unwrap();
//! ```
//!
//! Counters for admissions, delays and evictions are available through
//! [`RateLimiter::metrics`](WeightedRateLimiter::metrics). Every 10 seconds
//! of activity, the limiter computes the average throughput in weight per
//! second.
//!
//! ## Configuration
//!
//! [`RateLimiterConfig`] deserializes from any serde format, with durations
//! written like `"1h"` or `"250ms"`:
//!
//! ```rust,no_run
//! # use weighted_throttle::{RateLimiter, RateLimiterConfig};
//! let config: RateLimiterConfig = serde_json::from_str(
//!     r#"{ "name": "search", "max_rate": 100, "rate_interval": "1m" }"#,
//! )
//! .unwrap();
//! let limiter = RateLimiter::from_config(config).unwrap();
//! ```

// Domain layer - pure rate accounting
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    events::{AvgRateCalculated, LimiterEvent, MaxRateChanged, MaxRateExceeded},
    operation::OperationName,
    usage::AGGREGATION_PERIOD,
    weight::{Weight, WeightError},
    window::{Admission, AdmissionWindow},
};

pub use application::{
    config::{
        ConfigError, RateLimiterConfig, DEFAULT_MAX_TRACKED_OPERATIONS, MAX_RATE_INTERVAL,
    },
    estimates::{EstimatedWeight, WeightEstimates},
    limiter::{Cancelled, LimiterSnapshot, WeightedRateLimiter},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, EvictionCandidate, EvictionPolicy, RateLimitListener, Storage},
};

pub use infrastructure::{
    builder::{EstimateStorage, RateLimiter, RateLimiterBuilder},
    clock::SystemClock,
    eviction::LruEviction,
    listeners::{ChannelListener, FanoutListener, NoopListener, TracingListener},
    storage::ShardedStorage,
};

pub use tokio_util::sync::CancellationToken;
