//! Observability metrics for rate limiting.
//!
//! Provides counters about admission behavior for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Metrics tracking limiter statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Operations that passed admission, delayed or not
    operations_admitted: AtomicU64,
    /// Operations that had to wait for a new window
    operations_delayed: AtomicU64,
    /// Sum of all admission delays in milliseconds
    total_delay_ms: AtomicU64,
    /// Operations whose usage was recorded after completion
    operations_completed: AtomicU64,
    /// Effective max rate changes
    max_rate_changes: AtomicU64,
    /// Weight estimates evicted from the operation cache
    estimates_evicted: AtomicU64,
    /// Last computed average rate, as f64 bits
    last_avg_rate: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.operations_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delayed(&self, delay: Duration) {
        self.inner.operations_delayed.fetch_add(1, Ordering::Relaxed);
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner
            .total_delay_ms
            .fetch_add(millis, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.inner
            .operations_completed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_max_rate_change(&self) {
        self.inner.max_rate_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.inner.estimates_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_avg_rate(&self, avg_rate: f64) {
        self.inner
            .last_avg_rate
            .store(avg_rate.to_bits(), Ordering::Relaxed);
    }

    /// Get the number of admitted operations.
    pub fn operations_admitted(&self) -> u64 {
        self.inner.operations_admitted.load(Ordering::Relaxed)
    }

    /// Get the number of delayed operations.
    pub fn operations_delayed(&self) -> u64 {
        self.inner.operations_delayed.load(Ordering::Relaxed)
    }

    /// Get the total time callers spent waiting for admission.
    pub fn total_delay(&self) -> Duration {
        Duration::from_millis(self.inner.total_delay_ms.load(Ordering::Relaxed))
    }

    /// Get the number of operations whose usage was recorded.
    pub fn operations_completed(&self) -> u64 {
        self.inner.operations_completed.load(Ordering::Relaxed)
    }

    /// Get the number of effective max rate changes.
    pub fn max_rate_changes(&self) -> u64 {
        self.inner.max_rate_changes.load(Ordering::Relaxed)
    }

    /// Get the number of evicted weight estimates.
    pub fn estimates_evicted(&self) -> u64 {
        self.inner.estimates_evicted.load(Ordering::Relaxed)
    }

    /// Get the last computed average rate.
    pub fn last_avg_rate(&self) -> f64 {
        f64::from_bits(self.inner.last_avg_rate.load(Ordering::Relaxed))
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations_admitted: self.operations_admitted(),
            operations_delayed: self.operations_delayed(),
            total_delay: self.total_delay(),
            operations_completed: self.operations_completed(),
            max_rate_changes: self.max_rate_changes(),
            estimates_evicted: self.estimates_evicted(),
            last_avg_rate: self.last_avg_rate(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.operations_admitted.store(0, Ordering::Relaxed);
        self.inner.operations_delayed.store(0, Ordering::Relaxed);
        self.inner.total_delay_ms.store(0, Ordering::Relaxed);
        self.inner.operations_completed.store(0, Ordering::Relaxed);
        self.inner.max_rate_changes.store(0, Ordering::Relaxed);
        self.inner.estimates_evicted.store(0, Ordering::Relaxed);
        self.inner
            .last_avg_rate
            .store(0f64.to_bits(), Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub operations_admitted: u64,
    pub operations_delayed: u64,
    pub total_delay: Duration,
    pub operations_completed: u64,
    pub max_rate_changes: u64,
    pub estimates_evicted: u64,
    pub last_avg_rate: f64,
}

impl MetricsSnapshot {
    /// Fraction of admitted operations that had to wait (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been admitted.
    pub fn delay_ratio(&self) -> f64 {
        if self.operations_admitted == 0 {
            0.0
        } else {
            self.operations_delayed as f64 / self.operations_admitted as f64
        }
    }

    /// Mean wait of delayed operations.
    pub fn mean_delay(&self) -> Duration {
        match u32::try_from(self.operations_delayed) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total_delay / count,
            Err(_) => self
                .total_delay
                .div_f64(self.operations_delayed as f64),
        }
    }
}
