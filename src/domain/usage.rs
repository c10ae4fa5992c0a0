//! Average throughput aggregation.
//!
//! Consumed weight is summed over a fixed aggregation period. Once a period
//! has passed, the next recorded operation closes it and yields the average
//! rate in weight per second.

use crate::domain::events::AvgRateCalculated;
use crate::domain::weight::Weight;
use std::time::{Duration, Instant};

/// Length of the aggregation period.
pub const AGGREGATION_PERIOD: Duration = Duration::from_secs(10);

/// Accumulates consumed weight and computes average rates.
#[derive(Debug, Clone)]
pub struct UsageAggregator {
    ops_consumed: f64,
    ops_consumed_since: Instant,
    avg_rate: f64,
}

impl UsageAggregator {
    /// Create an aggregator whose first period starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            ops_consumed: 0.0,
            ops_consumed_since: now,
            avg_rate: 0.0,
        }
    }

    /// Record consumed weight.
    ///
    /// Returns the computed average when this call closes a period. The
    /// closing weight is not part of the closed period; it starts the next one.
    pub fn record(&mut self, now: Instant, weight: Weight) -> Option<AvgRateCalculated> {
        let elapsed = now.saturating_duration_since(self.ops_consumed_since);

        if elapsed < AGGREGATION_PERIOD {
            self.ops_consumed += weight.get();
            return None;
        }

        self.avg_rate = self.ops_consumed / elapsed.as_secs_f64();
        self.ops_consumed = weight.get();
        self.ops_consumed_since = now;

        Some(AvgRateCalculated {
            avg_rate: self.avg_rate,
            period: elapsed,
        })
    }

    /// Most recently computed average rate (0 until the first period closes).
    pub fn avg_rate(&self) -> f64 {
        self.avg_rate
    }

    /// Weight consumed in the open period.
    pub fn ops_consumed(&self) -> f64 {
        self.ops_consumed
    }

    /// Start of the open period.
    pub fn ops_consumed_since(&self) -> Instant {
        self.ops_consumed_since
    }
}
