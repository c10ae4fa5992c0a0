//! Observable limiter events.
//!
//! Each event is a plain record. Listeners receive them synchronously; the
//! `LimiterEvent` enum carries them over channels.

use serde::Serialize;
use std::time::Duration;

/// Admission budget was exhausted and a caller has to wait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaxRateExceeded {
    /// Budget per window at the time of the decision
    pub max_rate: f64,
    /// Weight already admitted in the window
    pub accumulated_ops: f64,
    /// Weight of the operation that did not fit
    pub weight: f64,
    /// How long the caller waits before running
    pub delay: Duration,
}

/// The maximum rate was changed to a different value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaxRateChanged {
    pub old_max_rate: f64,
    pub new_max_rate: f64,
}

/// Average throughput over the last aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AvgRateCalculated {
    /// Consumed weight per second
    pub avg_rate: f64,
    /// Length of the period the average covers
    pub period: Duration,
}

/// Any limiter event, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimiterEvent {
    MaxRateExceeded(MaxRateExceeded),
    MaxRateChanged(MaxRateChanged),
    AvgRateCalculated(AvgRateCalculated),
}

impl From<MaxRateExceeded> for LimiterEvent {
    fn from(event: MaxRateExceeded) -> Self {
        LimiterEvent::MaxRateExceeded(event)
    }
}

impl From<MaxRateChanged> for LimiterEvent {
    fn from(event: MaxRateChanged) -> Self {
        LimiterEvent::MaxRateChanged(event)
    }
}

impl From<AvgRateCalculated> for LimiterEvent {
    fn from(event: AvgRateCalculated) -> Self {
        LimiterEvent::AvgRateCalculated(event)
    }
}
