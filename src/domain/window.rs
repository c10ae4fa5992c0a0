//! Admission window accounting.
//!
//! The window tracks how much weight has been admitted since it started. When
//! the budget for the current window is spent, the caller is told how long to
//! wait and the window is re-based to start after that wait.
//!
//! All methods take the current instant explicitly; the window never reads a
//! clock on its own.

use crate::domain::events::MaxRateExceeded;
use crate::domain::weight::Weight;
use std::time::{Duration, Instant};

/// Outcome of an admission request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Budget remains, run now
    Immediate,
    /// Budget exhausted; wait out the rest of the window first
    Delayed(MaxRateExceeded),
}

impl Admission {
    /// Delay the caller must observe before running.
    pub fn delay(&self) -> Duration {
        match self {
            Admission::Immediate => Duration::ZERO,
            Admission::Delayed(exceeded) => exceeded.delay,
        }
    }

    /// Check if the admission is immediate.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Admission::Immediate)
    }
}

/// Rolling admission window.
#[derive(Debug, Clone)]
pub struct AdmissionWindow {
    interval: Duration,
    accumulated_ops: f64,
    accumulated_since: Instant,
}

impl AdmissionWindow {
    /// Create an empty window starting at `now`.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            accumulated_ops: 0.0,
            accumulated_since: now,
        }
    }

    /// Decide whether an operation of `weight` may run now.
    ///
    /// A single operation is always admitted into an empty window, even when
    /// its weight alone exceeds `max_rate`, so an oversized operation can
    /// never starve.
    pub fn admit(&mut self, now: Instant, weight: Weight, max_rate: f64) -> Admission {
        let weight = weight.get();

        if self.has_elapsed(now) {
            self.reset(weight, now);
            return Admission::Immediate;
        }

        if self.accumulated_ops + weight <= max_rate || self.accumulated_ops == 0.0 {
            self.accumulated_ops += weight;
            return Admission::Immediate;
        }

        let delay = match self.window_end() {
            Some(end) => round_to_millis(end.saturating_duration_since(now)),
            None => self.interval,
        };
        let exceeded = MaxRateExceeded {
            max_rate,
            accumulated_ops: self.accumulated_ops,
            weight,
            delay,
        };

        // The next window starts once this caller has waited
        self.reset(weight, now.checked_add(delay).unwrap_or(now));
        Admission::Delayed(exceeded)
    }

    /// Record weight that has already been spent, without asking for a delay.
    ///
    /// Used when the cost of an operation is only known after it ran.
    /// The window may end up over budget; later admissions pay it back.
    pub fn charge(&mut self, now: Instant, weight: Weight) {
        if self.has_elapsed(now) {
            self.reset(weight.get(), now);
        } else {
            self.accumulated_ops += weight.get();
        }
    }

    /// Weight admitted in the current window.
    pub fn accumulated_ops(&self) -> f64 {
        self.accumulated_ops
    }

    /// Start of the current window. May lie in the future right after a delay.
    pub fn accumulated_since(&self) -> Instant {
        self.accumulated_since
    }

    /// Length of the window.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `None` when the end is not representable as an `Instant`.
    fn window_end(&self) -> Option<Instant> {
        self.accumulated_since.checked_add(self.interval)
    }

    fn has_elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.accumulated_since) > self.interval
    }

    fn reset(&mut self, weight: f64, since: Instant) {
        self.accumulated_ops = weight;
        self.accumulated_since = since;
    }
}

fn round_to_millis(duration: Duration) -> Duration {
    let millis = (duration.as_secs_f64() * 1000.0).round();
    Duration::from_millis(millis as u64)
}
