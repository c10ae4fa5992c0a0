//! Recording listener for testing.

use crate::application::ports::RateLimitListener;
use crate::domain::events::{AvgRateCalculated, LimiterEvent, MaxRateChanged, MaxRateExceeded};
use std::sync::{Arc, Mutex};

/// Listener that records every event it receives, in order.
///
/// Clones share the same record.
///
/// # Examples
///
/// ```
/// use weighted_throttle::infrastructure::mocks::RecordingListener;
/// use weighted_throttle::{LimiterEvent, MaxRateChanged, RateLimitListener};
///
/// let listener = RecordingListener::new();
/// listener.on_max_rate_changed(&MaxRateChanged { old_max_rate: 1.0, new_max_rate: 2.0 });
///
/// assert_eq!(listener.count(), 1);
/// assert!(matches!(listener.events()[0], LimiterEvent::MaxRateChanged(_)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<LimiterEvent>>>,
}

impl RecordingListener {
    /// Create an empty recording listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events.
    pub fn events(&self) -> Vec<LimiterEvent> {
        self.lock().clone()
    }

    /// Number of recorded events.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Recorded exceedances only.
    pub fn exceeded(&self) -> Vec<MaxRateExceeded> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                LimiterEvent::MaxRateExceeded(e) => Some(*e),
                _ => None,
            })
            .collect()
    }

    /// Recorded max rate changes only.
    pub fn changes(&self) -> Vec<MaxRateChanged> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                LimiterEvent::MaxRateChanged(e) => Some(*e),
                _ => None,
            })
            .collect()
    }

    /// Recorded average rates only.
    pub fn avg_rates(&self) -> Vec<AvgRateCalculated> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                LimiterEvent::AvgRateCalculated(e) => Some(*e),
                _ => None,
            })
            .collect()
    }

    /// Forget all recorded events.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LimiterEvent>> {
        self.events.lock().expect(
            "RecordingListener mutex poisoned - a test thread panicked while holding the lock",
        )
    }
}

impl RateLimitListener for RecordingListener {
    fn on_max_rate_exceeded(&self, event: &MaxRateExceeded) {
        self.lock().push((*event).into());
    }

    fn on_max_rate_changed(&self, event: &MaxRateChanged) {
        self.lock().push((*event).into());
    }

    fn on_avg_rate_calculated(&self, event: &AvgRateCalculated) {
        self.lock().push((*event).into());
    }
}
