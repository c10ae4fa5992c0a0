//! Manually driven clock.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock that only moves when told to.
///
/// Time is kept as an offset in nanoseconds from a fixed origin. Clones share
/// the offset, so a test can hand one clone to the limiter and move time with
/// another.
///
/// `MockClock` does not drive `tokio::time::sleep`: delays computed against
/// it are still awaited on the runtime clock. Use it for window and
/// aggregation decisions, and a paused runtime when delays matter.
///
/// ```
/// use weighted_throttle::application::ports::Clock;
/// use weighted_throttle::infrastructure::mocks::MockClock;
/// use weighted_throttle::{AdmissionWindow, Weight};
/// use std::time::{Duration, Instant};
///
/// let clock = MockClock::new(Instant::now());
/// let mut window = AdmissionWindow::new(Duration::from_secs(1), clock.now());
///
/// assert!(window.admit(clock.now(), Weight::ONE, 1.0).is_immediate());
///
/// clock.advance(Duration::from_millis(1500));
/// assert!(window.admit(clock.now(), Weight::ONE, 1.0).is_immediate());
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a clock standing at `origin`.
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move the clock forward.
    ///
    /// Saturates at `u64::MAX` nanoseconds past the origin.
    pub fn advance(&self, duration: Duration) {
        let nanos = to_nanos(duration);
        let _ = self
            .offset_nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |offset| {
                Some(offset.saturating_add(nanos))
            });
    }

    /// Move the clock to `instant`, which must not lie before the origin.
    pub fn set(&self, instant: Instant) {
        let offset = instant.saturating_duration_since(self.origin);
        self.offset_nanos.store(to_nanos(offset), Ordering::SeqCst);
    }

    /// Time passed since the origin.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

fn to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
