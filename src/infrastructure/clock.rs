//! Production clock.
//!
//! Tests that need to move time by hand can use `MockClock` from
//! `crate::infrastructure::mocks` (`test-helpers` feature).

use crate::application::ports::Clock;
use std::time::Instant;

/// Clock backed by the tokio time driver.
///
/// Reads `tokio::time::Instant`, so when a runtime's clock is paused the
/// limiter sees the same virtual time as `tokio::time::sleep`. Outside a
/// runtime this is plain monotonic time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
