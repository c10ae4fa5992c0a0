//! Listener adapters for limiter events.
//!
//! - `TracingListener` turns events into structured `tracing` events
//! - `ChannelListener` forwards events into a bounded tokio channel
//! - `FanoutListener` forwards events to several listeners
//! - `NoopListener` ignores everything

use crate::application::ports::RateLimitListener;
use crate::domain::events::{AvgRateCalculated, LimiterEvent, MaxRateChanged, MaxRateExceeded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Listener that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl RateLimitListener for NoopListener {}

/// Listener that logs events through `tracing`.
///
/// Exceedances are logged at `WARN`, max rate changes at `INFO` and average
/// rates at `DEBUG`. Every event carries a `limiter` field.
#[derive(Debug, Clone)]
pub struct TracingListener {
    limiter: Arc<str>,
}

impl TracingListener {
    /// Create a listener labelling events with the limiter name.
    pub fn new(limiter: impl Into<Arc<str>>) -> Self {
        Self {
            limiter: limiter.into(),
        }
    }
}

impl Default for TracingListener {
    fn default() -> Self {
        Self::new("default")
    }
}

impl RateLimitListener for TracingListener {
    fn on_max_rate_exceeded(&self, event: &MaxRateExceeded) {
        tracing::warn!(
            limiter = %self.limiter,
            max_rate = event.max_rate,
            accumulated_ops = event.accumulated_ops,
            weight = event.weight,
            delay_ms = event.delay.as_millis() as u64,
            "max rate exceeded, delaying operation"
        );
    }

    fn on_max_rate_changed(&self, event: &MaxRateChanged) {
        tracing::info!(
            limiter = %self.limiter,
            old_max_rate = event.old_max_rate,
            new_max_rate = event.new_max_rate,
            "max rate changed"
        );
    }

    fn on_avg_rate_calculated(&self, event: &AvgRateCalculated) {
        tracing::debug!(
            limiter = %self.limiter,
            avg_rate = event.avg_rate,
            period_ms = event.period.as_millis() as u64,
            "average rate calculated"
        );
    }
}

/// Listener that forwards events into a bounded channel.
///
/// Sending never waits: when the channel is full or closed the event is
/// dropped and counted, so a slow consumer cannot stall admission.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::Sender<LimiterEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel.
    ///
    /// # Panics
    /// Panics if `capacity` is zero, like `tokio::sync::mpsc::channel`.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<LimiterEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let listener = Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (listener, receiver)
    }

    /// Number of events dropped because the channel was full or closed.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, event: LimiterEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl RateLimitListener for ChannelListener {
    fn on_max_rate_exceeded(&self, event: &MaxRateExceeded) {
        self.forward((*event).into());
    }

    fn on_max_rate_changed(&self, event: &MaxRateChanged) {
        self.forward((*event).into());
    }

    fn on_avg_rate_calculated(&self, event: &AvgRateCalculated) {
        self.forward((*event).into());
    }
}

/// Listener that forwards every event to each inner listener in order.
#[derive(Debug, Clone, Default)]
pub struct FanoutListener {
    listeners: Vec<Arc<dyn RateLimitListener>>,
}

impl FanoutListener {
    /// Create a fan-out over the given listeners.
    pub fn new(listeners: Vec<Arc<dyn RateLimitListener>>) -> Self {
        Self { listeners }
    }

    /// Add another listener.
    pub fn push(&mut self, listener: Arc<dyn RateLimitListener>) {
        self.listeners.push(listener);
    }

    /// Number of inner listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Check if there are no inner listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl RateLimitListener for FanoutListener {
    fn on_max_rate_exceeded(&self, event: &MaxRateExceeded) {
        for listener in &self.listeners {
            listener.on_max_rate_exceeded(event);
        }
    }

    fn on_max_rate_changed(&self, event: &MaxRateChanged) {
        for listener in &self.listeners {
            listener.on_max_rate_changed(event);
        }
    }

    fn on_avg_rate_calculated(&self, event: &AvgRateCalculated) {
        for listener in &self.listeners {
            listener.on_avg_rate_calculated(event);
        }
    }
}
