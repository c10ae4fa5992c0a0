//! Rate limiter coordination logic.
//!
//! The limiter gates asynchronous operations so that, within any admission
//! window, the sum of admitted weights stays within the maximum rate. Callers
//! are never rejected; when the budget is spent they wait for the next window.
//!
//! Two independent locks guard the limiter state:
//! - the admission lock serializes admission decisions (and the delay that
//!   may follow one), in FIFO order
//! - the usage lock guards average-rate bookkeeping
//!
//! When both are needed, the admission lock is always taken first.

use crate::application::config::{validate_max_rate, ConfigError, RateLimiterConfig};
use crate::application::estimates::{EstimatedWeight, WeightEstimates};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, RateLimitListener, Storage};
use crate::domain::events::MaxRateChanged;
use crate::domain::operation::OperationName;
use crate::domain::usage::UsageAggregator;
use crate::domain::weight::Weight;
use crate::domain::window::{Admission, AdmissionWindow};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Error returned when a cancellable execution was cancelled.
///
/// Weight charged to the admission window before cancellation stays charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled before it completed")]
pub struct Cancelled;

/// Point-in-time view of the limiter state.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterSnapshot {
    pub name: Arc<str>,
    pub max_rate: f64,
    pub rate_interval: Duration,
    /// Weight admitted in the current window
    pub accumulated_ops: f64,
    /// Start of the current window; may lie in the future after a delay
    pub accumulated_since: Instant,
    /// Last computed average rate, in weight per second
    pub avg_rate: f64,
    /// Weight consumed in the open aggregation period
    pub ops_consumed: f64,
    /// Operation names with a cached weight estimate
    pub tracked_operations: usize,
}

/// Weighted sliding-window rate limiter.
///
/// Generic over the storage backing weight estimates. Use
/// [`RateLimiter`](crate::RateLimiter) for the default in-memory storage.
#[derive(Debug)]
pub struct WeightedRateLimiter<S>
where
    S: Storage<OperationName, EstimatedWeight>,
{
    name: Arc<str>,
    max_rate_bits: AtomicU64,
    rate_interval: Duration,
    admission: Mutex<AdmissionWindow>,
    usage: Mutex<UsageAggregator>,
    estimates: WeightEstimates<S>,
    clock: Arc<dyn Clock>,
    listener: Arc<dyn RateLimitListener>,
    metrics: Metrics,
}

impl<S> WeightedRateLimiter<S>
where
    S: Storage<OperationName, EstimatedWeight>,
{
    /// Assemble a limiter from its collaborators.
    ///
    /// `config.max_tracked_operations` is not read here; bounding the
    /// estimate storage is up to whoever builds `estimates`.
    ///
    /// # Errors
    /// Returns `ConfigError` if the config does not validate.
    pub fn from_parts(
        config: &RateLimiterConfig,
        estimates: WeightEstimates<S>,
        clock: Arc<dyn Clock>,
        listener: Arc<dyn RateLimitListener>,
        metrics: Metrics,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let now = clock.now();
        let name: Arc<str> = Arc::from(config.name.as_deref().unwrap_or("default"));

        tracing::debug!(
            limiter = %name,
            max_rate = config.max_rate,
            rate_interval_ms = config.rate_interval.as_millis() as u64,
            "creating rate limiter"
        );

        Ok(Self {
            name,
            max_rate_bits: AtomicU64::new(config.max_rate.to_bits()),
            rate_interval: config.rate_interval,
            admission: Mutex::new(AdmissionWindow::new(config.rate_interval, now)),
            usage: Mutex::new(UsageAggregator::new(now)),
            estimates,
            clock,
            listener,
            metrics,
        })
    }

    /// Run an operation once `weight` fits into the rate.
    ///
    /// The operation is only started after admission. Admission may wait for
    /// the current window to end but never fails. Usage is recorded after the
    /// operation completes.
    ///
    /// # Example
    /// ```
    /// use weighted_throttle::{RateLimiter, Weight};
    /// use std::time::Duration;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let limiter = RateLimiter::new(10.0, Duration::from_secs(1)).unwrap();
    ///
    /// let rows = limiter
    ///     .execute_weighted(Weight::new(2.5).unwrap(), || async { 42 })
    ///     .await;
    /// assert_eq!(rows, 42);
    /// # }
    /// ```
    pub async fn execute_weighted<F, Fut, T>(&self, weight: Weight, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let window = self.admission.lock().await;
        self.admit(window, weight).await;

        let output = operation().await;
        self.log_usage(weight).await;
        output
    }

    /// Run a fallible operation once `weight` fits into the rate.
    ///
    /// An `Err` from the operation is returned untouched. The admitted weight
    /// stays spent and no usage is recorded for the failed call.
    pub async fn try_execute_weighted<F, Fut, T, E>(
        &self,
        weight: Weight,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let window = self.admission.lock().await;
        self.admit(window, weight).await;

        let output = operation().await?;
        self.log_usage(weight).await;
        Ok(output)
    }

    /// Like [`execute_weighted`](Self::execute_weighted), but gives up when
    /// `cancel` fires.
    ///
    /// Cancellation is observed while waiting for the admission lock, during
    /// the admission delay and while the operation runs. The operation future
    /// is dropped on cancellation.
    pub async fn execute_weighted_cancellable<F, Fut, T>(
        &self,
        weight: Weight,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, Cancelled>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let window = until_cancelled(cancel, self.admission.lock()).await?;
        until_cancelled(cancel, self.admit(window, weight)).await?;

        let output = until_cancelled(cancel, operation()).await?;
        self.log_usage(weight).await;
        Ok(output)
    }

    /// Run an operation whose weight is only known after it completed.
    ///
    /// `weight_calculator` derives the actual weight from the output, or
    /// returns `None` when it cannot tell. The highest weight ever observed
    /// for `operation_name` (case-insensitive) becomes the estimate used to
    /// admit later calls.
    ///
    /// The first call for a name has no estimate, so it runs while holding
    /// the admission lock: no other admission is decided until it finished
    /// and its weight was charged.
    pub async fn execute_with_estimated_weight<F, Fut, T, C>(
        &self,
        operation_name: &str,
        operation: F,
        weight_calculator: C,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        C: FnOnce(&T) -> Option<f64>,
    {
        self.run_estimated(OperationName::new(operation_name), operation, weight_calculator)
            .await
    }

    /// Fallible variant of
    /// [`execute_with_estimated_weight`](Self::execute_with_estimated_weight).
    ///
    /// Errors are returned untouched and leave the estimate and usage as
    /// they were.
    pub async fn try_execute_with_estimated_weight<F, Fut, T, E, C>(
        &self,
        operation_name: &str,
        operation: F,
        weight_calculator: C,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&T) -> Option<f64>,
    {
        self.run_estimated(
            OperationName::new(operation_name),
            operation,
            |result: &Result<T, E>| result.as_ref().ok().and_then(weight_calculator),
        )
        .await
    }

    /// Change the maximum rate.
    ///
    /// Listeners are notified only when the value actually differs. The new
    /// rate applies from the next admission decision on.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidMaxRate` for zero, negative or non-finite
    /// rates; the current rate is kept.
    pub fn change_max_rate(&self, new_max_rate: f64) -> Result<(), ConfigError> {
        validate_max_rate(new_max_rate)?;

        let old_max_rate = f64::from_bits(
            self.max_rate_bits
                .swap(new_max_rate.to_bits(), Ordering::AcqRel),
        );

        if (old_max_rate - new_max_rate).abs() > f64::EPSILON {
            self.metrics.record_max_rate_change();
            self.listener.on_max_rate_changed(&MaxRateChanged {
                old_max_rate,
                new_max_rate,
            });
        }
        Ok(())
    }

    /// Current maximum rate.
    pub fn max_rate(&self) -> f64 {
        f64::from_bits(self.max_rate_bits.load(Ordering::Acquire))
    }

    /// Length of the admission window.
    pub fn rate_interval(&self) -> Duration {
        self.rate_interval
    }

    /// Limiter name used in log events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last computed average rate, in weight per second.
    pub async fn avg_rate(&self) -> f64 {
        self.usage.lock().await.avg_rate()
    }

    /// Cached weight estimate for an operation name.
    pub fn estimated_weight(&self, operation_name: &str) -> Option<f64> {
        self.estimates
            .estimate(&OperationName::new(operation_name))
            .map(Weight::get)
    }

    /// Number of operation names with a cached estimate.
    pub fn tracked_operations(&self) -> usize {
        self.estimates.len()
    }

    /// Forget all cached weight estimates.
    pub fn clear_estimates(&self) {
        self.estimates.clear();
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Capture the current state.
    ///
    /// Takes the admission lock, so this waits behind any admission delay
    /// in progress.
    pub async fn snapshot(&self) -> LimiterSnapshot {
        let window = self.admission.lock().await;
        let usage = self.usage.lock().await;

        LimiterSnapshot {
            name: Arc::clone(&self.name),
            max_rate: self.max_rate(),
            rate_interval: self.rate_interval,
            accumulated_ops: window.accumulated_ops(),
            accumulated_since: window.accumulated_since(),
            avg_rate: usage.avg_rate(),
            ops_consumed: usage.ops_consumed(),
            tracked_operations: self.estimates.len(),
        }
    }

    /// Decide admission and wait out any delay while holding the lock.
    async fn admit(&self, mut window: MutexGuard<'_, AdmissionWindow>, weight: Weight) {
        let admission = window.admit(self.clock.now(), weight, self.max_rate());
        self.metrics.record_admitted();

        match admission {
            Admission::Immediate => {
                tracing::debug!(limiter = %self.name, weight = weight.get(), "admitted");
            }
            Admission::Delayed(exceeded) => {
                self.metrics.record_delayed(exceeded.delay);
                self.listener.on_max_rate_exceeded(&exceeded);

                if !exceeded.delay.is_zero() {
                    tracing::debug!(
                        limiter = %self.name,
                        weight = weight.get(),
                        delay_ms = exceeded.delay.as_millis() as u64,
                        "waiting for next admission window"
                    );
                    tokio::time::sleep(exceeded.delay).await;
                }
            }
        }
    }

    async fn log_usage(&self, weight: Weight) {
        let mut usage = self.usage.lock().await;
        self.metrics.record_completed();

        if let Some(sample) = usage.record(self.clock.now(), weight) {
            self.metrics.record_avg_rate(sample.avg_rate);
            self.listener.on_avg_rate_calculated(&sample);
        }
    }

    async fn run_estimated<F, Fut, O, C>(&self, name: OperationName, operation: F, weigh: C) -> O
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = O>,
        C: FnOnce(&O) -> Option<f64>,
    {
        let mut window = self.admission.lock().await;

        if let Some(estimate) = self.estimates.estimate(&name) {
            self.admit(window, estimate).await;

            let output = operation().await;
            if let Some(observed) = self.observed_weight(&name, weigh(&output)) {
                self.estimates.observe(name, observed);
                self.log_usage(observed).await;
            }
            return output;
        }

        tracing::debug!(
            limiter = %self.name,
            operation = %name,
            "no weight estimate yet, running under admission lock"
        );
        self.metrics.record_admitted();

        let output = operation().await;
        if let Some(observed) = self.observed_weight(&name, weigh(&output)) {
            window.charge(self.clock.now(), observed);
            self.estimates.observe(name, observed);
            self.log_usage(observed).await;
        }
        drop(window);
        output
    }

    fn observed_weight(&self, name: &OperationName, observed: Option<f64>) -> Option<Weight> {
        match Weight::new(observed?) {
            Ok(weight) => Some(weight),
            Err(error) => {
                tracing::warn!(
                    limiter = %self.name,
                    operation = %name,
                    %error,
                    "ignoring invalid observed weight"
                );
                None
            }
        }
    }
}

async fn until_cancelled<F>(cancel: &CancellationToken, future: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        output = future => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::mocks::RecordingListener;
    use crate::infrastructure::storage::ShardedStorage;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    type TestLimiter = WeightedRateLimiter<Arc<ShardedStorage<OperationName, EstimatedWeight>>>;

    const HOUR: Duration = Duration::from_secs(3600);

    fn w(value: f64) -> Weight {
        Weight::new(value).unwrap()
    }

    fn limiter(max_rate: f64, interval: Duration) -> (Arc<TestLimiter>, RecordingListener) {
        let listener = RecordingListener::new();
        let limiter = WeightedRateLimiter::from_parts(
            &RateLimiterConfig::new(max_rate, interval),
            WeightEstimates::new(Arc::new(ShardedStorage::new())),
            Arc::new(SystemClock::new()),
            Arc::new(listener.clone()),
            Metrics::new(),
        )
        .unwrap();
        (Arc::new(limiter), listener)
    }

    fn spawn_counted(
        limiter: &Arc<TestLimiter>,
        weight: f64,
        done: &Arc<AtomicUsize>,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(limiter);
        let done = Arc::clone(done);
        tokio::spawn(async move {
            limiter
                .execute_weighted(w(weight), || async {
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        })
    }

    #[test]
    fn test_from_parts_rejects_invalid_config() {
        let result = WeightedRateLimiter::from_parts(
            &RateLimiterConfig::new(-1.0, HOUR),
            WeightEstimates::new(Arc::new(ShardedStorage::new())),
            Arc::new(SystemClock::new()),
            Arc::new(RecordingListener::new()),
            Metrics::new(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidMaxRate(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_within_budget_without_delay() {
        let (limiter, listener) = limiter(3.0, HOUR);
        let start = tokio::time::Instant::now();

        for _ in 0..3 {
            limiter.execute_weighted(Weight::ONE, || async {}).await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(listener.count(), 0);
        assert_eq!(limiter.snapshot().await.accumulated_ops, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_until_window_ends() {
        let (limiter, listener) = limiter(1.0, HOUR);
        let start = tokio::time::Instant::now();

        limiter.execute_weighted(Weight::ONE, || async {}).await;
        limiter.execute_weighted(Weight::ONE, || async {}).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= HOUR, "waited only {elapsed:?}");
        assert!(elapsed < HOUR + Duration::from_secs(1));

        let exceeded = listener.exceeded();
        assert_eq!(exceeded.len(), 1);
        assert_eq!(exceeded[0].delay, HOUR);
        assert_eq!(exceeded[0].max_rate, 1.0);
        assert_eq!(exceeded[0].accumulated_ops, 1.0);
        assert_eq!(exceeded[0].weight, 1.0);

        let metrics = limiter.metrics().snapshot();
        assert_eq!(metrics.operations_admitted, 2);
        assert_eq!(metrics.operations_delayed, 1);
        assert_eq!(metrics.total_delay, HOUR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_operation_not_observed_before_window_ends() {
        let (limiter, _listener) = limiter(1.0, HOUR);
        let done = Arc::new(AtomicUsize::new(0));

        let first = spawn_counted(&limiter, 1.0, &done);
        let second = spawn_counted(&limiter, 1.0, &done);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);

        sleep(HOUR).await;
        assert_eq!(done.load(Ordering::SeqCst), 2);

        first.await.unwrap();
        second.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_weights() {
        let (limiter, listener) = limiter(12.5, HOUR);
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = [1.0, 1.5, 7.5, 2.98]
            .into_iter()
            .map(|weight| spawn_counted(&limiter, weight, &done))
            .collect();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(listener.exceeded().len(), 1);

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset_after_idle() {
        let (limiter, listener) = limiter(1.0, Duration::from_secs(1));

        limiter.execute_weighted(Weight::ONE, || async {}).await;
        sleep(Duration::from_millis(1500)).await;

        let start = tokio::time::Instant::now();
        limiter.execute_weighted(Weight::ONE, || async {}).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(listener.exceeded().len(), 0);
        assert_eq!(limiter.snapshot().await.accumulated_ops, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_operation_is_admitted() {
        let (limiter, listener) = limiter(2.0, HOUR);
        let start = tokio::time::Instant::now();

        limiter.execute_weighted(w(10.0), || async {}).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(listener.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_budget() {
        let (limiter, listener) = limiter(5.0, HOUR);
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| spawn_counted(&limiter, 1.0, &done))
            .collect();

        sleep(Duration::from_secs(1)).await;
        assert_eq!(done.load(Ordering::SeqCst), 5);

        sleep(HOUR).await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
        // Only the first caller past the budget waited; the rest fit the new window
        assert_eq!(listener.exceeded().len(), 1);

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_operation_keeps_weight_spent() {
        let (limiter, _listener) = limiter(10.0, HOUR);

        let result: Result<(), &str> = limiter
            .try_execute_weighted(w(4.0), || async { Err("boom") })
            .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(limiter.snapshot().await.accumulated_ops, 4.0);

        let metrics = limiter.metrics().snapshot();
        assert_eq!(metrics.operations_admitted, 1);
        assert_eq!(metrics.operations_completed, 0);
        assert_eq!(limiter.snapshot().await.ops_consumed, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_try_records_usage() {
        let (limiter, _listener) = limiter(10.0, HOUR);

        let result: Result<u32, &str> = limiter
            .try_execute_weighted(w(4.0), || async { Ok(7) })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(limiter.metrics().operations_completed(), 1);
        assert_eq!(limiter.snapshot().await.ops_consumed, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_max_rate_notifies_only_on_change() {
        let (limiter, listener) = limiter(5.0, HOUR);

        limiter.change_max_rate(5.0).unwrap();
        assert_eq!(listener.count(), 0);

        limiter.change_max_rate(8.0).unwrap();
        let changes = listener.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_max_rate, 5.0);
        assert_eq!(changes[0].new_max_rate, 8.0);
        assert_eq!(limiter.max_rate(), 8.0);
        assert_eq!(limiter.metrics().max_rate_changes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_max_rate_rejects_invalid() {
        let (limiter, listener) = limiter(5.0, HOUR);

        assert_eq!(
            limiter.change_max_rate(0.0),
            Err(ConfigError::InvalidMaxRate(0.0))
        );
        assert!(limiter.change_max_rate(f64::INFINITY).is_err());
        assert_eq!(limiter.max_rate(), 5.0);
        assert_eq!(listener.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raised_max_rate_applies_to_next_admission() {
        let (limiter, _listener) = limiter(1.0, HOUR);
        let start = tokio::time::Instant::now();

        limiter.execute_weighted(Weight::ONE, || async {}).await;
        limiter.change_max_rate(2.0).unwrap();
        limiter.execute_weighted(Weight::ONE, || async {}).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimated_weight_reuse() {
        let (limiter, _listener) = limiter(100.0, HOUR);

        let first = limiter
            .execute_with_estimated_weight("op", || async { 5.0 }, |w| Some(*w))
            .await;
        assert_eq!(first, 5.0);
        assert_eq!(limiter.estimated_weight("op"), Some(5.0));
        assert_eq!(limiter.snapshot().await.accumulated_ops, 5.0);

        // Admission charges the cached estimate, not the actual weight
        for (actual, expected_total) in [(3.0, 10.0), (5.0, 15.0), (1.0, 20.0)] {
            limiter
                .execute_with_estimated_weight("Op", move || async move { actual }, |w| Some(*w))
                .await;
            assert_eq!(limiter.snapshot().await.accumulated_ops, expected_total);
            assert_eq!(limiter.estimated_weight("op"), Some(5.0));
        }

        // A heavier observation raises the estimate for the next call
        limiter
            .execute_with_estimated_weight("OP", || async { 8.0 }, |w| Some(*w))
            .await;
        assert_eq!(limiter.snapshot().await.accumulated_ops, 25.0);
        assert_eq!(limiter.estimated_weight("op"), Some(8.0));

        limiter
            .execute_with_estimated_weight("op", || async { 1.0 }, |w| Some(*w))
            .await;
        assert_eq!(limiter.snapshot().await.accumulated_ops, 33.0);
        assert_eq!(limiter.tracked_operations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimated_usage_logs_actual_weight() {
        let (limiter, _listener) = limiter(100.0, HOUR);

        limiter
            .execute_with_estimated_weight("op", || async { 5.0 }, |w| Some(*w))
            .await;
        limiter
            .execute_with_estimated_weight("op", || async { 2.0 }, |w| Some(*w))
            .await;

        let snapshot = limiter.snapshot().await;
        assert_eq!(snapshot.ops_consumed, 7.0);
        assert_eq!(snapshot.accumulated_ops, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_observation_holds_admission_lock() {
        let (limiter, _listener) = limiter(100.0, HOUR);
        let done = Arc::new(AtomicUsize::new(0));
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter
                    .execute_with_estimated_weight(
                        "report",
                        || async move {
                            released.await.unwrap();
                            3.0
                        },
                        |w| Some(*w),
                    )
                    .await
            })
        };
        sleep(Duration::from_millis(1)).await;

        let other = spawn_counted(&limiter, 1.0, &done);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(done.load(Ordering::SeqCst), 0);

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 3.0);
        other.await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.snapshot().await.accumulated_ops, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_weight_is_not_cached() {
        let (limiter, _listener) = limiter(100.0, HOUR);

        limiter
            .execute_with_estimated_weight("op", || async { "opaque" }, |_| None)
            .await;

        assert_eq!(limiter.estimated_weight("op"), None);
        assert_eq!(limiter.tracked_operations(), 0);
        assert_eq!(limiter.snapshot().await.accumulated_ops, 0.0);
        assert_eq!(limiter.metrics().operations_completed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_observed_weight_is_ignored() {
        let (limiter, _listener) = limiter(100.0, HOUR);

        limiter
            .execute_with_estimated_weight("op", || async { -3.0 }, |w| Some(*w))
            .await;

        assert_eq!(limiter.estimated_weight("op"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_estimated_operation_not_recorded() {
        let (limiter, _listener) = limiter(100.0, HOUR);

        let result: Result<f64, String> = limiter
            .try_execute_with_estimated_weight(
                "op",
                || async { Err("unavailable".to_string()) },
                |w| Some(*w),
            )
            .await;

        assert_eq!(result, Err("unavailable".to_string()));
        assert_eq!(limiter.estimated_weight("op"), None);

        let ok: Result<f64, String> = limiter
            .try_execute_with_estimated_weight("op", || async { Ok(6.0) }, |w| Some(*w))
            .await;
        assert_eq!(ok, Ok(6.0));
        assert_eq!(limiter.estimated_weight("op"), Some(6.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_avg_rate_calculated() {
        let (limiter, listener) = limiter(1000.0, Duration::from_secs(1));

        limiter.execute_weighted(w(10.0), || async {}).await;
        sleep(Duration::from_secs(5)).await;
        limiter.execute_weighted(w(20.0), || async {}).await;
        assert!(listener.avg_rates().is_empty());

        sleep(Duration::from_secs(6)).await;
        limiter.execute_weighted(w(7.0), || async {}).await;

        let samples = listener.avg_rates();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].avg_rate - 30.0 / 11.0).abs() < 0.01);
        assert!(samples[0].period >= Duration::from_secs(11));
        assert!(samples[0].period < Duration::from_secs(12));

        assert_eq!(limiter.avg_rate().await, samples[0].avg_rate);
        assert_eq!(limiter.metrics().last_avg_rate(), samples[0].avg_rate);
        assert_eq!(limiter.snapshot().await.ops_consumed, 7.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay() {
        let (limiter, _listener) = limiter(1.0, HOUR);
        let token = CancellationToken::new();
        let ran = Arc::new(AtomicUsize::new(0));

        limiter.execute_weighted(Weight::ONE, || async {}).await;

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(1)).await;
                token.cancel();
            })
        };

        let start = tokio::time::Instant::now();
        let ran_clone = Arc::clone(&ran);
        let result = limiter
            .execute_weighted_cancellable(Weight::ONE, &token, || async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(result, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_skips_admission() {
        let (limiter, _listener) = limiter(1.0, HOUR);
        let token = CancellationToken::new();
        token.cancel();

        let result = limiter
            .execute_weighted_cancellable(Weight::ONE, &token, || async { 1 })
            .await;

        assert_eq!(result, Err(Cancelled));
        assert_eq!(limiter.metrics().operations_admitted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellable_completes_when_not_cancelled() {
        let (limiter, _listener) = limiter(1.0, HOUR);
        let token = CancellationToken::new();

        let result = limiter
            .execute_weighted_cancellable(Weight::ONE, &token, || async { "done" })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(limiter.metrics().operations_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_instances() {
        let (a, _) = limiter(1.0, HOUR);
        let (b, _) = limiter(1.0, HOUR);
        let start = tokio::time::Instant::now();

        a.execute_weighted(Weight::ONE, || async {}).await;
        b.execute_weighted(Weight::ONE, || async {}).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
