//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::events::{AvgRateCalculated, MaxRateChanged, MaxRateExceeded};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Instant;

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for observing limiter events.
///
/// Methods are called synchronously from inside the limiter, so they should
/// return quickly. Exporters that do real work should hand events off, as
/// `ChannelListener` does. Every method defaults to doing nothing.
pub trait RateLimitListener: Send + Sync + Debug {
    /// An operation did not fit into the current window and will be delayed.
    ///
    /// Called while the admission lock is held, before the delay starts.
    fn on_max_rate_exceeded(&self, _event: &MaxRateExceeded) {}

    /// The maximum rate changed to a different value.
    fn on_max_rate_changed(&self, _event: &MaxRateChanged) {}

    /// An aggregation period closed and a new average rate is available.
    fn on_avg_rate_calculated(&self, _event: &AvgRateCalculated) {}
}

/// Candidate entry for eviction consideration.
///
/// Values are cloned to avoid lifetime issues with concurrent maps.
pub struct EvictionCandidate<K, V> {
    /// The key of the entry
    pub key: K,
    /// The value of the entry (cloned)
    pub value: V,
    /// Access sequence number; higher means more recently used
    pub last_access: u64,
}

/// Port for eviction policy decisions.
///
/// This abstraction allows the storage layer to delegate eviction decisions
/// to pluggable policies.
pub trait EvictionPolicy<K, V>: Send + Sync + Debug {
    /// Select a victim from the given candidates for eviction.
    ///
    /// # Returns
    /// The key of the entry to evict, or None if no eviction should occur
    fn select_victim(&self, candidates: &[EvictionCandidate<K, V>]) -> Option<K>;

    /// Check if inserting one more entry requires an eviction first.
    fn should_evict(&self, current_entries: usize) -> bool;
}

/// Port for concurrent key-value storage.
///
/// This abstraction allows the application layer to store and retrieve values
/// without depending on specific concurrent data structure implementations.
/// Infrastructure provides concrete implementations (ShardedStorage).
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Access an existing entry without creating it.
    ///
    /// Counts as a use of the entry for eviction purposes.
    fn with_existing<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);
}
