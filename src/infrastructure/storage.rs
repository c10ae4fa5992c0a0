//! Storage implementations for weight estimates.
//!
//! Provides concurrent, sharded storage with optional bounded eviction.

use crate::application::metrics::Metrics;
use crate::application::ports::{EvictionCandidate, EvictionPolicy, Storage};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    last_access: AtomicU64,
}

/// Thread-safe sharded storage backed by DashMap.
///
/// Every access stamps the entry with a sequence number. When an eviction
/// policy is installed, inserting a new key into a full storage first removes
/// the victim chosen by the policy.
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    map: DashMap<K, Slot<V>, RandomState>,
    access_seq: AtomicU64,
    eviction_policy: Option<Arc<dyn EvictionPolicy<K, V>>>,
    metrics: Option<Metrics>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an unbounded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
            access_seq: AtomicU64::new(0),
            eviction_policy: None,
            metrics: None,
        }
    }

    /// Bound the storage with an eviction policy.
    pub fn with_eviction_policy(mut self, policy: Arc<dyn EvictionPolicy<K, V>>) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Count evictions in the given metrics.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Check if a key exists. Does not count as an access.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Evict until `incoming` more entries fit under the policy's bound.
    fn make_room(&self, policy: &Arc<dyn EvictionPolicy<K, V>>, incoming: usize) {
        while policy.should_evict((self.map.len() + incoming).saturating_sub(1)) {
            // No shard guard may be held here; iteration locks every shard.
            let candidates: Vec<EvictionCandidate<K, V>> = self
                .map
                .iter()
                .map(|entry| EvictionCandidate {
                    key: entry.key().clone(),
                    value: entry.value().value.clone(),
                    last_access: entry.value().last_access.load(Ordering::Relaxed),
                })
                .collect();

            let Some(victim) = policy.select_victim(&candidates) else {
                return;
            };
            if self.map.remove(&victim).is_some() {
                if let Some(metrics) = &self.metrics {
                    metrics.record_eviction();
                }
            }
        }
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedStorage")
            .field("len", &self.map.len())
            .field("bounded", &self.eviction_policy.is_some())
            .finish()
    }
}

// Implement the Storage port
impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug,
    V: Clone + Send + Sync + fmt::Debug,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        if let Some(policy) = &self.eviction_policy {
            if !self.map.contains_key(&key) {
                self.make_room(policy, 1);
            }
        }

        let seq = self.next_seq();
        let (result, inserted) = match self.map.entry(key) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                slot.last_access.store(seq, Ordering::Relaxed);
                (accessor(&mut slot.value), false)
            }
            Entry::Vacant(entry) => {
                let mut slot = entry.insert(Slot {
                    value: factory(),
                    last_access: AtomicU64::new(seq),
                });
                (accessor(&mut slot.value), true)
            }
        };

        // Concurrent inserts of new keys may all have passed make_room above
        if inserted {
            if let Some(policy) = &self.eviction_policy {
                self.make_room(policy, 0);
            }
        }
        result
    }

    fn with_existing<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        let slot = self.map.get(key)?;
        slot.last_access.store(self.next_seq(), Ordering::Relaxed);
        Some(accessor(&slot.value))
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&self) {
        self.map.clear()
    }
}

// Implement Storage for Arc<ShardedStorage> to allow it to be used directly
impl<K, V> Storage<K, V> for Arc<ShardedStorage<K, V>>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug,
    V: Clone + Send + Sync + fmt::Debug,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        (**self).with_entry_mut(key, factory, accessor)
    }

    fn with_existing<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        (**self).with_existing(key, accessor)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn clear(&self) {
        (**self).clear()
    }
}
