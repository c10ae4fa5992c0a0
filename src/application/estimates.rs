//! Cached weight estimates for recurring operations.
//!
//! Some operations only reveal their cost after they ran (a query that
//! returns N rows, a batch whose size the server decides). The limiter keeps
//! the highest weight ever observed per operation name and admits later calls
//! with that estimate, so it never under-estimates an operation kind.

use crate::application::ports::Storage;
use crate::domain::operation::OperationName;
use crate::domain::weight::Weight;

/// Estimate tracked for one operation name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatedWeight {
    /// Highest weight observed so far
    pub max_observed: Weight,
    /// Number of observations folded into the estimate
    pub observations: u64,
}

impl EstimatedWeight {
    fn new(weight: Weight) -> Self {
        Self {
            max_observed: weight,
            observations: 0,
        }
    }

    fn observe(&mut self, weight: Weight) -> Weight {
        if weight > self.max_observed {
            self.max_observed = weight;
        }
        self.observations += 1;
        self.max_observed
    }
}

/// Registry of weight estimates per operation name.
///
/// Generic over the storage implementation; in production this is
/// `Arc<ShardedStorage>` with an LRU bound.
#[derive(Debug, Clone)]
pub struct WeightEstimates<S>
where
    S: Storage<OperationName, EstimatedWeight>,
{
    storage: S,
}

impl<S> WeightEstimates<S>
where
    S: Storage<OperationName, EstimatedWeight>,
{
    /// Create a registry over the given storage.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Current estimate for an operation, if it has been observed.
    pub fn estimate(&self, name: &OperationName) -> Option<Weight> {
        self.storage
            .with_existing(name, |estimate| estimate.max_observed)
    }

    /// Fold an observed weight into the estimate and return the new estimate.
    pub fn observe(&self, name: OperationName, weight: Weight) -> Weight {
        self.storage.with_entry_mut(
            name,
            || EstimatedWeight::new(weight),
            |estimate| estimate.observe(weight),
        )
    }

    /// Number of operation names with an estimate.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if no estimates are held.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Forget all estimates.
    pub fn clear(&self) {
        self.storage.clear();
    }
}
