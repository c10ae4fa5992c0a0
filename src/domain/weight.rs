//! Operation weights.
//!
//! A weight is the cost one operation charges against the limiter's budget.
//! Weights are validated once, at construction, so the admission window can
//! never be driven below zero.

use serde::Serialize;
use std::fmt;

/// Error returned when a raw value is not a usable weight.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum WeightError {
    /// Weights must be zero or positive
    #[error("weight must not be negative, got {0}")]
    Negative(f64),
    /// Weights must be finite numbers
    #[error("weight must be a finite number, got {0}")]
    NotFinite(f64),
}

/// Validated, non-negative, finite operation weight.
///
/// # Example
/// ```
/// use weighted_throttle::Weight;
///
/// let w = Weight::new(2.5).unwrap();
/// assert_eq!(w.get(), 2.5);
///
/// assert!(Weight::new(-1.0).is_err());
/// assert!(Weight::new(f64::NAN).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
pub struct Weight(f64);

impl Weight {
    /// A weight that costs nothing.
    pub const ZERO: Weight = Weight(0.0);

    /// Unit weight, for limiters that count operations.
    pub const ONE: Weight = Weight(1.0);

    /// Create a weight.
    ///
    /// # Errors
    /// Returns `WeightError` if `value` is negative, NaN or infinite.
    pub fn new(value: f64) -> Result<Self, WeightError> {
        if !value.is_finite() {
            return Err(WeightError::NotFinite(value));
        }
        if value < 0.0 {
            return Err(WeightError::Negative(value));
        }
        // Normalizes -0.0
        Ok(Self(value + 0.0))
    }

    /// Raw value.
    pub fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Weight {
    type Error = WeightError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Weight> for f64 {
    fn from(weight: Weight) -> Self {
        weight.0
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
