//! Operation names for weight estimation.

use std::fmt;
use std::sync::Arc;

/// Case-insensitive name of a recurring kind of operation.
///
/// Names are normalized to lower case, so `"Search"` and `"SEARCH"` share
/// one weight estimate.
///
/// # Example
/// ```
/// use weighted_throttle::OperationName;
///
/// assert_eq!(OperationName::new("GetOrders"), OperationName::new("getorders"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationName(Arc<str>);

impl OperationName {
    /// Create a normalized operation name.
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name.to_lowercase()))
    }

    /// Normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OperationName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
