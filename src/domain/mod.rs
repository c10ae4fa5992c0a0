//! Domain layer - pure rate accounting with no runtime dependencies.
//!
//! This layer contains the core state machines of the limiter:
//! - Operation weights and their validation
//! - The admission window deciding when an operation may run
//! - Average throughput aggregation
//! - Observable event records
//!
//! Nothing here reads a clock or takes a lock; callers pass the current
//! instant and provide synchronization.

pub mod events;
pub mod operation;
pub mod usage;
pub mod weight;
pub mod window;
