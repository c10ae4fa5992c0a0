//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (tokio time vs mock)
//! - Storage implementations (sharded maps with LRU eviction)
//! - Listeners (tracing, channels)
//! - Builder wiring the default limiter

pub mod builder;
pub mod clock;
pub mod eviction;
pub mod listeners;
pub mod storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides controllable test doubles for testing
/// limiter behavior.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// weighted-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
