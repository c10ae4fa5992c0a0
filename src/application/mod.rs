//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Weight estimates (storage of observed weights per operation)
//! - Rate limiter (admission, delays and usage accounting)
//! - Metrics and configuration
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod config;
pub mod estimates;
pub mod limiter;
pub mod metrics;
pub mod ports;
