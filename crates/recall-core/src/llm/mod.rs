//! Generation provider abstractions.
//!
//! - `Generator`: RPITIT trait for concrete provider implementations
//! - `BoxGenerator`: object-safe wrapper for dynamic dispatch
//! - `RetryPolicy`: the single backoff policy shared by embedding and generation calls

pub mod box_generator;
pub mod generator;
pub mod json;
pub mod retry;
