//! Shared domain types for recall.
//!
//! This crate contains the types used across the memory engine: episodic
//! records, knowledge-graph entities, section budgets, temporal filters,
//! working-buffer snapshots, configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod memory;
pub mod session;
pub mod temporal;
pub mod working;
