//! Prompt assembly under per-section size budgets.

pub mod optimizer;

pub use optimizer::{estimate_tokens, ContextOptimizer, TRUNCATION_MARKER};
