//! Observability for recall: tracing subscriber setup and span export.

pub mod tracing_setup;
