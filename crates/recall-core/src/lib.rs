//! Memory algorithms and storage port definitions for recall.
//!
//! This crate defines the "ports" (vector index, document store, session
//! archive, embedder, generator) that the infrastructure layer implements,
//! plus everything that runs on top of them. It depends only on
//! `recall-types` -- never on `recall-infra` or any database/IO crate.

pub mod context;
pub mod engine;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod runtime;
pub mod storage;
pub mod temporal;
pub mod working;

#[cfg(test)]
pub(crate) mod test_support;
