//! Infrastructure layer for recall.
//!
//! Contains implementations of the port traits defined in `recall-core`:
//! LanceDB and in-memory vector indexes, JSON document files with atomic
//! overwrite, the file-backed session archive, a local hashing embedder, and
//! the TOML configuration loader.

pub mod archive;
pub mod config;
pub mod document;
pub mod embedder;
pub mod vector;
