//! Persistence ports for whole-document state and the session archive.
//!
//! The knowledge graph and the working buffer are written wholesale on every
//! save; concurrent writers to the same document must be serialized by the caller.

pub mod archive;
pub mod box_document;
pub mod document;
