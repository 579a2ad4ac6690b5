//! Knowledge graph: the in-memory store, rule-based entity recognition, and
//! the extraction and retrieval wrapper.

pub mod ner;
pub mod rag;
pub mod store;
