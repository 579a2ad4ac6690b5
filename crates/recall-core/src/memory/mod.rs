//! Long-term memory: embedding, vector index ports, promotion and dedup,
//! decay, access tracking, and budget-constrained selection.

pub mod access;
pub mod box_embedder;
pub mod box_index;
pub mod cache;
pub mod decay;
pub mod embedder;
pub mod episodic;
pub mod importance;
pub mod index;
pub mod promotion;
pub mod selector;
