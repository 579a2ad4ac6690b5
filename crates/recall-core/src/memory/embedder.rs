//! Embedder trait for text-to-vector conversion.
//!
//! Defines the interface for embedding text into vectors for semantic search.
//! Implementations (e.g., the hashing embedder, remote embedding APIs) live in
//! recall-infra or in the host application.

use std::fmt;

use recall_types::error::ProviderError;

/// What an embedding is going to be used for.
///
/// Some providers produce asymmetric embeddings for stored documents and for
/// search queries; the cache keys on this as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::RetrievalDocument => write!(f, "retrieval_document"),
            TaskType::RetrievalQuery => write!(f, "retrieval_query"),
        }
    }
}

/// Trait for converting text into embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed(
        &self,
        text: &str,
        task: TaskType,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, ProviderError>> + Send;

    /// The model name used for embeddings.
    fn model_name(&self) -> &str;

    /// The dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}
