//! Whole-document persistence trait.
//!
//! Defines the interface for load-on-construct, overwrite-on-save storage of a
//! single serializable document (the knowledge graph, the working buffer).
//! Implementations (e.g., JSON files with atomic rename) live in recall-infra.

use recall_types::error::RepositoryError;

/// Trait for storing one document of type `T` as a unit.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in recall-infra.
pub trait DocumentStore<T: Send + Sync>: Send + Sync {
    /// Read the stored document.
    ///
    /// Returns `Ok(None)` when nothing has been saved yet and
    /// `Err(RepositoryError::Corrupt)` when the stored bytes cannot be decoded.
    fn load(&self) -> impl std::future::Future<Output = Result<Option<T>, RepositoryError>> + Send;

    /// Replace the stored document with `document`.
    fn save(
        &self,
        document: &T,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
