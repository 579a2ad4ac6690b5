//! Vector index trait.
//!
//! Defines the interface for similarity search over stored memory records.
//! Implementations (LanceDB, in-memory) live in recall-infra.

use recall_types::error::RepositoryError;
use recall_types::memory::{IndexFilter, IndexHit, MemoryRecord, RecordPatch};
use uuid::Uuid;

/// Trait for a vector-indexed record store with metadata filtering.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Similarities are cosine similarities in `[-1, 1]`, higher is closer.
pub trait VectorIndex: Send + Sync {
    /// Insert a record with its embedding.
    fn add(
        &self,
        record: &MemoryRecord,
        vector: &[f32],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Nearest neighbours of `vector` that satisfy `filter`, closest first.
    fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> impl std::future::Future<Output = Result<Vec<IndexHit>, RepositoryError>> + Send;

    /// Apply a metadata patch to one record.
    ///
    /// Returns `RepositoryError::NotFound` if the id is unknown.
    fn update(
        &self,
        id: &Uuid,
        patch: &RecordPatch,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Apply many patches. Unknown ids are skipped. Returns the number applied.
    fn batch_update(
        &self,
        patches: &[(Uuid, RecordPatch)],
    ) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;

    /// Delete records by id. Returns the number removed.
    fn delete(
        &self,
        ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;

    /// Records matching `filter`, in no particular order, at most `limit`.
    fn get(
        &self,
        filter: &IndexFilter,
        limit: Option<usize>,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send;

    /// Total number of stored records.
    fn count(&self) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;
}
