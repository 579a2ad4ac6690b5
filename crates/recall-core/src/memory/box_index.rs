//! BoxVectorIndex -- object-safe dynamic dispatch wrapper for VectorIndex.
//!
//! Follows the same blanket-impl pattern as BoxEmbedder:
//! 1. Define an object-safe `VectorIndexDyn` trait with boxed futures
//! 2. Blanket-impl `VectorIndexDyn` for all `T: VectorIndex`
//! 3. `BoxVectorIndex` wraps `Box<dyn VectorIndexDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use recall_types::error::RepositoryError;
use recall_types::memory::{IndexFilter, IndexHit, MemoryRecord, RecordPatch};
use uuid::Uuid;

use super::index::VectorIndex;

/// Object-safe version of [`VectorIndex`] with boxed futures.
pub trait VectorIndexDyn: Send + Sync {
    fn add_boxed<'a>(
        &'a self,
        record: &'a MemoryRecord,
        vector: &'a [f32],
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>>;

    fn query_boxed<'a>(
        &'a self,
        vector: &'a [f32],
        k: usize,
        filter: &'a IndexFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<IndexHit>, RepositoryError>> + Send + 'a>>;

    fn update_boxed<'a>(
        &'a self,
        id: &'a Uuid,
        patch: &'a RecordPatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>>;

    fn batch_update_boxed<'a>(
        &'a self,
        patches: &'a [(Uuid, RecordPatch)],
    ) -> Pin<Box<dyn Future<Output = Result<usize, RepositoryError>> + Send + 'a>>;

    fn delete_boxed<'a>(
        &'a self,
        ids: &'a [Uuid],
    ) -> Pin<Box<dyn Future<Output = Result<usize, RepositoryError>> + Send + 'a>>;

    fn get_boxed<'a>(
        &'a self,
        filter: &'a IndexFilter,
        limit: Option<usize>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send + 'a>>;

    fn count_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<usize, RepositoryError>> + Send + 'a>>;
}

/// Blanket implementation: any `VectorIndex` automatically implements `VectorIndexDyn`.
impl<T: VectorIndex> VectorIndexDyn for T {
    fn add_boxed<'a>(
        &'a self,
        record: &'a MemoryRecord,
        vector: &'a [f32],
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>> {
        Box::pin(self.add(record, vector))
    }

    fn query_boxed<'a>(
        &'a self,
        vector: &'a [f32],
        k: usize,
        filter: &'a IndexFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<IndexHit>, RepositoryError>> + Send + 'a>> {
        Box::pin(self.query(vector, k, filter))
    }

    fn update_boxed<'a>(
        &'a self,
        id: &'a Uuid,
        patch: &'a RecordPatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>> {
        Box::pin(self.update(id, patch))
    }

    fn batch_update_boxed<'a>(
        &'a self,
        patches: &'a [(Uuid, RecordPatch)],
    ) -> Pin<Box<dyn Future<Output = Result<usize, RepositoryError>> + Send + 'a>> {
        Box::pin(self.batch_update(patches))
    }

    fn delete_boxed<'a>(
        &'a self,
        ids: &'a [Uuid],
    ) -> Pin<Box<dyn Future<Output = Result<usize, RepositoryError>> + Send + 'a>> {
        Box::pin(self.delete(ids))
    }

    fn get_boxed<'a>(
        &'a self,
        filter: &'a IndexFilter,
        limit: Option<usize>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send + 'a>> {
        Box::pin(self.get(filter, limit))
    }

    fn count_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<usize, RepositoryError>> + Send + 'a>> {
        Box::pin(self.count())
    }
}

/// Type-erased vector index for runtime selection of backends.
pub struct BoxVectorIndex {
    inner: Box<dyn VectorIndexDyn + Send + Sync>,
}

impl BoxVectorIndex {
    /// Wrap a concrete `VectorIndex` in a type-erased box.
    pub fn new<T: VectorIndex + 'static>(index: T) -> Self {
        Self {
            inner: Box::new(index),
        }
    }

    pub async fn add(&self, record: &MemoryRecord, vector: &[f32]) -> Result<(), RepositoryError> {
        self.inner.add_boxed(record, vector).await
    }

    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexHit>, RepositoryError> {
        self.inner.query_boxed(vector, k, filter).await
    }

    pub async fn update(&self, id: &Uuid, patch: &RecordPatch) -> Result<(), RepositoryError> {
        self.inner.update_boxed(id, patch).await
    }

    pub async fn batch_update(
        &self,
        patches: &[(Uuid, RecordPatch)],
    ) -> Result<usize, RepositoryError> {
        self.inner.batch_update_boxed(patches).await
    }

    pub async fn delete(&self, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        self.inner.delete_boxed(ids).await
    }

    pub async fn get(
        &self,
        filter: &IndexFilter,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        self.inner.get_boxed(filter, limit).await
    }

    pub async fn count(&self) -> Result<usize, RepositoryError> {
        self.inner.count_boxed().await
    }
}
