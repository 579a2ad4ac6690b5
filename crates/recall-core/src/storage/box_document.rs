//! BoxDocumentStore -- object-safe dynamic dispatch wrapper for DocumentStore.
//!
//! Same blanket-impl pattern as the other Box* wrappers:
//! 1. Define an object-safe `DocumentStoreDyn` trait with boxed futures
//! 2. Blanket-impl `DocumentStoreDyn` for all `S: DocumentStore<T>`
//! 3. `BoxDocumentStore` wraps `Box<dyn DocumentStoreDyn<T>>` and delegates

use std::future::Future;
use std::pin::Pin;

use recall_types::error::RepositoryError;

use super::document::DocumentStore;

/// Object-safe version of [`DocumentStore`] with boxed futures.
pub trait DocumentStoreDyn<T: Send + Sync>: Send + Sync {
    fn load_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<T>, RepositoryError>> + Send + 'a>>;

    fn save_boxed<'a>(
        &'a self,
        document: &'a T,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>>;
}

impl<T: Send + Sync + 'static, S: DocumentStore<T>> DocumentStoreDyn<T> for S {
    fn load_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<T>, RepositoryError>> + Send + 'a>> {
        Box::pin(self.load())
    }

    fn save_boxed<'a>(
        &'a self,
        document: &'a T,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>> {
        Box::pin(self.save(document))
    }
}

/// Type-erased document store for runtime selection of backends.
pub struct BoxDocumentStore<T: Send + Sync> {
    inner: Box<dyn DocumentStoreDyn<T> + Send + Sync>,
}

impl<T: Send + Sync + 'static> BoxDocumentStore<T> {
    /// Wrap a concrete `DocumentStore` in a type-erased box.
    pub fn new<S: DocumentStore<T> + 'static>(store: S) -> Self {
        Self {
            inner: Box::new(store),
        }
    }

    /// Read the stored document, if any.
    pub async fn load(&self) -> Result<Option<T>, RepositoryError> {
        self.inner.load_boxed().await
    }

    /// Replace the stored document.
    pub async fn save(&self, document: &T) -> Result<(), RepositoryError> {
        self.inner.save_boxed(document).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::MemoryDocument;

    #[tokio::test]
    async fn test_boxed_store_round_trip() {
        let store: BoxDocumentStore<Vec<String>> = BoxDocumentStore::new(MemoryDocument::default());
        assert!(store.load().await.unwrap().is_none());

        store.save(&vec!["jazz".to_string()]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(vec!["jazz".to_string()]));
    }

    #[tokio::test]
    async fn test_boxed_store_moves_into_task() {
        let store = Arc::new(BoxDocumentStore::new(MemoryDocument::<u32>::default()));
        let writer = store.clone();
        tokio::spawn(async move { writer.save(&7).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.load().await.unwrap(), Some(7));
    }
}
