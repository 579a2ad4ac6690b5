//! BoxEmbedder -- type-erased embedding provider.
//!
//! Same shape as `BoxGenerator`: `EmbedderDyn` returns boxed futures, every
//! `Embedder` gets it through a blanket impl, and `BoxEmbedder` holds the
//! trait object so the episodic store is not generic over its provider.

use std::future::Future;
use std::pin::Pin;

use recall_types::error::ProviderError;

use super::embedder::{Embedder, TaskType};

/// Object-safe mirror of [`Embedder`].
pub trait EmbedderDyn: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
        task: TaskType,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, ProviderError>> + Send + 'a>>;

    fn model_name_dyn(&self) -> &str;

    fn dimension_dyn(&self) -> usize;
}

impl<T: Embedder> EmbedderDyn for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
        task: TaskType,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, ProviderError>> + Send + 'a>> {
        Box::pin(self.embed(text, task))
    }

    fn model_name_dyn(&self) -> &str {
        self.model_name()
    }

    fn dimension_dyn(&self) -> usize {
        self.dimension()
    }
}

/// Embedding provider chosen at startup (hashing, remote API, test double).
pub struct BoxEmbedder {
    inner: Box<dyn EmbedderDyn + Send + Sync>,
}

impl BoxEmbedder {
    pub fn new<T: Embedder + 'static>(embedder: T) -> Self {
        Self {
            inner: Box::new(embedder),
        }
    }

    /// Embed `text` for `task`. Document and query embeddings may differ.
    pub async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>, ProviderError> {
        self.inner.embed_boxed(text, task).await
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name_dyn()
    }

    /// Length of every returned vector; the vector index is created with it.
    pub fn dimension(&self) -> usize {
        self.inner.dimension_dyn()
    }
}

impl std::fmt::Debug for BoxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxEmbedder")
            .field("model", &self.model_name())
            .field("dimension", &self.dimension())
            .finish()
    }
}
