//! Bounded LRU cache in front of the embedding provider.
//!
//! Keys are `sha256(first N chars)[..16] + ":" + task`, so long texts that
//! share a prefix share an entry and document/query embeddings never mix.
//! The cache is owned by the episodic store instance; there is no global.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};

use recall_types::config::EmbeddingCacheConfig;
use recall_types::error::ProviderError;

use super::box_embedder::BoxEmbedder;
use super::embedder::TaskType;

/// Hit/miss counters and current occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

/// Embedder with a bounded LRU cache keyed on a content-prefix hash.
pub struct CachedEmbedder {
    inner: BoxEmbedder,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    key_prefix_chars: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedEmbedder {
    pub fn new(inner: BoxEmbedder, config: &EmbeddingCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            key_prefix_chars: config.key_prefix_chars,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key for `text` under `task`.
    pub fn cache_key(&self, text: &str, task: TaskType) -> String {
        let prefix: String = text.chars().take(self.key_prefix_chars).collect();
        let digest = format!("{:x}", Sha256::digest(prefix.as_bytes()));
        format!("{}:{task}", &digest[..16])
    }

    /// Embed `text`, serving repeated requests from the cache.
    ///
    /// Provider errors are returned unchanged and never cached.
    pub async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>, ProviderError> {
        let key = self.cache_key(text, task);
        if let Some(hit) = self.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = self.inner.embed(text, task).await?;
        self.lock().put(key, vector.clone());
        Ok(vector)
    }

    /// Drop every cached vector. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut cache = self.lock();
        let n = cache.len();
        cache.clear();
        tracing::debug!(cleared = n, "embedding cache cleared");
        n
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: cache.len(),
            capacity: cache.cap().get(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Vec<f32>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
