//! Local feature-hashing embedder.
//!
//! Maps lowercased word tokens and their character trigrams into a fixed
//! number of signed buckets (SHA-256 of the feature picks the bucket and the
//! sign), then L2-normalizes. Needs no model download, is stable across runs
//! and platforms, and gives texts that share words a high cosine similarity.

use sha2::{Digest, Sha256};

use recall_core::memory::embedder::{Embedder, TaskType};
use recall_types::error::ProviderError;

/// Default output dimension.
pub const DEFAULT_DIMENSION: usize = 256;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.35;

/// Deterministic bag-of-features embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_name: format!("hashing-{dimension}"),
        }
    }

    /// Embed synchronously. Never fails.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            self.add_feature(&mut vector, &format!("w:{token}"), WORD_WEIGHT);
            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    self.add_feature(&mut vector, &format!("g:{gram}"), TRIGRAM_WEIGHT);
                }
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let bucket = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[(bucket % self.dimension as u64) as usize] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
