//! Centralized retry policy for embedding and generation calls.
//!
//! Every provider call in the engine goes through [`RetryPolicy::run`], either
//! directly or via the [`RetryingEmbedder`] / [`RetryingGenerator`] wrappers.
//! Only errors classified by [`ProviderError::is_retryable`] are repeated;
//! everything else fails on the first attempt.

use std::future::Future;
use std::time::Duration;

use recall_types::config::RetryConfig;
use recall_types::error::ProviderError;

use super::generator::Generator;
use crate::memory::embedder::{Embedder, TaskType};

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each delay randomized in either direction.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay before retry number `attempt` (1-based) after `error`.
    ///
    /// `min(max_delay, base_delay * 2^(attempt-1))` with jitter applied, but
    /// never shorter than a provider-supplied `retry_after_ms`.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        let jittered = if self.jitter > 0.0 {
            let factor = 1.0 + self.jitter * (2.0 * rand::random::<f64>() - 1.0);
            backoff.mul_f64(factor.max(0.0))
        } else {
            backoff
        };

        match error.retry_after_ms() {
            Some(ms) => jittered.max(Duration::from_millis(ms)),
            None => jittered,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is exhausted. The last error is returned.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &e);
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        tracing::warn!(op = op_name, attempt, error = %e, "provider call gave up");
                    }
                    return Err(e);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

/// Embedder decorator that applies a [`RetryPolicy`] to every call.
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: Embedder> RetryingEmbedder<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>, ProviderError> {
        self.policy
            .run("embed", || self.inner.embed(text, task))
            .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Generator decorator that applies a [`RetryPolicy`] to every call.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<G: Generator> Generator for RetryingGenerator<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.policy
            .run("generate", || self.inner.generate(prompt))
            .await
    }
}
