//! Generator trait for prompt-to-text completion.
//!
//! The engine only needs a single blocking-style completion: graph extraction,
//! entity lookup and episodic-to-semantic summarization all send one prompt
//! and parse the returned text. Streaming, tools and chat history belong to
//! the conversational loop, not to this crate.

use recall_types::error::ProviderError;

/// Trait for turning a prompt into generated text.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Generator: Send + Sync {
    /// Provider name for logging (e.g., "anthropic", "scripted").
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    fn generate(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, ProviderError>> + Send;
}
