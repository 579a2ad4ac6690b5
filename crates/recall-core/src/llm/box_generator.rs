//! BoxGenerator -- object-safe dynamic dispatch wrapper for Generator.
//!
//! 1. Define an object-safe `GeneratorDyn` trait with boxed futures
//! 2. Blanket-impl `GeneratorDyn` for all `T: Generator`
//! 3. `BoxGenerator` wraps `Box<dyn GeneratorDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use recall_types::error::ProviderError;

use super::generator::Generator;

/// Object-safe version of [`Generator`] with boxed futures.
pub trait GeneratorDyn: Send + Sync {
    fn name_dyn(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;
}

/// Blanket implementation: any `Generator` automatically implements `GeneratorDyn`.
impl<T: Generator> GeneratorDyn for T {
    fn name_dyn(&self) -> &str {
        self.name()
    }

    fn generate_boxed<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>> {
        Box::pin(self.generate(prompt))
    }
}

/// Type-erased generator for runtime selection.
pub struct BoxGenerator {
    inner: Box<dyn GeneratorDyn + Send + Sync>,
}

impl BoxGenerator {
    /// Wrap a concrete `Generator` in a type-erased box.
    pub fn new<T: Generator + 'static>(generator: T) -> Self {
        Self {
            inner: Box::new(generator),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name_dyn()
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.inner.generate_boxed(prompt).await
    }
}

impl std::fmt::Debug for BoxGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxGenerator")
            .field("name", &self.name())
            .finish()
    }
}
