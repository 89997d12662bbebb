use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::models::Generation;

/// Per-call generation knobs. `timeout` overrides the provider default.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    pub timeout: Option<Duration>,
    pub max_tokens: Option<u32>,
}

/// Prompted text generation with timeout and usage accounting.
///
/// Callers must never hold a write transaction across a `generate` call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String, ProviderError>;

    /// Default wraps `generate` with no usage block; transports that
    /// report usage override this.
    async fn generate_with_usage(
        &self,
        prompt: &str,
        opts: GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let text = self.generate(prompt, opts).await?;
        Ok(Generation { text, usage: None })
    }

    async fn available(&self) -> bool;
}
