use async_trait::async_trait;

use crate::errors::ProviderError;

/// Produces fixed-dimension embedding vectors.
///
/// `Ok(None)` is a legitimate outcome (the model declined or the text was
/// unembeddable); the memory is then written without an embedding.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, ProviderError>;
}
