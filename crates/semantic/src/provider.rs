use async_trait::async_trait;

use crate::error::ProviderError;

/// A remote or local model that turns text into a fixed-length vector.
///
/// Implementations make exactly one attempt per call; retry and caching are
/// layered on top by [`Embedder`](crate::Embedder).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier stored alongside every cached vector.
    fn model_id(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}
