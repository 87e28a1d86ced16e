//! Text embedding providers

mod hf;

pub use hf::HfEmbedder;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for turning text into fixed-length embedding vectors
///
/// `embed_many` is one batched request where the backend supports batch
/// input; a position with a zero-length result is reported as `None` rather
/// than failing the whole batch. Callers decide the failure policy: ingestion
/// tolerates absent embeddings per chunk, query-time embedding failure is
/// fatal to that query.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts; output positions correspond to input positions
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
