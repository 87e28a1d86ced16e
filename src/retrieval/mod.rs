//! Query-time retrieval over stored chunk embeddings

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

/// A chunk matched for one query; ephemeral, never persisted
#[derive(Debug, Clone)]
pub struct RetrievedMatch {
    /// Matched chunk ID
    pub chunk_id: Uuid,
    /// Chunk's position within its document
    pub chunk_index: u32,
    /// Chunk content
    pub content: String,
    /// Cosine similarity to the query embedding
    pub similarity: f32,
}

/// Trait for similarity search over a document's stored embeddings
///
/// Implementations must return at most `k` matches, ordered strictly
/// descending by similarity with ties broken by ascending `chunk_index`, and
/// must only consider chunks of the target document that have an embedding.
#[async_trait]
pub trait VectorSearcher: Send + Sync {
    /// Find the chunks most similar to `query_embedding` within a document
    async fn search(
        &self,
        query_embedding: &[f32],
        document_id: Uuid,
        k: usize,
    ) -> Result<Vec<RetrievedMatch>>;
}

/// Retriever: embeds a question and searches the chunk index
///
/// A query-time embedding failure is fatal to the query and propagates to the
/// caller; no empty context is fabricated.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    searcher: Arc<dyn VectorSearcher>,
}

impl Retriever {
    /// Create a new retriever
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, searcher: Arc<dyn VectorSearcher>) -> Self {
        Self { embedder, searcher }
    }

    /// Retrieve the top `k` matches for a question within a document
    pub async fn retrieve(
        &self,
        question: &str,
        document_id: Uuid,
        k: usize,
    ) -> Result<Vec<RetrievedMatch>> {
        let query_embedding = self.embedder.embed_one(question).await?;
        let matches = self
            .searcher
            .search(&query_embedding, document_id, k)
            .await?;

        tracing::debug!(
            document_id = %document_id,
            matches = matches.len(),
            "Retrieved context chunks"
        );

        Ok(matches)
    }
}

/// Cosine similarity between two vectors
///
/// Returns 0.0 for mismatched dimensions or zero-magnitude vectors, which
/// ranks such chunks last rather than poisoning the ordering with NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Rank matches in place: descending similarity, ties by ascending chunk index
pub fn rank_matches(matches: &mut Vec<RetrievedMatch>, k: usize) {
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    matches.truncate(k);
}
