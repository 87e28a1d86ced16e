//! End-to-end ingestion: extract, chunk, embed, persist

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::storage::SqliteStore;
use crate::types::{Chunk, Document};

use super::chunker::TextChunker;
use super::extract::{extract_text, normalize_whitespace};

/// Ingestion pipeline for uploaded PDFs
///
/// A per-chunk embedding failure is not fatal: the chunk is persisted with an
/// absent embedding and can be backfilled later. An extraction failure aborts
/// the whole upload before anything is persisted.
pub struct IngestPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<SqliteStore>,
}

impl IngestPipeline {
    /// Create a new pipeline
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<SqliteStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Ingest an uploaded PDF and return the created document record
    pub async fn ingest(&self, filename: &str, data: &[u8]) -> Result<Document> {
        let text = extract_text(filename, data)?;
        self.ingest_text(filename, &text).await
    }

    /// Chunk, embed and persist already-extracted text
    pub async fn ingest_text(&self, filename: &str, text: &str) -> Result<Document> {
        let text = normalize_whitespace(text);
        let pieces = self.chunker.chunk(&text);
        tracing::info!(
            filename = %filename,
            chunks = pieces.len(),
            "Extracted and chunked document"
        );

        let embeddings = match self.embedder.embed_many(&pieces).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                // Chunks stay retrievable-after-backfill rather than lost
                tracing::warn!(
                    filename = %filename,
                    error = %e,
                    "Batch embedding failed; storing chunks without embeddings"
                );
                vec![None; pieces.len()]
            }
        };

        let mut document = Document::new(filename.to_string());
        document.total_chunks = pieces.len() as u32;

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (content, embedding))| {
                Chunk::new(document.id, index as u32, content, embedding)
            })
            .collect();

        let missing = chunks.iter().filter(|c| c.embedding.is_none()).count();
        if missing > 0 {
            tracing::warn!(
                document_id = %document.id,
                missing,
                "Some chunks were stored without embeddings"
            );
        }

        self.store.insert_document(&document)?;
        self.store.insert_chunks(&chunks)?;

        tracing::info!(
            document_id = %document.id,
            filename = %document.filename,
            total_chunks = document.total_chunks,
            "Document ingested"
        );

        Ok(document)
    }
}
