//! Application state for the chat server

use std::sync::Arc;

use crate::config::AppConfig;
use crate::embedding::{EmbeddingProvider, HfEmbedder};
use crate::error::Result;
use crate::generation::{AnswerStreamer, GroqClient};
use crate::ingestion::{IngestPipeline, TextChunker};
use crate::retrieval::Retriever;
use crate::storage::SqliteStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AppConfig,
    /// Document, chunk and conversation store
    store: Arc<SqliteStore>,
    /// Streaming answer generator
    streamer: Arc<dyn AnswerStreamer>,
    /// Upload ingestion pipeline
    pipeline: IngestPipeline,
    /// Query-time retriever
    retriever: Retriever,
}

impl AppState {
    /// Create application state with the default providers
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(&config.storage.database_path)?);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HfEmbedder::new(&config.embedding)?);
        let streamer: Arc<dyn AnswerStreamer> = Arc::new(GroqClient::new(&config.llm)?);

        tracing::info!(
            embedding_provider = embedder.name(),
            embedding_model = %config.embedding.model,
            llm_provider = streamer.name(),
            llm_model = %config.llm.model,
            "Application state initialized"
        );

        Ok(Self::with_providers(config, store, embedder, streamer))
    }

    /// Create application state with explicit providers (used by tests)
    pub fn with_providers(
        config: AppConfig,
        store: Arc<SqliteStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        streamer: Arc<dyn AnswerStreamer>,
    ) -> Self {
        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
        let pipeline = IngestPipeline::new(chunker, Arc::clone(&embedder), Arc::clone(&store));
        let searcher: Arc<dyn crate::retrieval::VectorSearcher> = store.clone();
        let retriever = Retriever::new(Arc::clone(&embedder), searcher);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                streamer,
                pipeline,
                retriever,
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get the store
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.inner.store
    }

    /// Get the streaming generator
    pub fn streamer(&self) -> &Arc<dyn AnswerStreamer> {
        &self.inner.streamer
    }

    /// Get the ingestion pipeline
    pub fn pipeline(&self) -> &IngestPipeline {
        &self.inner.pipeline
    }

    /// Get the retriever
    pub fn retriever(&self) -> &Retriever {
        &self.inner.retriever
    }
}
