//! Backfill missing chunk embeddings
//!
//! Chunks whose ingest-time embedding call failed are stored with a NULL
//! embedding and excluded from retrieval. This job embeds them one at a time
//! (rate-limit friendly) and stores each success; failures are logged and
//! skipped so a partial run still makes progress.
//!
//! Run with: cargo run --bin docchat-backfill

use std::sync::Arc;

use docchat::config::AppConfig;
use docchat::embedding::{EmbeddingProvider, HfEmbedder};
use docchat::storage::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BATCH_SIZE: usize = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    let store = Arc::new(SqliteStore::new(&config.storage.database_path)?);
    let embedder = HfEmbedder::new(&config.embedding)?;

    let mut filled = 0usize;
    let mut failed = 0usize;

    loop {
        let missing = store.chunks_missing_embedding(BATCH_SIZE)?;
        if missing.is_empty() {
            break;
        }

        tracing::info!(remaining = missing.len(), "Backfilling chunk embeddings");

        let mut progressed = false;
        for chunk in missing {
            match embedder.embed_one(&chunk.content).await {
                Ok(embedding) => {
                    if store.backfill_embedding(chunk.id, &embedding)? {
                        filled += 1;
                        progressed = true;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        chunk_id = %chunk.id,
                        document_id = %chunk.document_id,
                        error = %e,
                        "Failed to embed chunk, skipping"
                    );
                    failed += 1;
                }
            }
        }

        // Every remaining chunk failed this round; bail instead of spinning
        if !progressed {
            break;
        }
    }

    tracing::info!(filled, failed, "Backfill complete");
    println!("Backfilled {} chunk embeddings ({} failures)", filled, failed);

    Ok(())
}
