//! Chat server binary
//!
//! Run with: cargo run --bin docchat-server

use docchat::{config::AppConfig, server::ChatServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.embedding.model);
    tracing::info!("  - LLM model: {}", config.llm.model);
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);
    tracing::info!("  - Top K: {}", config.retrieval.top_k);
    tracing::info!("  - Database: {}", config.storage.database_path.display());

    let server = ChatServer::new(config)?;

    println!("Server starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/documents     - Upload a PDF");
    println!("  GET    /api/documents     - List documents");
    println!("  DELETE /api/documents/:id - Delete a document");
    println!("  POST   /api/conversations - Start a conversation");
    println!("  POST   /api/chat          - Ask a question (streamed answer)");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
