//! Configuration for the document chat service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Generation (LLM) service configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from `DOCCHAT_CONFIG` if set, otherwise defaults
    pub fn load() -> Result<Self> {
        match std::env::var("DOCCHAT_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 10MB, matching the upload cap)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 10 * 1024 * 1024,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive windows in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 200,
        }
    }
}

/// Embedding service configuration (Hugging Face inference API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Inference API base URL
    pub base_url: String,
    /// Embedding model name
    pub model: String,
    /// API key; falls back to the `HF_API_KEY` environment variable
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.huggingface.co/hf-inference".to_string(),
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl EmbeddingConfig {
    /// Resolve the API key from config or environment
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var("HF_API_KEY")
            .map_err(|_| Error::Config("Embedding API key not set (HF_API_KEY)".to_string()))
    }
}

/// Generation (LLM) service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions base URL
    pub base_url: String,
    /// Generation model name
    pub model: String,
    /// API key; falls back to the `GROQ_API_KEY` environment variable
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.3,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config or environment
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var("GROQ_API_KEY")
            .map_err(|_| Error::Config("LLM API key not set (GROQ_API_KEY)".to_string()))
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve per query
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let database_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docchat")
            .join("docchat.db");
        Self { database_path }
    }
}
