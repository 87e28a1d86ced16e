//! Error types for the document chat pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// PDF text extraction failed; ingestion aborts entirely
    #[error("Failed to extract text from '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// Embedding service call failed or returned an unrecognized shape
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Similarity search itself failed (distinct from zero matches)
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Streaming generation call failed before or during the stream
    #[error("Answer generation failed: {0}")]
    Generation(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Conversation not found
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// Request validation error
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::Extraction { filename, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "extraction_error",
                format!("Failed to extract text from '{}': {}", filename, message),
            ),
            Error::Embedding(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "embedding_error",
                msg.clone(),
            ),
            Error::Retrieval(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "retrieval_error",
                msg.clone(),
            ),
            Error::Generation(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "generation_error",
                msg.clone(),
            ),
            Error::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                msg.clone(),
            ),
            Error::DocumentNotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Document not found: {}", id),
            ),
            Error::ConversationNotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Conversation not found: {}", id),
            ),
            Error::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg.clone()),
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
