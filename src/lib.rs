//! docchat: chat with your PDFs
//!
//! A retrieval-augmented pipeline: upload a PDF, ask questions about it, and
//! get streamed answers annotated with `[n]` citations that resolve back to
//! the exact document fragments the answer was grounded on.

pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
