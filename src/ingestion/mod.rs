//! Document ingestion: PDF text extraction, chunking and embedding

mod chunker;
mod extract;
mod pipeline;

pub use chunker::TextChunker;
pub use extract::{extract_text, is_pdf, normalize_whitespace};
pub use pipeline::IngestPipeline;
