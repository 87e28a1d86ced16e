//! Response types: context entries, source references, document summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Document;

/// Maximum preview length when persisting a source reference
const SOURCE_PREVIEW_CHARS: usize = 300;

/// One numbered context entry handed to the generator
///
/// `citation_number` is the 1-based retrieval-rank position for one query;
/// this is what `[n]` markers in the generated answer refer to.
/// `chunk_index` is the chunk's storage position within the document and is
/// carried for display only. The two numbering schemes are never conflated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// 1-based rank position assigned at prompt-build time
    pub citation_number: usize,
    /// Source chunk ID
    pub chunk_id: Uuid,
    /// Chunk's position within its document (display only)
    pub chunk_index: u32,
    /// Full chunk content
    pub content: String,
}

/// A compact source reference persisted alongside an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Source chunk ID
    pub chunk_id: Uuid,
    /// Chunk's position within its document
    pub chunk_index: u32,
    /// Truncated content preview
    pub preview: String,
}

impl SourceRef {
    /// Build a source reference from a context entry, truncating the preview
    pub fn from_entry(entry: &ContextEntry) -> Self {
        let preview = if entry.content.chars().count() > SOURCE_PREVIEW_CHARS {
            entry.content.chars().take(SOURCE_PREVIEW_CHARS).collect()
        } else {
            entry.content.clone()
        };
        Self {
            chunk_id: entry.chunk_id,
            chunk_index: entry.chunk_index,
            preview,
        }
    }
}

/// A piece of resolved answer text: either plain text or a resolved citation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Segment {
    /// Literal text, preserved exactly
    Text { value: String },
    /// A `[n]` marker resolved to its source entry
    Citation { number: usize, entry: ContextEntry },
}

/// Summary of an ingested document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Document ID
    pub id: Uuid,
    /// Filename
    pub filename: String,
    /// Number of chunks created
    pub total_chunks: u32,
    /// Ingestion timestamp
    pub created_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename.clone(),
            total_chunks: doc.total_chunks,
            created_at: doc.created_at,
        }
    }
}

/// Response for listing documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    /// List of documents
    pub documents: Vec<DocumentSummary>,
    /// Total count
    pub total_count: usize,
}
