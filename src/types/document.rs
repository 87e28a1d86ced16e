//! Document, chunk and conversation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A PDF document that has been ingested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Original filename as uploaded
    pub filename: String,
    /// Number of chunks created at ingestion
    pub total_chunks: u32,
    /// Ingestion timestamp
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document record
    pub fn new(filename: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename,
            total_chunks: 0,
            created_at: Utc::now(),
        }
    }
}

/// A chunk of extracted text from a document
///
/// `chunk_index` is the chunk's 0-based position in the ingestion-time split
/// order, unique and contiguous per document. `embedding` is `None` when the
/// embedding call failed at ingest time; such chunks are invisible to
/// retrieval until backfilled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// 0-based position within the document's split order
    pub chunk_index: u32,
    /// Text content
    pub content: String,
    /// Embedding vector, absent if the embedding call failed at ingest
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(
        document_id: Uuid,
        chunk_index: u32,
        content: String,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            content,
            embedding,
        }
    }
}

/// A conversation bound to one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: Uuid,
    /// Document this conversation is about
    pub document_id: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation for a document
    pub fn new(document_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            created_at: Utc::now(),
        }
    }
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Database string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse from database string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A stored chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: Uuid,
    /// Parent conversation ID
    pub conversation_id: Uuid,
    /// Author role
    pub role: Role,
    /// Message text; for assistant messages this is the exact text that was
    /// streamed to the client, including any substituted failure text
    pub content: String,
    /// Source references the answer was grounded on (assistant messages only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sources: Option<Vec<super::response::SourceRef>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message
    pub fn user(conversation_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role: Role::User,
            content,
            sources: None,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant message with its grounding sources
    pub fn assistant(
        conversation_id: Uuid,
        content: String,
        sources: Vec<super::response::SourceRef>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role: Role::Assistant,
            content,
            sources: Some(sources),
            created_at: Utc::now(),
        }
    }
}
