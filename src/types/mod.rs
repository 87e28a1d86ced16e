//! Shared data types

pub mod document;
pub mod query;
pub mod response;

pub use document::{Chunk, Conversation, Document, Message, Role};
pub use query::{ChatRequest, CreateConversationRequest};
pub use response::{ContextEntry, DocumentSummary, Segment, SourceRef};
