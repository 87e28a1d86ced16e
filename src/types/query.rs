//! Request types for the chat API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for POST /api/conversations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    /// Document to chat about
    pub document_id: Uuid,
}

/// Request body for POST /api/chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation to post into
    pub conversation_id: Uuid,
    /// User question
    pub message: String,
}
