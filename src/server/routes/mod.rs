//! API routes for the chat server

pub mod chat;
pub mod documents;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Document management; uploads get a larger body limit
        .route(
            "/documents",
            post(documents::upload_document).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/documents", get(documents::list_documents))
        .route("/documents/:id", delete(documents::delete_document))
        // Conversations and chat
        .route("/conversations", post(chat::create_conversation))
        .route("/chat", post(chat::chat))
}
