//! Conversation and chat endpoints

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};
use crate::generation::{ContextAssembler, GENERATION_FAILURE_TEXT};
use crate::server::state::AppState;
use crate::types::{ChatRequest, Conversation, CreateConversationRequest, Message, SourceRef};

/// POST /api/conversations - Start a conversation about a document
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>)> {
    if state.store().get_document(request.document_id)?.is_none() {
        return Err(Error::DocumentNotFound(request.document_id.to_string()));
    }

    let conversation = Conversation::new(request.document_id);
    state.store().insert_conversation(&conversation)?;

    tracing::info!(
        conversation_id = %conversation.id,
        document_id = %conversation.document_id,
        "Conversation created"
    );

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// POST /api/chat - Ask a question, stream back the answer
///
/// The response body is `text/plain` fragments; the `X-Sources` header
/// carries the base64-encoded JSON source list so the client can resolve
/// `[n]` markers as they arrive. The assistant message is persisted after the
/// stream ends, with the exact text that was delivered (a generation failure
/// substitutes a fixed apology rather than silence).
pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<Response> {
    let question = request.message.trim().to_string();
    if question.is_empty() {
        return Err(Error::InvalidRequest("message must not be empty".to_string()));
    }

    let conversation = state
        .store()
        .get_conversation(request.conversation_id)?
        .ok_or_else(|| Error::ConversationNotFound(request.conversation_id.to_string()))?;

    state
        .store()
        .insert_message(&Message::user(conversation.id, question.clone()))?;

    // Query-time embedding failure is fatal to the request, not papered over
    // with an empty-context answer
    let top_k = state.config().retrieval.top_k;
    let matches = state
        .retriever()
        .retrieve(&question, conversation.document_id, top_k)
        .await?;

    let assembled = ContextAssembler::assemble(&question, &matches);
    let sources: Vec<SourceRef> = assembled.entries.iter().map(SourceRef::from_entry).collect();

    let encoded_sources = BASE64.encode(serde_json::to_vec(&sources)?);

    let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(16);
    let store = state.store().clone();
    let streamer = state.streamer().clone();
    let conversation_id = conversation.id;
    let prompt = assembled.prompt;
    let persisted_sources = sources;

    tokio::spawn(async move {
        let mut delivered = String::new();

        match streamer.stream_answer(&prompt).await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(fragment) => {
                            delivered.push_str(&fragment);
                            // A closed receiver means the client went away;
                            // stop pulling but still persist what was sent
                            if tx.send(Ok(Bytes::from(fragment))).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Stream failed mid-answer");
                            delivered.push_str(GENERATION_FAILURE_TEXT);
                            let _ = tx.send(Ok(Bytes::from(GENERATION_FAILURE_TEXT))).await;
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start answer stream");
                delivered.push_str(GENERATION_FAILURE_TEXT);
                let _ = tx.send(Ok(Bytes::from(GENERATION_FAILURE_TEXT))).await;
            }
        }

        drop(tx);

        if !delivered.is_empty() {
            if let Err(e) = store.insert_message(&Message::assistant(
                conversation_id,
                delivered,
                persisted_sources,
            )) {
                tracing::error!(error = %e, "Failed to persist assistant message");
            }
        }
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    let sources_value = HeaderValue::from_str(&encoded_sources)
        .map_err(|e| Error::InvalidRequest(format!("Invalid sources header: {}", e)))?;
    headers.insert(HeaderName::from_static("x-sources"), sources_value);

    let body = Body::from_stream(ReceiverStream::new(rx));
    Ok((headers, body).into_response())
}
