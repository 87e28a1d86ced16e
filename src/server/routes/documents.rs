//! Document upload and management endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::is_pdf;
use crate::server::state::AppState;
use crate::types::response::{DocumentListResponse, DocumentSummary};

/// POST /api/documents - Upload and ingest a PDF
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentSummary>)> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidRequest(format!("Failed to read file: {}", e)))?;

        upload = Some((filename, data.to_vec()));
        break;
    }

    let (filename, data) = upload
        .ok_or_else(|| Error::InvalidRequest("No file field in upload".to_string()))?;

    if data.len() > state.config().server.max_upload_size {
        return Err(Error::InvalidRequest(format!(
            "File exceeds the {} byte upload limit",
            state.config().server.max_upload_size
        )));
    }

    if !is_pdf(&data) {
        return Err(Error::InvalidRequest(
            "Only PDF uploads are accepted".to_string(),
        ));
    }

    tracing::info!(filename = %filename, bytes = data.len(), "Processing upload");

    let document = state.pipeline().ingest(&filename, &data).await?;

    Ok((StatusCode::CREATED, Json(DocumentSummary::from(&document))))
}

/// GET /api/documents - List ingested documents
pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>> {
    let documents: Vec<DocumentSummary> = state
        .store()
        .list_documents()?
        .iter()
        .map(DocumentSummary::from)
        .collect();
    let total_count = documents.len();

    Ok(Json(DocumentListResponse {
        documents,
        total_count,
    }))
}

/// DELETE /api/documents/:id - Delete a document and everything under it
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if !state.store().delete_document(id)? {
        return Err(Error::DocumentNotFound(id.to_string()));
    }

    tracing::info!(document_id = %id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}
