use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, CurrentUser};
use crate::db::models::Document;
use crate::doc_processor;
use crate::retrieval::{self, ChunkScore};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub document: Document,
    pub chunks: usize,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub query: String,
    pub document_id: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PreviewHit {
    #[serde(flatten)]
    pub score: ChunkScore,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub document_id: String,
    pub total_chunks: usize,
    pub results: Vec<PreviewHit>,
}

/// The named document if the user owns it, otherwise their latest upload.
pub(crate) fn resolve_document(
    state: &AppState,
    user_id: &str,
    document_id: Option<&str>,
) -> Result<Option<Document>, ApiError> {
    match document_id {
        Some(id) => state
            .db
            .get_document(user_id, id)?
            .map(Some)
            .ok_or_else(|| ApiError::NotFound(format!("Document {} not found", id))),
        None => Ok(state.db.latest_document(user_id)?),
    }
}

/// GET /api/documents
pub async fn list_documents(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(state.db.list_documents(&current.user.id)?))
}

/// Remove a half-processed upload: row, stored file and any cache.
fn discard_upload(state: &AppState, user_id: &str, doc_id: &str, file_path: &std::path::Path) {
    if let Err(e) = state.db.delete_document(user_id, doc_id) {
        tracing::warn!(doc_id, "failed to delete document row: {}", e);
    }
    if let Err(e) = std::fs::remove_file(file_path) {
        tracing::warn!(doc_id, "failed to remove stored PDF: {}", e);
    }
    if let Err(e) = state.cache.remove(doc_id) {
        tracing::warn!(doc_id, "failed to remove chunk cache: {}", e);
    }
}

/// POST /api/documents — multipart upload of one PDF in the `file` field.
pub async fn upload_document(
    State(state): State<AppState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ApiError::BadRequest("Only PDF files are supported".into()));
    }
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }

    // Save file and record (chunking happens after; failures undo both)
    let user_id = current.user.id.clone();
    let doc_id = uuid::Uuid::new_v4().to_string();
    let file_path = state.config.pdf_dir().join(format!("{}.pdf", doc_id));
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {}", e)))?;
    let document = match state.db.create_document(
        &doc_id,
        &user_id,
        &filename,
        &file_path.to_string_lossy(),
        Some(bytes.len() as i64),
    ) {
        Ok(document) => document,
        Err(e) => {
            discard_upload(&state, &user_id, &doc_id, &file_path);
            return Err(e.into());
        }
    };

    let (chunk_size, overlap) = (state.config.chunk_size, state.config.chunk_overlap);
    let extracted =
        tokio::task::spawn_blocking(move || doc_processor::extract(&bytes, chunk_size, overlap))
            .await;

    let chunks = match extracted {
        Ok(Ok(chunks)) => chunks,
        Ok(Err(e)) => {
            tracing::warn!(doc_id = %doc_id, filename = %filename, "extraction failed: {}", e);
            discard_upload(&state, &user_id, &doc_id, &file_path);
            return Err(e.into());
        }
        Err(e) => {
            discard_upload(&state, &user_id, &doc_id, &file_path);
            return Err(ApiError::Internal(format!("extraction task failed: {}", e)));
        }
    };

    if let Err(e) = state.cache.write(&doc_id, &chunks) {
        discard_upload(&state, &user_id, &doc_id, &file_path);
        return Err(e.into());
    }

    tracing::info!(
        doc_id = %doc_id,
        filename = %filename,
        chunks = chunks.len(),
        "document processed"
    );
    Ok(Json(UploadResponse {
        ok: true,
        document,
        chunks: chunks.len(),
    }))
}

/// DELETE /api/documents/{id}
pub async fn delete_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let document = state
        .db
        .get_document(&current.user.id, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("Document {} not found", id)))?;

    state.db.delete_document(&current.user.id, &document.id)?;
    match tokio::fs::remove_file(&document.file_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(doc_id = %document.id, "failed to remove stored PDF: {}", e),
    }
    if let Err(e) = state.cache.remove(&document.id) {
        tracing::warn!(doc_id = %document.id, "failed to remove chunk cache: {}", e);
    }

    tracing::info!(doc_id = %document.id, "document deleted");
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/retrieval/preview — show how chunks score against a query.
pub async fn preview_retrieval(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let document = resolve_document(&state, &current.user.id, req.document_id.as_deref())?
        .ok_or_else(|| ApiError::NotFound("No document uploaded".into()))?;

    let chunks = state
        .cache
        .read(&document.id)
        .inspect_err(|e| tracing::warn!(doc_id = %document.id, "{}", e))?;

    let top_k = req.top_k.unwrap_or(state.config.top_k);
    let results = retrieval::rank_scored(&req.query, &chunks, top_k)
        .into_iter()
        .map(|score| PreviewHit {
            content: chunks[score.index].clone(),
            score,
        })
        .collect();

    Ok(Json(PreviewResponse {
        document_id: document.id,
        total_chunks: chunks.len(),
        results,
    }))
}
