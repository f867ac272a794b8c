//! Submission endpoint
//!
//! POST /annotate accepts a multipart form (file, optional prompt, optional
//! email), validates the upload, and returns the correlation identifier
//! immediately. The actual outcome is only observable later through
//! GET /status/{id}.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /annotate response
#[derive(Debug, Serialize)]
pub struct AnnotateResponse {
    pub message: String,
    pub id: Uuid,
}

/// POST /annotate
///
/// Accepts the submission and enqueues the chain. Returns 202 with the
/// tracking identifier regardless of the eventual downstream outcome.
pub async fn annotate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<AnnotateResponse>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut prompt: Option<String> = None;
    let mut email: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .ok_or_else(|| {
                        ApiError::BadRequest("File field is missing a filename".to_string())
                    })?
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("prompt") => {
                prompt = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read prompt: {}", e))
                })?);
            }
            Some("email") => {
                email = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read email: {}", e))
                })?);
            }
            _ => {
                // Unknown fields are ignored
            }
        }
    }

    let (file_name, file_bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;

    let task_id = state
        .orchestrator
        .submit(file_bytes, &file_name, prompt, email.as_deref())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AnnotateResponse {
            message: "Annotation in progress".to_string(),
            id: task_id,
        }),
    ))
}

/// Build submission routes
pub fn annotate_routes() -> Router<AppState> {
    Router::new().route("/annotate", post(annotate))
}
