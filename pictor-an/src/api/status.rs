//! Status endpoint
//!
//! GET /status/{task_id} reports whatever fields are currently populated.
//! A record with a null annotation means the chain has not finished — or
//! failed; no failure flag is surfaced here, only what is in the store.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::db::annotations;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /status/{task_id} response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub annotation: Option<String>,
    pub file_url: Option<String>,
}

/// GET /status/{task_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let record = annotations::load_record(&state.db, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No annotation record for {}", task_id)))?;

    tracing::debug!(
        task_id = %task_id,
        annotated = record.annotation.is_some(),
        "Status query"
    );

    Ok(Json(StatusResponse {
        annotation: record.annotation,
        file_url: Some(record.file_url),
    }))
}

/// Build status routes
pub fn status_routes() -> Router<AppState> {
    Router::new().route("/status/:task_id", get(get_status))
}
