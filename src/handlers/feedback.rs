//! `POST /feedback` and its conventional supporting endpoints. Per
//! spec.md §6, everything outside ingestion itself is a thin wrapper
//! over the store, except where it writes — those writes still take
//! the write gate (enforced inside `FeedbackStore`, not here).

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::models::{Feedback, FeedbackInput, ResolutionRequest};
use crate::utils::ApiResult;

pub async fn ingest_feedback(
    State(state): State<Arc<AppState>>,
    Json(input): Json<FeedbackInput>,
) -> ApiResult<Response> {
    let outcome = state.ingestion.ingest(input.raw_content).await?;

    // spec.md §8 scenarios 1-2: every ingest response is 200, whether
    // the row was freshly created or is a duplicate; only the
    // `x-duplicate` header distinguishes the two.
    let mut response = (StatusCode::OK, Json(outcome.feedback)).into_response();
    if outcome.duplicate {
        response
            .headers_mut()
            .insert("x-duplicate", HeaderValue::from_static("true"));
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Feedback>>> {
    let rows = state.store.list(params.skip, params.limit).await?;
    Ok(Json(rows))
}

pub async fn get_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Feedback>> {
    let feedback = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| crate::utils::ApiError::NotFound(format!("feedback {id} not found")))?;
    Ok(Json(feedback))
}

pub async fn resolve_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolutionRequest>,
) -> ApiResult<Json<Feedback>> {
    let feedback = state
        .store
        .resolve(id, req.note)
        .await?
        .ok_or_else(|| crate::utils::ApiError::NotFound(format!("feedback {id} not found")))?;
    Ok(Json(feedback))
}

#[derive(Serialize)]
pub struct BatchCsvResponse {
    pub message: String,
}

/// Accepts a raw CSV payload (columns `text` or `raw_content`) and
/// processes it in the background, returning immediately, per
/// `original_source/app/routers/feedback.py::upload_csv`.
pub async fn batch_csv_upload(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> ApiResult<Json<BatchCsvResponse>> {
    let text = String::from_utf8_lossy(&body).into_owned();
    let ingestion = Arc::clone(&state.ingestion);
    tokio::spawn(async move {
        ingestion.ingest_csv(&text).await;
    });
    Ok(Json(BatchCsvResponse { message: "Processing started in background.".to_string() }))
}
