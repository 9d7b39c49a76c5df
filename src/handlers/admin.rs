//! Operator endpoints: aggregate stats, a manual reconciliation
//! trigger, and the review-queue export, grounded on
//! `original_source/app/routers/admin.py`.

use std::sync::Arc;

use axum::{Json, extract::State, http::header, response::IntoResponse};
use serde::Serialize;

use crate::AppState;
use crate::models::Feedback;
use crate::utils::ApiResult;

#[derive(Serialize)]
pub struct StatsResponse {
    pub total: i64,
    pub urgent: i64,
    pub fallback: i64,
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.store.stats().await?;
    Ok(Json(StatsResponse { total: stats.total, urgent: stats.urgent, fallback: stats.fallback }))
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub message: String,
}

/// Queues every current `FALLBACK` record for reconciliation
/// immediately, ahead of the scheduler's own cadence. Fire-and-forget:
/// the response returns as soon as the batch is queued.
pub async fn force_reconciliation(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ReconcileResponse>> {
    let items = state.store.fallback_for_reconciliation(i64::MAX).await?;
    let count = items.len();

    let worker = Arc::clone(&state.reconciliation_worker);
    tokio::spawn(async move {
        for item in items {
            if let Err(e) = worker.reconcile(item.id).await {
                tracing::error!(feedback_id = %item.id, error = %e, "manual reconcile failed");
            }
        }
    });

    Ok(Json(ReconcileResponse { message: format!("Queued {count} items.") }))
}

pub async fn review_queue(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Feedback>>> {
    Ok(Json(state.store.needs_review().await?))
}

pub async fn review_queue_csv(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let rows = state.store.needs_review().await?;

    let mut writer = csv::Writer::from_writer(vec![]);
    writer
        .write_record(["ID", "Sentiment", "Urgent", "Dept", "Source", "Content"])
        .map_err(|e| anyhow::anyhow!(e))?;
    for row in &rows {
        writer
            .write_record([
                row.id.to_string(),
                row.sentiment.as_str().to_string(),
                row.is_urgent.to_string(),
                row.department.as_str().to_string(),
                row.source.as_str().to_string(),
                row.raw_content.clone(),
            ])
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    let csv_bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=review_queue.csv"),
        ],
        csv_bytes,
    ))
}
