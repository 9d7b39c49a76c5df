//! Liveness/readiness probes. `/ready` touches the pool so a wedged
//! database is visible to orchestration tooling before it reaches the
//! ingestion path.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;

use crate::AppState;

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn ready_check(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => (StatusCode::OK, "READY"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT READY"),
    }
}
