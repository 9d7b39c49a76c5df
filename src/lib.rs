//! Aegis Feedback Library
//!
//! Core modules for the hybrid feedback classification service: the
//! heuristic analyzer, the LLM client, the race orchestrator, the
//! dedup/write-gated store, the ingestion pipeline, and the background
//! reconciliation scheduler.

use std::sync::Arc;

use sqlx::SqlitePool;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::{
    AlertNotifier, FeedbackStore, IngestionPipeline, LlmClient, RaceOrchestrator,
    ReconciliationWorker,
};

/// Application shared state. All services are wrapped in `Arc` for
/// cheap cloning across request handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub store: Arc<FeedbackStore>,
    pub ingestion: Arc<IngestionPipeline>,
    pub reconciliation_worker: Arc<ReconciliationWorker>,
}
