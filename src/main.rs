use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, patch, post},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aegis_feedback::config::Config;
use aegis_feedback::db;
use aegis_feedback::handlers;
use aegis_feedback::services::{
    start_reconciliation_scheduler, AlertNotifier, FeedbackStore, IngestionPipeline, LlmClient,
    RaceOrchestrator, ReconciliationWorker,
};
use aegis_feedback::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("aegis-feedback.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
        // _guard is intentionally leaked: it must live for the process
        // lifetime to keep flushing the non-blocking writer.
        std::mem::forget(_guard);
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Aegis Feedback starting up");
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database pool created and schema ensured");

    let store = Arc::new(FeedbackStore::new(pool.clone()));
    let llm = Arc::new(LlmClient::new(&config.llm));
    let orchestrator = Arc::new(RaceOrchestrator::new(
        Arc::clone(&llm),
        config.llm.max_concurrent_calls,
        Duration::from_millis(config.llm.ai_deadline_ms),
    ));
    let alert = Arc::new(AlertNotifier::new(config.alert.webhook_url.clone()));
    let ingestion =
        Arc::new(IngestionPipeline::new(Arc::clone(&store), orchestrator, Arc::clone(&alert)));
    let reconciliation_worker =
        Arc::new(ReconciliationWorker::new(Arc::clone(&store), Arc::clone(&llm)));

    let scheduler_shutdown = start_reconciliation_scheduler(
        Arc::clone(&store),
        Arc::clone(&reconciliation_worker),
        &config.scheduler,
    );
    tracing::info!(
        idle_interval_secs = config.scheduler.idle_interval_secs,
        batch_size = config.scheduler.batch_size,
        "reconciliation scheduler started"
    );

    let app_state = Arc::new(AppState { db: pool, store, ingestion, reconciliation_worker });

    let app = Router::new()
        .route("/feedback", post(handlers::feedback::ingest_feedback))
        .route("/feedback", get(handlers::feedback::list_feedback))
        .route("/feedback/batch_csv", post(handlers::feedback::batch_csv_upload))
        .route("/feedback/:id", get(handlers::feedback::get_feedback))
        .route("/feedback/:id/resolve", patch(handlers::feedback::resolve_feedback))
        .route("/admin/stats", get(handlers::admin::get_stats))
        .route("/admin/reconcile", post(handlers::admin::force_reconciliation))
        .route("/admin/reviews", get(handlers::admin::review_queue))
        .route("/admin/reviews/csv", get(handlers::admin::review_queue_csv))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::ready_check))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Aegis Feedback is ready to serve requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler_shutdown))
        .await?;

    Ok(())
}

/// Waits for a process-termination signal, then flips the scheduler's
/// cancellation flag so the reconciliation sweep stops picking up new
/// work and returns within one in-flight record, per spec.md §4.G.
async fn shutdown_signal(scheduler_shutdown: Arc<std::sync::atomic::AtomicBool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping reconciliation scheduler");
    scheduler_shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
}
