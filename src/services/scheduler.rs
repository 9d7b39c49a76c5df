//! Periodic sweep that drives reconciliation over `FALLBACK` records,
//! per spec.md §4.G. Built on the same `ScheduledExecutor` framework
//! used elsewhere in this codebase for periodic background work.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::services::reconciliation::ReconciliationWorker;
use crate::services::store::FeedbackStore;
use crate::utils::scheduled_executor::{ScheduledExecutor, ScheduledTask};

pub struct ReconciliationSchedulerTask {
    store: Arc<FeedbackStore>,
    worker: Arc<ReconciliationWorker>,
    batch_size: i64,
    gap: Duration,
    error_backoff: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ReconciliationSchedulerTask {
    pub fn new(
        store: Arc<FeedbackStore>,
        worker: Arc<ReconciliationWorker>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            worker,
            batch_size: config.batch_size,
            gap: Duration::from_secs(config.gap_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    async fn sweep(&self) -> Result<(), anyhow::Error> {
        let batch = self.store.fallback_for_reconciliation(self.batch_size).await?;

        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = batch.len(), "reconciliation sweep found fallback records");

        for (i, record) in batch.iter().enumerate() {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            if let Err(e) = self.worker.reconcile(record.id).await {
                tracing::error!(feedback_id = %record.id, error = %e, "reconciliation worker error");
            }
            if i + 1 < batch.len() {
                tokio::time::sleep(self.gap).await;
            }
        }

        Ok(())
    }
}

impl ScheduledTask for ReconciliationSchedulerTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            if let Err(e) = self.sweep().await {
                tracing::error!(error = %e, "reconciliation sweep failed, backing off");
                tokio::time::sleep(self.error_backoff).await;
            }
            Ok(())
        })
    }

    fn should_terminate(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// Spawns the reconciliation sweep on the `ScheduledExecutor` loop and
/// returns its shutdown handle.
pub fn start_reconciliation_scheduler(
    store: Arc<FeedbackStore>,
    worker: Arc<ReconciliationWorker>,
    config: &SchedulerConfig,
) -> Arc<AtomicBool> {
    let task = ReconciliationSchedulerTask::new(store, worker, config);
    let shutdown_handle = task.shutdown_handle();

    let executor = ScheduledExecutor::new(
        "reconciliation-sweep",
        Duration::from_secs(config.idle_interval_secs),
    );

    tokio::spawn(async move {
        executor.start(task).await;
    });

    shutdown_handle
}
