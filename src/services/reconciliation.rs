//! Upgrades `FALLBACK` records to `AI` quality by re-classifying them
//! through the LLM without the race deadline, per spec.md §4.F.

use std::sync::Arc;

use uuid::Uuid;

use crate::models::AnalysisSource;
use crate::services::heuristic;
use crate::services::llm::LlmClient;
use crate::services::store::FeedbackStore;

pub struct ReconciliationWorker {
    store: Arc<FeedbackStore>,
    llm: Arc<LlmClient>,
}

impl ReconciliationWorker {
    pub fn new(store: Arc<FeedbackStore>, llm: Arc<LlmClient>) -> Self {
        Self { store, llm }
    }

    /// Re-classifies a single fallback-labeled record and upgrades it
    /// to `AI` quality if it still qualifies. Idempotent: running it
    /// on an already-`AI` row is a no-op.
    pub async fn reconcile(&self, id: Uuid) -> anyhow::Result<()> {
        // 1. Snapshot read.
        let Some(snapshot) = self.store.find_by_id(id).await? else {
            return Ok(());
        };
        if snapshot.source != AnalysisSource::Fallback {
            return Ok(());
        }

        // 2. Slow re-classify, unthrottled by the race deadline.
        let clean_text = crate::services::ingestion::sanitize(&snapshot.raw_content);
        let (ai_result, provider) = match self.llm.classify(&clean_text).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(feedback_id = %id, error = %e, "reconcile failed");
                return Ok(());
            },
        };

        // 3. Live re-read immediately before the gated write: the
        // snapshot from step 1 may be stale after the slow re-classify
        // above, and drift must be evaluated against the row as it is
        // right now, not as it was when the sweep picked it up.
        let Some(live) = self.store.find_by_id(id).await? else {
            return Ok(());
        };
        if live.source != AnalysisSource::Fallback {
            tracing::debug!(feedback_id = %id, "reconcile aborted, record no longer fallback");
            return Ok(());
        }

        let missed_urgency = ai_result.is_urgent && !live.is_urgent;
        let sentiment_mismatch = live.sentiment != ai_result.sentiment;
        let needs_review = missed_urgency || (sentiment_mismatch && ai_result.is_urgent);

        let department = heuristic::resolve_department(&ai_result.topics);

        // 4. Write under the gate; aborts internally if the record was
        // resolved in the interim (step 5).
        let applied = self
            .store
            .apply_reconciliation(
                id,
                ai_result.sentiment,
                &ai_result.topics,
                ai_result.is_urgent,
                department,
                provider,
                needs_review,
            )
            .await?;

        if applied {
            self.store
                .record_reconciliation_event(
                    id,
                    live.source,
                    live.sentiment,
                    live.is_urgent,
                    ai_result.sentiment,
                    ai_result.is_urgent,
                    missed_urgency || sentiment_mismatch,
                )
                .await?;

            if missed_urgency {
                tracing::info!(feedback_id = %id, "reconcile found missed urgency");
            }
        } else {
            tracing::debug!(feedback_id = %id, "reconcile aborted, record already resolved");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::models::{AiProvider, Department, Sentiment};
    use crate::services::store::PersistOutcome;

    fn mock_config() -> LlmConfig {
        LlmConfig {
            mock_mode: true,
            primary_api_base: String::new(),
            primary_api_key: None,
            primary_model: String::new(),
            secondary_api_base: None,
            secondary_api_key: None,
            secondary_model: None,
            ai_deadline_ms: 2000,
            max_concurrent_calls: 50,
        }
    }

    #[tokio::test]
    async fn reconcile_upgrades_a_fallback_row_to_ai() {
        let pool = crate::db::create_pool("sqlite::memory:").await.unwrap();
        let store = Arc::new(FeedbackStore::new(pool));
        let llm = Arc::new(LlmClient::new(&mock_config()));
        let worker = ReconciliationWorker::new(Arc::clone(&store), llm);

        let feedback = match store
            .insert(
                "This is wonderful, thank you so much!".to_string(),
                crate::services::store::content_hash("this is wonderful, thank you so much!"),
                Sentiment::Neutral,
                vec!["General".to_string()],
                false,
                0.5,
                AnalysisSource::Fallback,
                AiProvider::Heuristic,
                Department::Support,
            )
            .await
            .unwrap()
        {
            PersistOutcome::Created(f) => f,
            _ => unreachable!(),
        };

        worker.reconcile(feedback.id).await.unwrap();

        let updated = store.find_by_id(feedback.id).await.unwrap().unwrap();
        assert_eq!(updated.source, AnalysisSource::Ai);
        assert_eq!(updated.ai_provider, AiProvider::Mock);
    }

    #[tokio::test]
    async fn reconcile_is_a_no_op_on_an_already_ai_row() {
        let pool = crate::db::create_pool("sqlite::memory:").await.unwrap();
        let store = Arc::new(FeedbackStore::new(pool));
        let llm = Arc::new(LlmClient::new(&mock_config()));
        let worker = ReconciliationWorker::new(Arc::clone(&store), llm);

        let feedback = match store
            .insert(
                "Already AI-classified".to_string(),
                crate::services::store::content_hash("already ai-classified"),
                Sentiment::Neutral,
                vec!["General".to_string()],
                false,
                0.99,
                AnalysisSource::Ai,
                AiProvider::PrimaryLlm,
                Department::Support,
            )
            .await
            .unwrap()
        {
            PersistOutcome::Created(f) => f,
            _ => unreachable!(),
        };

        worker.reconcile(feedback.id).await.unwrap();

        let unchanged = store.find_by_id(feedback.id).await.unwrap().unwrap();
        assert_eq!(unchanged.ai_provider, AiProvider::PrimaryLlm);
    }
}
