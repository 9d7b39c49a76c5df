//! Dedup-by-content-hash and the serialized write gate. Reads bypass
//! the gate entirely (WAL mode permits concurrent readers during a
//! writer's commit); every mutating statement is taken while holding
//! the gate.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    AiProvider, AnalysisSource, Department, Feedback, Priority, ReconciliationEvent, Sentiment,
    TicketStatus,
};

pub fn content_hash(sanitized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sanitized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Builds a classified-but-unpersisted `Feedback` row: pure, no I/O.
/// Used by both [`FeedbackStore::insert`] and the CSV batch path in
/// `IngestionPipeline`, which prepares rows ahead of a batched commit.
pub fn build_feedback(
    raw_content: String,
    content_hash: String,
    sentiment: Sentiment,
    topics: Vec<String>,
    is_urgent: bool,
    confidence_score: f64,
    source: AnalysisSource,
    ai_provider: AiProvider,
    department: Department,
) -> Feedback {
    let now = Utc::now();
    Feedback {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        raw_content,
        content_hash,
        sentiment,
        topics,
        is_urgent,
        confidence_score,
        source,
        ai_provider,
        department,
        status: TicketStatus::Open,
        priority: Priority::Medium,
        resolution_note: None,
        needs_review: false,
        resolved_at: None,
    }
}

const INSERT_SQL: &str = r#"
    INSERT INTO feedback (
        id, created_at, updated_at, raw_content, content_hash, sentiment,
        topics, is_urgent, confidence_score, source, ai_provider, department,
        status, priority, resolution_note, needs_review, resolved_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#;

/// Binds one `Feedback` row's columns onto the `INSERT_SQL` statement,
/// shared by the single-row and batched insert paths.
macro_rules! bind_insert {
    ($feedback:expr) => {
        sqlx::query(INSERT_SQL)
            .bind($feedback.id.to_string())
            .bind($feedback.created_at.to_rfc3339())
            .bind($feedback.updated_at.to_rfc3339())
            .bind(&$feedback.raw_content)
            .bind(&$feedback.content_hash)
            .bind($feedback.sentiment.as_str())
            .bind(serde_json::to_string(&$feedback.topics).expect("topics always serialize"))
            .bind($feedback.is_urgent)
            .bind($feedback.confidence_score)
            .bind($feedback.source.as_str())
            .bind($feedback.ai_provider.as_str())
            .bind($feedback.department.as_str())
            .bind($feedback.status.as_str())
            .bind($feedback.priority.as_str())
            .bind(&$feedback.resolution_note)
            .bind($feedback.needs_review)
            .bind($feedback.resolved_at.map(|t| t.to_rfc3339()))
    };
}

/// Outcome of a persist attempt: either a freshly stored row, or an
/// existing one found via the dedup pre-check / unique-conflict
/// fallback re-read.
pub enum PersistOutcome {
    Created(Feedback),
    Duplicate(Feedback),
}

pub struct FeedbackStore {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

impl FeedbackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, write_gate: Arc::new(Mutex::new(())) }
    }

    pub async fn find_by_content_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Feedback>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM feedback WHERE content_hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_feedback(&r)))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Feedback>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM feedback WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_feedback(&r)))
    }

    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Feedback>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM feedback ORDER BY created_at DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_feedback).collect())
    }

    pub async fn needs_review(&self) -> Result<Vec<Feedback>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM feedback WHERE needs_review = 1 ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_feedback).collect())
    }

    pub async fn fallback_for_reconciliation(
        &self,
        limit: i64,
    ) -> Result<Vec<Feedback>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM feedback WHERE source = 'FALLBACK' ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_feedback).collect())
    }

    pub async fn stats(&self) -> Result<FeedbackStats, sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
            .fetch_one(&self.pool)
            .await?;
        let urgent: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE is_urgent = 1")
                .fetch_one(&self.pool)
                .await?;
        let fallback: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE source = 'FALLBACK'")
                .fetch_one(&self.pool)
                .await?;
        Ok(FeedbackStats { total, urgent, fallback })
    }

    /// Inserts a newly classified row, gated, with a unique-conflict
    /// fallback re-read per spec.md §4.D's dedup protocol.
    pub async fn insert(
        &self,
        raw_content: String,
        content_hash: String,
        sentiment: Sentiment,
        topics: Vec<String>,
        is_urgent: bool,
        confidence_score: f64,
        source: AnalysisSource,
        ai_provider: AiProvider,
        department: Department,
    ) -> Result<PersistOutcome, sqlx::Error> {
        let feedback = build_feedback(
            raw_content,
            content_hash.clone(),
            sentiment,
            topics,
            is_urgent,
            confidence_score,
            source,
            ai_provider,
            department,
        );

        let _guard = self.write_gate.lock().await;

        let result = bind_insert!(feedback).execute(&self.pool).await;

        match result {
            Ok(_) => Ok(PersistOutcome::Created(feedback)),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                drop(_guard);
                let existing = self
                    .find_by_content_hash(&content_hash)
                    .await?
                    .expect("unique violation implies a conflicting row exists");
                Ok(PersistOutcome::Duplicate(existing))
            },
            Err(e) => Err(e),
        }
    }

    /// Inserts a batch of already-classified rows under a single
    /// transaction and a single write-gate hold, so the whole batch
    /// commits (or, on a hard error, rolls back) together — one commit
    /// per batch rather than one per row, matching
    /// `workers.py::process_csv_worker`'s batching of CSV ingestion.
    /// A per-row unique-conflict still resolves to a `Duplicate`
    /// outcome for that row rather than failing the batch, preserving
    /// the same dedup semantics as [`Self::insert`].
    pub async fn insert_batch(
        &self,
        feedbacks: Vec<Feedback>,
    ) -> Result<Vec<PersistOutcome>, sqlx::Error> {
        if feedbacks.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(feedbacks.len());

        for feedback in feedbacks {
            let result = bind_insert!(feedback).execute(&mut *tx).await;

            match result {
                Ok(_) => outcomes.push(PersistOutcome::Created(feedback)),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    let row = sqlx::query("SELECT * FROM feedback WHERE content_hash = ?")
                        .bind(&feedback.content_hash)
                        .fetch_optional(&mut *tx)
                        .await?;
                    let existing = row
                        .map(|r| row_to_feedback(&r))
                        .expect("unique violation implies a conflicting row exists");
                    outcomes.push(PersistOutcome::Duplicate(existing));
                },
                Err(e) => return Err(e),
            }
        }

        tx.commit().await?;
        Ok(outcomes)
    }

    /// Reconciliation write: only applied if the row is still
    /// `FALLBACK` (aborts if it was resolved or already upgraded in
    /// the interim), per spec.md §4.F.
    pub async fn apply_reconciliation(
        &self,
        id: Uuid,
        sentiment: Sentiment,
        topics: &[String],
        is_urgent: bool,
        department: Department,
        ai_provider: AiProvider,
        needs_review: bool,
    ) -> Result<bool, sqlx::Error> {
        let _guard = self.write_gate.lock().await;

        let result = sqlx::query(
            r#"
            UPDATE feedback
            SET sentiment = ?, topics = ?, is_urgent = ?, source = 'AI',
                ai_provider = ?, department = ?, needs_review = ?, updated_at = ?
            WHERE id = ? AND source = 'FALLBACK' AND status != 'RESOLVED'
            "#,
        )
        .bind(sentiment.as_str())
        .bind(serde_json::to_string(topics).expect("topics always serialize"))
        .bind(is_urgent)
        .bind(ai_provider.as_str())
        .bind(department.as_str())
        .bind(needs_review)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn record_reconciliation_event(
        &self,
        feedback_id: Uuid,
        previous_source: AnalysisSource,
        previous_sentiment: Sentiment,
        previous_is_urgent: bool,
        new_sentiment: Sentiment,
        new_is_urgent: bool,
        drift_detected: bool,
    ) -> Result<(), sqlx::Error> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO reconciliation_events (
                feedback_id, previous_source, previous_sentiment, previous_is_urgent,
                new_sentiment, new_is_urgent, drift_detected, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(feedback_id.to_string())
        .bind(previous_source.as_str())
        .bind(previous_sentiment.as_str())
        .bind(previous_is_urgent)
        .bind(new_sentiment.as_str())
        .bind(new_is_urgent)
        .bind(drift_detected)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn resolve(
        &self,
        id: Uuid,
        note: Option<String>,
    ) -> Result<Option<Feedback>, sqlx::Error> {
        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(
            r#"
            UPDATE feedback
            SET status = 'RESOLVED', needs_review = 0, resolution_note = ?,
                resolved_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&note)
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        drop(_guard);
        self.find_by_id(id).await
    }

    pub async fn reconciliation_events_for(
        &self,
        feedback_id: Uuid,
    ) -> Result<Vec<ReconciliationEvent>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM reconciliation_events WHERE feedback_id = ? ORDER BY created_at DESC",
        )
        .bind(feedback_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_event).collect())
    }
}

pub struct FeedbackStats {
    pub total: i64,
    pub urgent: i64,
    pub fallback: i64,
}

fn row_to_feedback(row: &sqlx::sqlite::SqliteRow) -> Feedback {
    let topics_json: String = row.get("topics");
    let resolution_note: Option<String> = row.get("resolution_note");
    let resolved_at: Option<String> = row.get("resolved_at");

    Feedback {
        id: Uuid::parse_str(&row.get::<String, _>("id")).expect("stored id is always a valid uuid"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
        raw_content: row.get("raw_content"),
        content_hash: row.get("content_hash"),
        sentiment: Sentiment::parse_lenient(&row.get::<String, _>("sentiment")),
        topics: serde_json::from_str(&topics_json).unwrap_or_default(),
        is_urgent: row.get("is_urgent"),
        confidence_score: row.get("confidence_score"),
        source: AnalysisSource::parse(&row.get::<String, _>("source"))
            .unwrap_or(AnalysisSource::Fallback),
        ai_provider: AiProvider::parse(&row.get::<String, _>("ai_provider")),
        department: Department::parse(&row.get::<String, _>("department")),
        status: TicketStatus::parse(&row.get::<String, _>("status")),
        priority: Priority::parse(&row.get::<String, _>("priority")),
        resolution_note,
        needs_review: row.get("needs_review"),
        resolved_at: resolved_at.as_deref().map(parse_timestamp),
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> ReconciliationEvent {
    ReconciliationEvent {
        id: row.get("id"),
        feedback_id: Uuid::parse_str(&row.get::<String, _>("feedback_id"))
            .expect("stored feedback_id is always a valid uuid"),
        previous_source: AnalysisSource::parse(&row.get::<String, _>("previous_source"))
            .unwrap_or(AnalysisSource::Fallback),
        previous_sentiment: Sentiment::parse_lenient(&row.get::<String, _>("previous_sentiment")),
        previous_is_urgent: row.get("previous_is_urgent"),
        new_sentiment: Sentiment::parse_lenient(&row.get::<String, _>("new_sentiment")),
        new_is_urgent: row.get("new_is_urgent"),
        drift_detected: row.get("drift_detected"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = crate::db::create_pool("sqlite::memory:").await.unwrap();
        pool
    }

    #[tokio::test]
    async fn dedup_pre_check_finds_existing_row() {
        let pool = test_pool().await;
        let store = FeedbackStore::new(pool);
        let hash = content_hash("hello world");

        let outcome = store
            .insert(
                "hello world".to_string(),
                hash.clone(),
                Sentiment::Neutral,
                vec!["General".to_string()],
                false,
                0.5,
                AnalysisSource::Fallback,
                AiProvider::Heuristic,
                Department::Support,
            )
            .await
            .unwrap();
        let id = match outcome {
            PersistOutcome::Created(f) => f.id,
            PersistOutcome::Duplicate(_) => panic!("expected a fresh insert"),
        };

        let found = store.find_by_content_hash(&hash).await.unwrap().unwrap();
        assert_eq!(found.id, id);
    }

    #[tokio::test]
    async fn unique_violation_on_insert_returns_existing_row() {
        let pool = test_pool().await;
        let store = FeedbackStore::new(pool);
        let hash = content_hash("duplicate text");

        store
            .insert(
                "duplicate text".to_string(),
                hash.clone(),
                Sentiment::Neutral,
                vec!["General".to_string()],
                false,
                0.5,
                AnalysisSource::Fallback,
                AiProvider::Heuristic,
                Department::Support,
            )
            .await
            .unwrap();

        let second = store
            .insert(
                "duplicate text".to_string(),
                hash,
                Sentiment::Positive,
                vec!["General".to_string()],
                false,
                0.5,
                AnalysisSource::Fallback,
                AiProvider::Heuristic,
                Department::Support,
            )
            .await
            .unwrap();

        assert!(matches!(second, PersistOutcome::Duplicate(_)));
    }

    #[tokio::test]
    async fn reconciliation_write_aborts_if_already_resolved() {
        let pool = test_pool().await;
        let store = FeedbackStore::new(pool);
        let hash = content_hash("resolved already");

        let feedback = match store
            .insert(
                "resolved already".to_string(),
                hash,
                Sentiment::Negative,
                vec!["Technical".to_string()],
                false,
                0.5,
                AnalysisSource::Fallback,
                AiProvider::Heuristic,
                Department::Engineering,
            )
            .await
            .unwrap()
        {
            PersistOutcome::Created(f) => f,
            _ => unreachable!(),
        };

        store.resolve(feedback.id, None).await.unwrap();

        let applied = store
            .apply_reconciliation(
                feedback.id,
                Sentiment::Negative,
                &["Technical".to_string()],
                true,
                Department::Engineering,
                AiProvider::PrimaryLlm,
                true,
            )
            .await
            .unwrap();

        assert!(!applied, "reconciliation must not overwrite a resolved row");
    }
}
