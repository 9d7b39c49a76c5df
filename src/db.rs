//! Pool creation and schema bootstrap. No `migrations/` directory is
//! used, matching the teacher's pattern of ensuring schema in code at
//! startup rather than through `sqlx::migrate!`.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub async fn create_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await?;

    bootstrap_schema(&pool).await?;

    Ok(pool)
}

async fn bootstrap_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id              TEXT PRIMARY KEY,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            raw_content     TEXT NOT NULL,
            content_hash    TEXT NOT NULL,
            sentiment       TEXT NOT NULL,
            topics          TEXT NOT NULL,
            is_urgent       INTEGER NOT NULL,
            confidence_score REAL NOT NULL,
            source          TEXT NOT NULL,
            ai_provider     TEXT NOT NULL,
            department      TEXT NOT NULL,
            status          TEXT NOT NULL,
            priority        TEXT NOT NULL,
            resolution_note TEXT,
            needs_review    INTEGER NOT NULL DEFAULT 0,
            resolved_at     TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_feedback_content_hash ON feedback(content_hash)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_source ON feedback(source, created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_feedback_needs_review ON feedback(needs_review)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reconciliation_events (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            feedback_id             TEXT NOT NULL,
            previous_source         TEXT NOT NULL,
            previous_sentiment      TEXT NOT NULL,
            previous_is_urgent      INTEGER NOT NULL,
            new_sentiment           TEXT NOT NULL,
            new_is_urgent           INTEGER NOT NULL,
            drift_detected          INTEGER NOT NULL,
            created_at              TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_reconciliation_feedback ON reconciliation_events(feedback_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
