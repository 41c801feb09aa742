use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::dlq::{DeadLetter, DeadLetterSource, DeadLetterStore, DlqStats};
use crate::errors::RepositoryError;

pub struct PgDeadLetterStore {
    pool: PgPool,
}

impl PgDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn add(&self, letter: &DeadLetter) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO dead_letter_queue (
                id, source, aggregate_id, event_type, payload,
                error_message, failure_count, first_failed_at, last_failed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(letter.id)
        .bind(letter.source.as_str())
        .bind(letter.aggregate_id)
        .bind(&letter.event_type)
        .bind(&letter.payload)
        .bind(&letter.error_message)
        .bind(letter.failure_count)
        .bind(letter.first_failed_at)
        .bind(letter.last_failed_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(dead_letter_id = %letter.id, source = %letter.source, "Message stored in DLQ");
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, aggregate_id, event_type, payload, error_message,
                   failure_count, first_failed_at, last_failed_at
            FROM dead_letter_queue
            ORDER BY last_failed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut letters = Vec::with_capacity(rows.len());
        for row in rows {
            let source: String = row.try_get("source")?;
            letters.push(DeadLetter {
                id: row.try_get("id")?,
                source: DeadLetterSource::parse(&source)
                    .ok_or_else(|| anyhow!("Unknown dead letter source '{source}'"))?,
                aggregate_id: row.try_get("aggregate_id")?,
                event_type: row.try_get("event_type")?,
                payload: row.try_get("payload")?,
                error_message: row.try_get("error_message")?,
                failure_count: row.try_get("failure_count")?,
                first_failed_at: row.try_get("first_failed_at")?,
                last_failed_at: row.try_get("last_failed_at")?,
            });
        }
        Ok(letters)
    }

    async fn stats(&self) -> Result<DlqStats, RepositoryError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT event_type, COUNT(*) FROM dead_letter_queue GROUP BY event_type")
                .fetch_all(&self.pool)
                .await?;

        let by_event_type: HashMap<String, i64> = rows.into_iter().collect();
        Ok(DlqStats {
            total_messages: by_event_type.values().sum(),
            by_event_type,
        })
    }
}
