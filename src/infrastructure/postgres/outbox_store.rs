use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::outbox::{OutboxMessage, OutboxStore};

/// Write one outbox row on the caller's transaction.
pub(crate) async fn insert_outbox(conn: &mut PgConnection, message: &OutboxMessage) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO outbox_messages (
            id, aggregate_id, aggregate_type, event_id, event_type,
            topic, partition_key, payload, created_at, attempts
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(message.id)
    .bind(message.aggregate_id)
    .bind(&message.aggregate_type)
    .bind(message.event_id)
    .bind(&message.event_type)
    .bind(&message.topic)
    .bind(&message.partition_key)
    .bind(&message.payload)
    .bind(message.created_at)
    .bind(message.attempts)
    .execute(conn)
    .await?;

    Ok(())
}

pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_message(row: &PgRow) -> Result<OutboxMessage, RepositoryError> {
        Ok(OutboxMessage {
            id: row.try_get("id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            topic: row.try_get("topic")?,
            partition_key: row.try_get("partition_key")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
            published_at: row.try_get("published_at")?,
            dead_lettered_at: row.try_get("dead_lettered_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, aggregate_id, aggregate_type, event_id, event_type, topic,
                   partition_key, payload, created_at, attempts, last_error,
                   published_at, dead_lettered_at
            FROM outbox_messages
            WHERE published_at IS NULL AND dead_lettered_at IS NULL
            ORDER BY seq
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE outbox_messages SET published_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<i32, RepositoryError> {
        let attempts: Option<(i32,)> = sqlx::query_as(
            "UPDATE outbox_messages SET attempts = attempts + 1, last_error = $2 WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        attempts.map(|(n,)| n).ok_or(RepositoryError::NotFound(id))
    }

    async fn mark_dead_lettered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE outbox_messages SET dead_lettered_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }

    async fn dead_lettered_aggregates(&self, aggregate_ids: &[Uuid]) -> Result<HashSet<Uuid>, RepositoryError> {
        if aggregate_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT aggregate_id
            FROM outbox_messages
            WHERE dead_lettered_at IS NOT NULL AND aggregate_id = ANY($1)
            "#,
        )
        .bind(aggregate_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
