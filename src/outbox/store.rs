use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryError;
use super::message::OutboxMessage;

/// Relay-side view of the outbox table. Rows are written by the command
/// repositories; the relay only reads and marks them.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest first: neither published nor dead-lettered.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, RepositoryError>;

    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Bump the attempt counter and return its new value.
    async fn record_failure(&self, id: Uuid, error: &str) -> Result<i32, RepositoryError>;

    async fn mark_dead_lettered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// The subset of `aggregate_ids` with at least one dead-lettered message.
    async fn dead_lettered_aggregates(&self, aggregate_ids: &[Uuid]) -> Result<HashSet<Uuid>, RepositoryError>;
}
