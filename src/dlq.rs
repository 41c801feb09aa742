use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryError;

// ============================================================================
// Dead Letter Queue
// ============================================================================
//
// Terminal parking lot for messages that could not be handled:
// - relay: outbox messages the broker kept rejecting
// - projection: events a projector could not apply (bad payload, unknown
//   status, read store failures that outlived the retries)
//
// Rows are kept for manual inspection and replay.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadLetterSource {
    Relay,
    Projection,
}

impl DeadLetterSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterSource::Relay => "relay",
            DeadLetterSource::Projection => "projection",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "relay" => Some(DeadLetterSource::Relay),
            "projection" => Some(DeadLetterSource::Projection),
            _ => None,
        }
    }
}

impl fmt::Display for DeadLetterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub id: Uuid,
    pub source: DeadLetterSource,
    /// Missing when the payload was too broken to tell
    pub aggregate_id: Option<Uuid>,
    pub event_type: String,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// A message that failed once and is parked straight away.
    pub fn single_failure(
        source: DeadLetterSource,
        aggregate_id: Option<Uuid>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
        error_message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            source,
            aggregate_id,
            event_type: event_type.into(),
            payload: payload.into(),
            error_message: error_message.into(),
            failure_count: 1,
            first_failed_at: at,
            last_failed_at: at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DlqStats {
    pub total_messages: i64,
    pub by_event_type: HashMap<String, i64>,
}

impl DlqStats {
    pub fn from_letters<'a>(letters: impl IntoIterator<Item = &'a DeadLetter>) -> Self {
        let mut stats = DlqStats::default();
        for letter in letters {
            stats.total_messages += 1;
            *stats.by_event_type.entry(letter.event_type.clone()).or_insert(0) += 1;
        }
        stats
    }
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn add(&self, letter: &DeadLetter) -> Result<(), RepositoryError>;

    /// Most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>, RepositoryError>;

    async fn stats(&self) -> Result<DlqStats, RepositoryError>;
}
