use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::dlq::{DeadLetter, DeadLetterSource, DeadLetterStore};
use crate::domain::common::Clock;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};
use super::{ProjectionError, ProjectionHandler, ProjectionOutcome};

// ============================================================================
// Projection Runner
// ============================================================================
//
// Sits between a topic consumer and a projector. Read-store failures are
// retried with backoff; anything still failing afterwards, and every
// permanent failure, is logged, counted and dead-lettered so the consumer
// can commit and move on.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Applied(ProjectionOutcome),
    DeadLettered { reason: &'static str },
}

pub struct ProjectionRunner {
    handler: Arc<dyn ProjectionHandler>,
    dead_letters: Arc<dyn DeadLetterStore>,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
}

impl ProjectionRunner {
    pub fn new(
        handler: Arc<dyn ProjectionHandler>,
        dead_letters: Arc<dyn DeadLetterStore>,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            handler,
            dead_letters,
            metrics,
            clock,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn aggregate(&self) -> &'static str {
        self.handler.aggregate()
    }

    /// Handle one payload. Never fails: whatever cannot be applied ends up
    /// in the dead-letter store.
    pub async fn process(&self, payload: &str) -> RunOutcome {
        let aggregate = self.handler.aggregate();
        let operation = format!("project_{}", aggregate.to_lowercase());
        let started = Instant::now();

        let result = retry_on_transient(&operation, &self.retry, |attempt| {
            if attempt > 1 {
                self.metrics.record_retry_attempt(&operation, attempt);
            }
            self.handler.handle(payload)
        })
        .await;

        if result.attempts() > 1 {
            self.metrics
                .record_retry_outcome(&operation, matches!(result, RetryResult::Success { .. }));
        }

        let elapsed = started.elapsed().as_secs_f64();
        match result.into_result() {
            Ok(outcome) => {
                self.metrics.record_projection(aggregate, outcome.as_str(), elapsed);
                tracing::debug!(aggregate, outcome = outcome.as_str(), "Event projected");
                RunOutcome::Applied(outcome)
            }
            Err(error) => {
                self.metrics.record_projection_failure(aggregate, error.reason(), elapsed);
                self.dead_letter(payload, &error).await;
                RunOutcome::DeadLettered { reason: error.reason() }
            }
        }
    }

    async fn dead_letter(&self, payload: &str, error: &ProjectionError) {
        let (aggregate_id, event_type) = envelope_identity(payload);
        tracing::error!(
            aggregate = self.handler.aggregate(),
            aggregate_id = ?aggregate_id,
            event_type = %event_type,
            error = %error,
            "Projection failed, sending event to DLQ"
        );

        let letter = DeadLetter::single_failure(
            DeadLetterSource::Projection,
            aggregate_id,
            event_type.clone(),
            payload,
            error.to_string(),
            self.clock.now(),
        );

        match self.dead_letters.add(&letter).await {
            Ok(()) => self
                .metrics
                .record_dlq_message(DeadLetterSource::Projection.as_str(), &event_type),
            Err(e) => {
                self.metrics.record_consistency_failure("projection_dlq");
                tracing::error!(error = %e, event_type = %event_type, "Failed to store dead letter");
            }
        }
    }
}

/// Best-effort extraction of routing fields from a payload that may not
/// even be valid JSON.
fn envelope_identity(payload: &str) -> (Option<Uuid>, String) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return (None, "unknown".to_string());
    };

    let aggregate_id = value
        .get("aggregate_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    let event_type = value
        .get("event_type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    (aggregate_id, event_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Account, AccountEvent};
    use crate::domain::common::{FixedClock, Money};
    use crate::events::{serialize_event, EventEnvelope};
    use crate::infrastructure::memory::{InMemoryAccountReadRepository, InMemoryDeadLetterStore};
    use crate::projection::AccountProjector;
    use crate::read_model::AccountReadRepository;
    use chrono::Utc;

    struct Fixture {
        reads: Arc<InMemoryAccountReadRepository>,
        dead_letters: Arc<InMemoryDeadLetterStore>,
        metrics: Arc<Metrics>,
        runner: ProjectionRunner,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let reads = Arc::new(InMemoryAccountReadRepository::new());
        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let runner = ProjectionRunner::new(
            Arc::new(AccountProjector::new(reads.clone())),
            dead_letters.clone(),
            metrics.clone(),
            clock.clone(),
        )
        .with_retry(RetryConfig::immediate(3));
        Fixture { reads, dead_letters, metrics, runner, clock }
    }

    fn created_payload(clock: &FixedClock, status: Option<&str>) -> (Uuid, String) {
        let account = Account::open(Uuid::new_v4(), Money::parse("42.10", "USD").unwrap(), clock).unwrap();
        let mut event = AccountEvent::created(&account);
        if let (Some(status), AccountEvent::Created(created)) = (status, &mut event) {
            created.status = status.to_string();
        }
        let envelope = EventEnvelope::new(account.id(), 1, event, Uuid::new_v4(), account.created_at());
        (account.id(), serialize_event(&envelope).unwrap())
    }

    #[tokio::test]
    async fn test_applied_events_are_counted() {
        let f = fixture();
        let (id, payload) = created_payload(&f.clock, None);

        let outcome = f.runner.process(&payload).await;
        assert!(matches!(outcome, RunOutcome::Applied(ProjectionOutcome::Inserted)));
        assert_eq!(f.reads.find_by_id(id).await.unwrap().unwrap().balance_amount, 4_210);
        assert_eq!(
            f.metrics.projection_applied.with_label_values(&["Account", "inserted"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_status_goes_to_dlq_without_retry() {
        let f = fixture();
        let (id, payload) = created_payload(&f.clock, Some("OPEN"));

        let outcome = f.runner.process(&payload).await;
        assert!(matches!(outcome, RunOutcome::DeadLettered { reason: "unknown_status" }));

        let letters = f.dead_letters.letters().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].source, DeadLetterSource::Projection);
        assert_eq!(letters[0].aggregate_id, Some(id));
        assert_eq!(letters[0].event_type, "AccountCreated");
        assert!(letters[0].error_message.contains("OPEN"));
        assert_eq!(f.reads.len().await, 0);
    }

    #[tokio::test]
    async fn test_read_store_outage_is_retried_then_dead_lettered() {
        let f = fixture();
        f.reads.fail_writes(true);
        let (_, payload) = created_payload(&f.clock, None);

        let outcome = f.runner.process(&payload).await;
        assert!(matches!(outcome, RunOutcome::DeadLettered { reason: "store" }));
        assert_eq!(
            f.metrics.retry_failure.with_label_values(&["project_account"]).get(),
            1
        );
        assert_eq!(f.dead_letters.letters().await.len(), 1);
    }

    #[tokio::test]
    async fn test_non_json_payload_is_parked_as_unknown() {
        let f = fixture();

        let outcome = f.runner.process("\u{1f4a5} not json").await;
        assert!(matches!(outcome, RunOutcome::DeadLettered { reason: "invalid_payload" }));

        let letters = f.dead_letters.letters().await;
        assert_eq!(letters[0].event_type, "unknown");
        assert_eq!(letters[0].aggregate_id, None);
    }
}
