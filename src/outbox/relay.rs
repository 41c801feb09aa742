use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use crate::dlq::{DeadLetter, DeadLetterSource, DeadLetterStore};
use crate::domain::common::Clock;
use crate::errors::RepositoryError;
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};
use super::message::OutboxMessage;
use super::store::OutboxStore;

// ============================================================================
// Outbox Relay - Polls the outbox table and publishes to the broker
// ============================================================================
//
// 1. Fetch pending rows oldest first
// 2. Publish each keyed by aggregate id, with backoff on failure
// 3. Mark published, or record the failure and hold back the rest of that
//    aggregate's messages in this batch so per-aggregate order survives
// 4. Rows that keep failing past `max_attempts` go to the DLQ, and so does
//    every later row of that aggregate: nothing is published past a gap
//
// Delivery is at-least-once: a crash between publish and mark means the row
// is sent again on the next poll. Consumers are idempotent.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Failed relay passes before a message is dead-lettered
    pub max_attempts: i32,
    /// Backoff used within a single pass
    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_attempts: 5,
            retry: RetryConfig::aggressive(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Skipped because an earlier message of the same aggregate failed
    pub held_back: usize,
}

impl RelayReport {
    pub fn is_idle(&self) -> bool {
        *self == RelayReport::default()
    }
}

pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    dead_letters: Arc<dyn DeadLetterStore>,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        dead_letters: Arc<dyn DeadLetterStore>,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            dead_letters,
            metrics,
            clock,
            config,
        }
    }

    /// One pass over the pending rows.
    pub async fn run_once(&self) -> Result<RelayReport, RepositoryError> {
        let batch = self.store.fetch_pending(self.config.batch_size).await?;
        if !batch.is_empty() {
            tracing::info!(message_count = batch.len(), "📬 Fetched pending outbox messages");
        }

        let mut report = RelayReport::default();
        let mut blocked: HashSet<Uuid> = HashSet::new();

        let aggregate_ids: Vec<Uuid> = batch
            .iter()
            .map(|message| message.aggregate_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let mut poisoned = self.store.dead_lettered_aggregates(&aggregate_ids).await?;

        for message in batch {
            if poisoned.contains(&message.aggregate_id) {
                let error = "an earlier message of this aggregate was dead-lettered";
                self.dead_letter(&message, error, message.attempts).await?;
                report.dead_lettered += 1;
                continue;
            }

            if blocked.contains(&message.aggregate_id) {
                tracing::debug!(
                    outbox_id = %message.id,
                    aggregate_id = %message.aggregate_id,
                    "⏭️  Holding back message behind a failed one"
                );
                report.held_back += 1;
                continue;
            }

            match self.publish(&message).await {
                Ok(()) => {
                    self.store.mark_published(message.id, self.clock.now()).await?;
                    self.metrics.record_outbox_published(&message.topic);
                    report.published += 1;

                    tracing::info!(
                        event_id = %message.event_id,
                        event_type = %message.event_type,
                        aggregate_id = %message.aggregate_id,
                        topic = %message.topic,
                        "✅ Published outbox message"
                    );
                }
                Err(error) => {
                    blocked.insert(message.aggregate_id);
                    self.metrics.record_outbox_failure(&message.topic);
                    let attempts = self.store.record_failure(message.id, &error).await?;

                    if attempts >= self.config.max_attempts {
                        self.dead_letter(&message, &error, attempts).await?;
                        poisoned.insert(message.aggregate_id);
                        report.dead_lettered += 1;
                    } else {
                        tracing::warn!(
                            event_id = %message.event_id,
                            aggregate_id = %message.aggregate_id,
                            attempts,
                            error = %error,
                            "❌ Publish failed, will retry on next poll"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn publish(&self, message: &OutboxMessage) -> Result<(), String> {
        let operation = "outbox_publish";
        let result = retry_with_backoff(operation, &self.config.retry, |attempt| {
            if attempt > 1 {
                self.metrics.record_retry_attempt(operation, attempt);
            }
            self.publisher
                .publish(&message.topic, &message.partition_key, &message.payload)
        })
        .await;

        if result.attempts() > 1 {
            self.metrics
                .record_retry_outcome(operation, matches!(result, RetryResult::Success { .. }));
        }
        result.into_result().map_err(|e| e.to_string())
    }

    async fn dead_letter(&self, message: &OutboxMessage, error: &str, attempts: i32) -> Result<(), RepositoryError> {
        let now = self.clock.now();
        let mut letter = DeadLetter::single_failure(
            DeadLetterSource::Relay,
            Some(message.aggregate_id),
            message.event_type.clone(),
            message.payload.clone(),
            error,
            now,
        );
        letter.failure_count = attempts;

        self.dead_letters.add(&letter).await?;
        self.store.mark_dead_lettered(message.id, now).await?;
        self.metrics
            .record_dlq_message(DeadLetterSource::Relay.as_str(), &message.event_type);

        tracing::error!(
            event_id = %message.event_id,
            event_type = %message.event_type,
            aggregate_id = %message.aggregate_id,
            attempts,
            error = %error,
            "💀 Outbox message moved to Dead Letter Queue"
        );
        Ok(())
    }

    /// Poll until `shutdown` flips to true. A full batch is followed by
    /// another pass straight away.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "🔄 Starting outbox relay"
        );

        loop {
            let drained = match self.run_once().await {
                Ok(report) => report.published + report.dead_lettered < self.config.batch_size,
                Err(e) => {
                    tracing::error!(error = %e, "Outbox relay pass failed");
                    true
                }
            };

            if drained {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        tracing::info!("Outbox relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Account, AccountEvent, AccountCommandRepository};
    use crate::domain::common::{FixedClock, Money};
    use crate::events::{EventEnvelope, Topics};
    use crate::infrastructure::memory::{InMemoryCommandStore, InMemoryDeadLetterStore, InMemoryEventBus};
    use chrono::Utc;

    struct Fixture {
        store: Arc<InMemoryCommandStore>,
        bus: Arc<InMemoryEventBus>,
        dead_letters: Arc<InMemoryDeadLetterStore>,
        clock: Arc<FixedClock>,
        relay: OutboxRelay,
    }

    fn fixture(max_attempts: i32) -> Fixture {
        let store = Arc::new(InMemoryCommandStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let relay = OutboxRelay::new(
            store.clone(),
            bus.clone(),
            dead_letters.clone(),
            Arc::new(Metrics::new().unwrap()),
            clock.clone(),
            RelayConfig {
                poll_interval: Duration::from_millis(10),
                batch_size: 50,
                max_attempts,
                retry: RetryConfig::immediate(2),
            },
        );
        Fixture { store, bus, dead_letters, clock, relay }
    }

    fn message(account: &Account, event: AccountEvent) -> OutboxMessage {
        let topics = Topics::default();
        let envelope = EventEnvelope::new(account.id(), account.version(), event, Uuid::new_v4(), account.updated_at());
        OutboxMessage::from_envelope(&envelope, topics.account.for_kind(envelope.kind())).unwrap()
    }

    /// Opens an account and deposits once: two outbox rows for one aggregate.
    async fn seed_account(f: &Fixture) -> Account {
        let opened = Account::open(Uuid::new_v4(), Money::parse("10", "USD").unwrap(), f.clock.as_ref()).unwrap();
        f.store.insert(&opened, &message(&opened, AccountEvent::created(&opened))).await.unwrap();

        let deposited = opened.deposit(&Money::parse("1", "USD").unwrap(), f.clock.as_ref()).unwrap();
        f.store
            .update(&deposited, opened.version(), &message(&deposited, AccountEvent::updated(&deposited)))
            .await
            .unwrap();
        deposited
    }

    #[tokio::test]
    async fn test_publishes_in_order_keyed_by_aggregate() {
        let f = fixture(3);
        let account = seed_account(&f).await;

        let report = f.relay.run_once().await.unwrap();
        assert_eq!(report.published, 2);

        let published = f.bus.published().await;
        assert_eq!(published[0].topic, "account-created");
        assert_eq!(published[1].topic, "account-updated");
        assert!(published.iter().all(|m| m.key == account.id().to_string()));

        // nothing left
        assert!(f.relay.run_once().await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_failing_aggregate_holds_back_its_later_messages_only() {
        let f = fixture(3);
        let broken = seed_account(&f).await;
        let healthy = seed_account(&f).await;
        f.bus.fail_for_key(&broken.id().to_string()).await;

        let report = f.relay.run_once().await.unwrap();
        assert_eq!(report, RelayReport { published: 2, failed: 1, dead_lettered: 0, held_back: 1 });
        assert!(f
            .bus
            .published()
            .await
            .iter()
            .all(|m| m.key == healthy.id().to_string()));

        f.bus.heal().await;
        let report = f.relay.run_once().await.unwrap();
        assert_eq!(report.published, 2);
        let topics: Vec<String> = f
            .bus
            .published()
            .await
            .into_iter()
            .filter(|m| m.key == broken.id().to_string())
            .map(|m| m.topic)
            .collect();
        assert_eq!(topics, ["account-created", "account-updated"]);
    }

    #[tokio::test]
    async fn test_message_is_dead_lettered_after_max_attempts() {
        let f = fixture(2);
        let account = seed_account(&f).await;
        f.bus.fail_for_key(&account.id().to_string()).await;

        let first = f.relay.run_once().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.held_back, 1);
        let second = f.relay.run_once().await.unwrap();
        assert_eq!(second.dead_lettered, 2);

        let letters = f.dead_letters.letters().await;
        assert_eq!(letters.len(), 2);
        assert!(letters.iter().all(|l| l.source == DeadLetterSource::Relay));
        let created = letters.iter().find(|l| l.event_type == "AccountCreated").unwrap();
        assert_eq!(created.failure_count, 2);

        assert!(f.store.fetch_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_is_published_behind_a_dead_letter() {
        let f = fixture(1);
        let opened = Account::open(Uuid::new_v4(), Money::parse("10", "USD").unwrap(), f.clock.as_ref()).unwrap();
        f.store.insert(&opened, &message(&opened, AccountEvent::created(&opened))).await.unwrap();
        f.bus.fail_for_key(&opened.id().to_string()).await;

        let report = f.relay.run_once().await.unwrap();
        assert_eq!(report.dead_lettered, 1);

        // the broker recovers, then a later change of the same account is written
        f.bus.heal().await;
        let deposited = opened.deposit(&Money::parse("1", "USD").unwrap(), f.clock.as_ref()).unwrap();
        f.store
            .update(&deposited, opened.version(), &message(&deposited, AccountEvent::updated(&deposited)))
            .await
            .unwrap();

        let report = f.relay.run_once().await.unwrap();
        assert_eq!(report, RelayReport { published: 0, failed: 0, dead_lettered: 1, held_back: 0 });
        assert!(f.bus.published().await.is_empty());

        let letters = f.dead_letters.letters().await;
        assert!(letters.iter().any(|l| l.event_type == "AccountUpdated" && l.failure_count == 0));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let f = fixture(3);
        seed_account(&f).await;
        let (tx, rx) = watch::channel(false);

        let relay = Arc::new(f.relay);
        let handle = tokio::spawn({
            let relay = relay.clone();
            async move { relay.run(rx).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

        assert_eq!(f.bus.published().await.len(), 2);
    }
}
