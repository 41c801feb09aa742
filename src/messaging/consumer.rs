use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::BorrowedMessage,
    Message,
};
use tokio::sync::watch;

use crate::projection::{ProjectionRunner, RunOutcome};

const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

// ============================================================================
// Topic Consumer
// ============================================================================
//
// One continuously polling loop per event topic. Offsets are committed by
// hand after the projector is done with a message, whatever the outcome:
// failures have already been dead-lettered by the runner, so they must not
// block the partition.
//
// ============================================================================

pub struct TopicConsumer {
    consumer: StreamConsumer,
    topic: String,
    runner: Arc<ProjectionRunner>,
}

impl TopicConsumer {
    pub fn new(brokers: &str, group_id: &str, topic: &str, runner: Arc<ProjectionRunner>) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .create()
            .with_context(|| format!("Failed to create Kafka consumer for {topic}"))?;

        consumer
            .subscribe(&[topic])
            .with_context(|| format!("Failed to subscribe to {topic}"))?;

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            runner,
        })
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(topic = %self.topic, aggregate = self.runner.aggregate(), "🚀 Topic consumer started");

        let mut messages = self.consumer.stream();
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = messages.next() => match received {
                    Some(Ok(message)) => self.handle(&message).await,
                    Some(Err(e)) => {
                        tracing::warn!(topic = %self.topic, error = %e, "Kafka receive error");
                        tokio::time::sleep(RECEIVE_BACKOFF).await;
                    }
                    None => break,
                },
            }
        }

        tracing::info!(topic = %self.topic, "Topic consumer stopped");
    }

    async fn handle(&self, message: &BorrowedMessage<'_>) {
        match message.payload_view::<str>() {
            Some(Ok(payload)) => {
                if let RunOutcome::DeadLettered { reason } = self.runner.process(payload).await {
                    tracing::warn!(
                        topic = %self.topic,
                        partition = message.partition(),
                        offset = message.offset(),
                        reason,
                        "Event dead-lettered, committing offset"
                    );
                }
            }
            Some(Err(_)) => {
                let lossy = message.payload().map(String::from_utf8_lossy).unwrap_or_default();
                self.runner.process(&lossy).await;
            }
            None => {
                tracing::warn!(topic = %self.topic, offset = message.offset(), "Skipping message without payload");
            }
        }

        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::error!(topic = %self.topic, offset = message.offset(), error = %e, "Failed to commit offset");
        }
    }
}
