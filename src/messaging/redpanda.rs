use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};

use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
use super::publisher::EventPublisher;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka/Redpanda producer used by the outbox relay.
pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaClient {
    pub fn new(brokers: &str, metrics: Arc<Metrics>) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            // per-partition order must survive producer retries
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .create()
            .with_context(|| format!("Failed to create Kafka producer for {brokers}"))?;

        let breaker_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("kafka", breaker_config).with_metrics(metrics),
        })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}

#[async_trait]
impl EventPublisher for RedpandaClient {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key).payload(payload);
                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))
            })
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(topic = %topic, key = %key, "Published to Kafka");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen(_)) => {
                tracing::error!(topic = %topic, "Circuit breaker open - Kafka unavailable");
                Err(anyhow::anyhow!("Circuit breaker open for Kafka"))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %topic, "Failed to publish to Kafka");
                Err(e)
            }
        }
    }
}
