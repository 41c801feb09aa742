use async_trait::async_trait;

/// At-least-once delivery of one serialized event.
///
/// `key` is the aggregate id; brokers that partition by key keep every event
/// of one aggregate in order.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> anyhow::Result<()>;
}
