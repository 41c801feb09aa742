pub mod consumer;
pub mod publisher;
pub mod redpanda;

pub use consumer::TopicConsumer;
pub use publisher::EventPublisher;
pub use redpanda::RedpandaClient;
