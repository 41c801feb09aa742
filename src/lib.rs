// ============================================================================
// Bank CQRS - account and customer services on a split command/read store
// ============================================================================
//
// Write path: command -> aggregate -> (row + outbox message) in one
// transaction. The outbox relay publishes to Redpanda; projectors consume the
// topics and maintain the denormalized read model in ScyllaDB, which the
// query services serve.
//
// ============================================================================

pub mod config;
pub mod dlq;
pub mod domain;
pub mod errors;
pub mod events;
pub mod infrastructure;
pub mod messaging;
pub mod metrics;
pub mod outbox;
pub mod projection;
pub mod query;
pub mod read_model;
pub mod utils;
