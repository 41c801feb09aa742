pub mod envelope;
pub mod topics;

pub use envelope::{deserialize_event, serialize_event, DomainEvent, EventEnvelope};
pub use topics::{EventKind, TopicSet, Topics};
