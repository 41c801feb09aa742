use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use anyhow::Result;

use super::topics::EventKind;

// ============================================================================
// Event Envelope - Event Metadata
// ============================================================================
//
// Wraps domain events with the metadata the relay and the projectors need:
// a unique event id for de-duplication, the aggregate id used as the
// partition key, the aggregate version and the time the change happened.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
///
/// Type Parameter:
/// - `E`: The domain event type (must implement DomainEvent trait)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation (for distributed tracing)
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,

    // Timing, taken from the injected clock
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_version: E::event_version(),
            event_data,
            causation_id: None,
            correlation_id,
            timestamp,
            metadata: HashMap::new(),
        }
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Partition key on the broker. Per-aggregate ordering depends on it.
    pub fn partition_key(&self) -> String {
        self.aggregate_id.to_string()
    }

    pub fn kind(&self) -> EventKind {
        self.event_data.kind()
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Implemented by each aggregate's event union.
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    /// Aggregate family, e.g. "Account"
    fn aggregate_type() -> &'static str where Self: Sized;

    fn event_type(&self) -> &'static str;

    fn kind(&self) -> EventKind;

    fn event_version() -> i32 where Self: Sized { 1 }
}

// ============================================================================
// Event Serialization Helpers
// ============================================================================

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

pub fn deserialize_event<E: for<'de> Deserialize<'de>>(json: &str) -> Result<E> {
    Ok(serde_json::from_str(json)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct TestEvent {
        data: String,
    }

    impl DomainEvent for TestEvent {
        fn aggregate_type() -> &'static str { "Test" }
        fn event_type(&self) -> &'static str { "TestEvent" }
        fn kind(&self) -> EventKind { EventKind::Created }
    }

    #[test]
    fn test_event_envelope_creation() {
        let aggregate_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let timestamp = Utc::now();

        let envelope = EventEnvelope::new(
            aggregate_id,
            1,
            TestEvent { data: "test".to_string() },
            correlation_id,
            timestamp,
        );

        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.sequence_number, 1);
        assert_eq!(envelope.event_type, "TestEvent");
        assert_eq!(envelope.correlation_id, correlation_id);
        assert_eq!(envelope.timestamp, timestamp);
        assert_eq!(envelope.partition_key(), aggregate_id.to_string());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let id = Uuid::new_v4();
        let a = EventEnvelope::new(id, 1, TestEvent { data: "a".into() }, id, Utc::now());
        let b = EventEnvelope::new(id, 1, TestEvent { data: "a".into() }, id, Utc::now());
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_envelope_round_trips_through_json() {
        let envelope = EventEnvelope::new(
            Uuid::new_v4(),
            3,
            TestEvent { data: "test data".to_string() },
            Uuid::new_v4(),
            Utc::now(),
        )
        .with_metadata("source", "unit-test");

        let json = serialize_event(&envelope).unwrap();
        let back: EventEnvelope<TestEvent> = deserialize_event(&json).unwrap();
        assert_eq!(back, envelope);
    }
}
