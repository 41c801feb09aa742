use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::{serialize_event, DomainEvent, EventEnvelope};

/// One event waiting in the command store to be forwarded to the broker.
///
/// Written in the same transaction as the aggregate row it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_id: Uuid,
    pub event_type: String,
    pub topic: String,
    /// Broker key; the aggregate id, so one aggregate maps to one partition
    pub partition_key: String,
    /// JSON-encoded `EventEnvelope`
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn from_envelope<E: DomainEvent>(envelope: &EventEnvelope<E>, topic: &str) -> anyhow::Result<Self> {
        Ok(Self {
            id: Uuid::now_v7(),
            aggregate_id: envelope.aggregate_id,
            aggregate_type: E::aggregate_type().to_string(),
            event_id: envelope.event_id,
            event_type: envelope.event_type.clone(),
            topic: topic.to_string(),
            partition_key: envelope.partition_key(),
            payload: serialize_event(envelope)?,
            created_at: envelope.timestamp,
            attempts: 0,
            last_error: None,
            published_at: None,
            dead_lettered_at: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.published_at.is_none() && self.dead_lettered_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Account, AccountEvent};
    use crate::domain::common::{FixedClock, Money};
    use crate::events::deserialize_event;

    #[test]
    fn test_from_envelope_copies_routing_metadata() {
        let clock = FixedClock::new(Utc::now());
        let account = Account::open(Uuid::new_v4(), Money::parse("100", "USD").unwrap(), &clock).unwrap();
        let envelope = EventEnvelope::new(
            account.id(),
            account.version(),
            AccountEvent::created(&account),
            Uuid::new_v4(),
            account.created_at(),
        );

        let message = OutboxMessage::from_envelope(&envelope, "account-created").unwrap();

        assert_eq!(message.aggregate_type, "Account");
        assert_eq!(message.event_type, "AccountCreated");
        assert_eq!(message.event_id, envelope.event_id);
        assert_eq!(message.partition_key, account.id().to_string());
        assert!(message.is_pending());

        let decoded: EventEnvelope<AccountEvent> = deserialize_event(&message.payload).unwrap();
        assert_eq!(decoded, envelope);
    }
}
