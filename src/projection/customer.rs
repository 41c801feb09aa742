use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::customer::{CustomerCreated, CustomerDeleted, CustomerEvent, CustomerStatus, CustomerUpdated};
use crate::events::EventEnvelope;
use crate::read_model::{CustomerReadEntity, CustomerReadRepository, Tombstone};
use super::{parse_status, ProjectionError, ProjectionHandler, ProjectionOutcome};

pub struct CustomerProjector {
    repository: Arc<dyn CustomerReadRepository>,
}

impl CustomerProjector {
    pub fn new(repository: Arc<dyn CustomerReadRepository>) -> Self {
        Self { repository }
    }

    pub async fn apply(&self, envelope: &EventEnvelope<CustomerEvent>) -> Result<ProjectionOutcome, ProjectionError> {
        let sequence = envelope.sequence_number;
        match &envelope.event_data {
            CustomerEvent::Created(event) => self.on_created(event, sequence).await,
            CustomerEvent::Updated(event) => self.on_updated(event, sequence).await,
            CustomerEvent::Deleted(event) => self.on_deleted(event, sequence).await,
        }
    }

    async fn is_deleted(&self, customer_id: Uuid) -> Result<bool, ProjectionError> {
        Ok(self.repository.find_tombstone(customer_id).await?.is_some())
    }

    async fn on_created(&self, event: &CustomerCreated, sequence: i64) -> Result<ProjectionOutcome, ProjectionError> {
        let status: CustomerStatus = parse_status(&event.status)?;

        if self.is_deleted(event.customer_id).await? {
            tracing::debug!(customer_id = %event.customer_id, "CustomerCreated for deleted customer ignored");
            return Ok(ProjectionOutcome::SkippedDeleted);
        }

        match self.repository.find_by_id(event.customer_id).await? {
            Some(row) if !row.needs_backfill => {
                tracing::debug!(customer_id = %event.customer_id, "CustomerCreated already applied");
                Ok(ProjectionOutcome::Duplicate)
            }
            Some(mut row) => {
                row.email = Some(event.email.clone());
                row.birth_date = Some(event.birth_date);
                if sequence > row.last_sequence {
                    row.name = event.name.full_name();
                    row.address = event.address.full_address();
                    row.phone_number = event.phone_number.clone();
                    row.status = status;
                    row.last_sequence = sequence;
                    row.last_event_at = event.created_at;
                }
                row.needs_backfill = false;
                self.repository.upsert(&row).await?;

                tracing::info!(customer_id = %event.customer_id, "Backfill row completed by CustomerCreated");
                Ok(ProjectionOutcome::Completed)
            }
            None => {
                let row = CustomerReadEntity {
                    customer_id: event.customer_id,
                    name: event.name.full_name(),
                    email: Some(event.email.clone()),
                    address: event.address.full_address(),
                    phone_number: event.phone_number.clone(),
                    birth_date: Some(event.birth_date),
                    status,
                    last_sequence: sequence,
                    last_event_at: event.created_at,
                    needs_backfill: false,
                };
                self.repository.upsert(&row).await?;
                Ok(ProjectionOutcome::Inserted)
            }
        }
    }

    async fn on_updated(&self, event: &CustomerUpdated, sequence: i64) -> Result<ProjectionOutcome, ProjectionError> {
        let status: CustomerStatus = parse_status(&event.status)?;

        if self.is_deleted(event.customer_id).await? {
            tracing::debug!(customer_id = %event.customer_id, "CustomerUpdated for deleted customer ignored");
            return Ok(ProjectionOutcome::SkippedDeleted);
        }

        match self.repository.find_by_id(event.customer_id).await? {
            Some(row) if sequence < row.last_sequence => {
                tracing::debug!(
                    customer_id = %event.customer_id,
                    event_sequence = sequence,
                    row_sequence = row.last_sequence,
                    "Skipping stale CustomerUpdated"
                );
                Ok(ProjectionOutcome::SkippedStale)
            }
            Some(row) if sequence == row.last_sequence => Ok(ProjectionOutcome::Duplicate),
            Some(mut row) => {
                row.name = event.name.full_name();
                row.address = event.address.full_address();
                row.phone_number = event.phone_number.clone();
                row.status = status;
                row.last_sequence = sequence;
                row.last_event_at = event.updated_at;
                self.repository.upsert(&row).await?;
                Ok(ProjectionOutcome::Updated)
            }
            None => {
                let row = CustomerReadEntity {
                    customer_id: event.customer_id,
                    name: event.name.full_name(),
                    email: None,
                    address: event.address.full_address(),
                    phone_number: event.phone_number.clone(),
                    birth_date: None,
                    status,
                    last_sequence: sequence,
                    last_event_at: event.updated_at,
                    needs_backfill: true,
                };
                self.repository.upsert(&row).await?;

                tracing::warn!(
                    customer_id = %event.customer_id,
                    "CustomerUpdated for unknown customer, synthesized row pending backfill"
                );
                Ok(ProjectionOutcome::Synthesized)
            }
        }
    }

    async fn on_deleted(&self, event: &CustomerDeleted, sequence: i64) -> Result<ProjectionOutcome, ProjectionError> {
        if self.is_deleted(event.customer_id).await? {
            return Ok(ProjectionOutcome::AlreadyAbsent);
        }

        let tombstone = Tombstone {
            aggregate_id: event.customer_id,
            sequence_number: sequence,
            deleted_at: event.deleted_at,
        };
        if self.repository.tombstone(&tombstone).await? {
            Ok(ProjectionOutcome::Deleted)
        } else {
            Ok(ProjectionOutcome::AlreadyAbsent)
        }
    }
}

#[async_trait]
impl ProjectionHandler for CustomerProjector {
    fn aggregate(&self) -> &'static str {
        "Customer"
    }

    async fn handle(&self, payload: &str) -> Result<ProjectionOutcome, ProjectionError> {
        let envelope: EventEnvelope<CustomerEvent> = serde_json::from_str(payload)?;
        self.apply(&envelope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::{Address, Customer, Email, Name, Password, PhoneNumber};
    use crate::infrastructure::memory::InMemoryCustomerReadRepository;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    fn customer() -> Customer {
        Customer::register(
            Name::new("Ada", None, "Lovelace").unwrap(),
            Email::new("Ada@Example.com").unwrap(),
            Address::new("UK", "London", "London", "12 St James's Square", "SW1Y 4JH").unwrap(),
            PhoneNumber::new("+442071234567").unwrap(),
            Password::from_hashed("salt$digest").unwrap(),
            NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
        )
    }

    fn moved(customer: &Customer) -> Customer {
        customer.update(
            Name::new("Ada", Some("King".into()), "Lovelace").unwrap(),
            Address::new("UK", "Surrey", "Ockham", "Ockham Park", "GU23 6NP").unwrap(),
            PhoneNumber::new("+441483222222").unwrap(),
        )
    }

    /// Envelope stamped with the version of the customer the event came from.
    fn envelope(customer: &Customer, event: CustomerEvent) -> EventEnvelope<CustomerEvent> {
        let at = event.occurred_at();
        EventEnvelope::new(customer.id(), customer.version(), event, Uuid::new_v4(), at)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn setup() -> (Arc<InMemoryCustomerReadRepository>, CustomerProjector) {
        let repository = Arc::new(InMemoryCustomerReadRepository::new());
        let projector = CustomerProjector::new(repository.clone());
        (repository, projector)
    }

    #[tokio::test]
    async fn test_created_flattens_name_and_address() {
        let (repository, projector) = setup();
        let customer = customer();

        let outcome = projector
            .apply(&envelope(&customer, CustomerEvent::created(&customer, t0())))
            .await
            .unwrap();
        assert_eq!(outcome, ProjectionOutcome::Inserted);

        let row = repository.find_by_id(customer.id()).await.unwrap().unwrap();
        assert_eq!(row.name, "Ada Lovelace");
        assert_eq!(row.address, "12 St James's Square, London, London, SW1Y 4JH, UK");
        assert_eq!(row.email.as_deref(), Some("Ada@Example.com"));
        assert_eq!(row.status, CustomerStatus::Active);
        assert_eq!(row.last_sequence, 1);

        // lookups ignore case
        let lookup = Email::new("ada@example.COM").unwrap();
        assert!(repository.exists_by_email(&lookup).await.unwrap());
    }

    #[tokio::test]
    async fn test_created_twice_is_idempotent() {
        let (repository, projector) = setup();
        let customer = customer();
        let created = envelope(&customer, CustomerEvent::created(&customer, t0()));

        projector.apply(&created).await.unwrap();
        let first = repository.find_by_id(created.aggregate_id).await.unwrap();
        assert_eq!(projector.apply(&created).await.unwrap(), ProjectionOutcome::Duplicate);
        let second = repository.find_by_id(created.aggregate_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repository.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_first_then_created_completes_backfill() {
        let (repository, projector) = setup();
        let original = customer();
        let moved = moved(&original);

        let outcome = projector
            .apply(&envelope(&moved, CustomerEvent::updated(&moved, t0() + Duration::minutes(1))))
            .await
            .unwrap();
        assert_eq!(outcome, ProjectionOutcome::Synthesized);
        let synthesized = repository.find_by_id(original.id()).await.unwrap().unwrap();
        assert!(synthesized.needs_backfill);
        assert_eq!(synthesized.email, None);

        let outcome = projector
            .apply(&envelope(&original, CustomerEvent::created(&original, t0())))
            .await
            .unwrap();
        assert_eq!(outcome, ProjectionOutcome::Completed);

        let row = repository.find_by_id(original.id()).await.unwrap().unwrap();
        assert!(!row.needs_backfill);
        assert_eq!(row.email.as_deref(), Some("Ada@Example.com"));
        assert_eq!(row.birth_date, NaiveDate::from_ymd_opt(1815, 12, 10));
        assert_eq!(row.name, "Ada King Lovelace");
        assert_eq!(row.last_sequence, 2);
    }

    #[tokio::test]
    async fn test_order_follows_version_not_timestamp() {
        let (repository, projector) = setup();
        let original = customer();
        let moved = moved(&original);
        let deactivated = moved.deactivate();

        projector
            .apply(&envelope(&original, CustomerEvent::created(&original, t0())))
            .await
            .unwrap();
        projector
            .apply(&envelope(&moved, CustomerEvent::updated(&moved, t0() + Duration::seconds(10))))
            .await
            .unwrap();
        // written by a host with a slower clock
        let outcome = projector
            .apply(&envelope(&deactivated, CustomerEvent::updated(&deactivated, t0() + Duration::seconds(5))))
            .await
            .unwrap();

        assert_eq!(outcome, ProjectionOutcome::Updated);
        let row = repository.find_by_id(original.id()).await.unwrap().unwrap();
        assert_eq!(row.status, CustomerStatus::Inactive);
        assert_eq!(row.last_sequence, 3);
    }

    #[tokio::test]
    async fn test_deleted_first_keeps_late_events_out() {
        let (repository, projector) = setup();
        let customer = customer();
        let moved = moved(&customer);

        let deleted = envelope(&customer, CustomerEvent::deleted(&customer, t0()));
        assert_eq!(projector.apply(&deleted).await.unwrap(), ProjectionOutcome::AlreadyAbsent);

        let created = envelope(&customer, CustomerEvent::created(&customer, t0()));
        assert_eq!(projector.apply(&created).await.unwrap(), ProjectionOutcome::SkippedDeleted);
        let updated = envelope(&moved, CustomerEvent::updated(&moved, t0()));
        assert_eq!(projector.apply(&updated).await.unwrap(), ProjectionOutcome::SkippedDeleted);

        assert!(repository.find_by_id(customer.id()).await.unwrap().is_none());
        assert!(!repository.exists_by_email(customer.email()).await.unwrap());
        assert_eq!(repository.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete_after_create_hides_the_row() {
        let (repository, projector) = setup();
        let customer = customer();

        projector
            .apply(&envelope(&customer, CustomerEvent::created(&customer, t0())))
            .await
            .unwrap();
        let deleted = envelope(&customer, CustomerEvent::deleted(&customer, t0()));
        assert_eq!(projector.apply(&deleted).await.unwrap(), ProjectionOutcome::Deleted);
        assert_eq!(projector.apply(&deleted).await.unwrap(), ProjectionOutcome::AlreadyAbsent);

        assert!(repository.find_by_id(customer.id()).await.unwrap().is_none());
        assert!(!repository.exists_by_email(customer.email()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_customer_status_is_rejected() {
        let (repository, projector) = setup();
        let customer = customer();
        let mut event = CustomerEvent::updated(&customer, t0());
        if let CustomerEvent::Updated(updated) = &mut event {
            updated.status = "BANNED".to_string();
        }

        let result = projector.apply(&envelope(&customer, event)).await;
        assert!(matches!(result, Err(ProjectionError::UnknownStatus(s)) if s == "BANNED"));
        assert_eq!(repository.len().await, 0);
    }
}
