use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::common::Clock;
use crate::errors::{AppError, RepositoryError};
use crate::events::{EventEnvelope, TopicSet};
use crate::metrics::Metrics;
use crate::outbox::OutboxMessage;

use super::aggregate::Customer;
use super::commands::{CustomerCommand, PersonalDetails, RawPassword};
use super::domain_service::CustomerDomainService;
use super::errors::CustomerError;
use super::events::CustomerEvent;
use super::password::PasswordEncoder;
use super::repository::{AuthCredential, AuthRepository, CustomerCommandRepository};
use super::value_objects::{Email, Password};

// ============================================================================
// Customer Command Handler
// ============================================================================
//
// Registration touches two databases: the customer row (plus its outbox
// message) in the command store and the credential in the auth store. It
// runs as a saga: if the credential write fails the customer is deleted
// again, which also publishes a Deleted event, and the error is returned.
//
// ============================================================================

pub struct CustomerCommandHandler {
    repository: Arc<dyn CustomerCommandRepository>,
    auth: Arc<dyn AuthRepository>,
    domain_service: CustomerDomainService,
    encoder: Arc<dyn PasswordEncoder>,
    clock: Arc<dyn Clock>,
    topics: TopicSet,
    metrics: Arc<Metrics>,
}

impl CustomerCommandHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn CustomerCommandRepository>,
        auth: Arc<dyn AuthRepository>,
        domain_service: CustomerDomainService,
        encoder: Arc<dyn PasswordEncoder>,
        clock: Arc<dyn Clock>,
        topics: TopicSet,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            repository,
            auth,
            domain_service,
            encoder,
            clock,
            topics,
            metrics,
        }
    }

    /// Handle a command and return the id of the affected customer
    pub async fn handle(&self, command: CustomerCommand, correlation_id: Uuid) -> Result<Uuid, AppError> {
        tracing::info!(
            command = command.name(),
            correlation_id = %correlation_id,
            "Handling customer command"
        );

        match command {
            CustomerCommand::RegisterCustomer { details, email, raw_password, birth_date } => {
                self.register(details, &email, &raw_password, birth_date, correlation_id).await
            }
            CustomerCommand::UpdateCustomer { customer_id, details } => {
                let customer = self.load(customer_id).await?;
                let (name, address, phone) = details.parse()?;
                let updated = customer.update(name, address, phone);
                self.save(&customer, &updated, correlation_id).await
            }
            CustomerCommand::DeactivateCustomer { customer_id } => {
                let customer = self.load(customer_id).await?;
                let deactivated = customer.deactivate();
                self.save(&customer, &deactivated, correlation_id).await
            }
            CustomerCommand::DeleteCustomer { customer_id } => {
                self.delete(customer_id, correlation_id).await
            }
        }
    }

    async fn register(
        &self,
        details: PersonalDetails,
        email: &str,
        raw_password: &RawPassword,
        birth_date: NaiveDate,
        correlation_id: Uuid,
    ) -> Result<Uuid, AppError> {
        let email = Email::new(email)?;
        self.domain_service.ensure_unique_email(&email).await?;

        let (name, address, phone) = details.parse()?;
        let password = Password::encode(raw_password.expose(), self.encoder.as_ref())?;
        let customer = Customer::register(name, email, address, phone, password, birth_date);

        let now = self.clock.now();
        let outbox = self.outbox_message(&customer, CustomerEvent::created(&customer, now), correlation_id)?;
        match self.repository.insert(&customer, &outbox).await {
            Ok(()) => {}
            Err(RepositoryError::UniqueViolation(_)) => {
                return Err(CustomerError::DuplicateCustomer(customer.email().to_string()).into());
            }
            Err(e) => return Err(e.into()),
        }

        let credential = AuthCredential {
            customer_id: customer.id(),
            email: customer.email().to_string(),
            password_hash: customer.password().hash().to_string(),
            created_at: now,
        };
        if let Err(e) = self.auth.save(&credential).await {
            tracing::error!(
                customer_id = %customer.id(),
                error = %e,
                "Credential write failed, compensating customer registration"
            );
            self.compensate_registration(&customer, correlation_id).await;
            return Err(e.into());
        }

        tracing::info!(customer_id = %customer.id(), "Customer registered");
        Ok(customer.id())
    }

    /// Undo the customer insert after a failed credential write.
    async fn compensate_registration(&self, customer: &Customer, correlation_id: Uuid) {
        let result = async {
            let event = CustomerEvent::deleted(customer, self.clock.now());
            let outbox = self.outbox_message(customer, event, correlation_id)?;
            self.repository.delete(customer.id(), customer.version(), &outbox).await?;
            Ok::<(), AppError>(())
        }
        .await;

        if let Err(e) = result {
            self.metrics.record_consistency_failure("register_compensation");
            tracing::error!(
                customer_id = %customer.id(),
                error = %e,
                "Compensation failed: customer exists without a credential"
            );
        }
    }

    async fn delete(&self, customer_id: Uuid, correlation_id: Uuid) -> Result<Uuid, AppError> {
        let customer = self.load(customer_id).await?;

        let event = CustomerEvent::deleted(&customer, self.clock.now());
        let outbox = self.outbox_message(&customer, event, correlation_id)?;
        self.repository.delete(customer_id, customer.version(), &outbox).await?;
        tracing::info!(customer_id = %customer_id, "Customer deleted");

        // The customer deletion stands even if the credential cleanup fails.
        match self.auth.delete(customer_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(customer_id = %customer_id, "No credential found for deleted customer");
            }
            Err(e) => {
                self.metrics.record_consistency_failure("credential_cleanup");
                tracing::error!(
                    customer_id = %customer_id,
                    error = %e,
                    "Credential cleanup failed after customer deletion"
                );
            }
        }
        Ok(customer_id)
    }

    async fn load(&self, customer_id: Uuid) -> Result<Customer, AppError> {
        self.repository
            .find_by_id(customer_id)
            .await?
            .ok_or_else(|| AppError::not_found("Customer", customer_id))
    }

    async fn save(&self, current: &Customer, next: &Customer, correlation_id: Uuid) -> Result<Uuid, AppError> {
        let event = CustomerEvent::updated(next, self.clock.now());
        let outbox = self.outbox_message(next, event, correlation_id)?;
        self.repository.update(next, current.version(), &outbox).await?;
        Ok(next.id())
    }

    fn outbox_message(
        &self,
        customer: &Customer,
        event: CustomerEvent,
        correlation_id: Uuid,
    ) -> Result<OutboxMessage, AppError> {
        let timestamp = event.occurred_at();
        let envelope = EventEnvelope::new(customer.id(), customer.version(), event, correlation_id, timestamp);
        let topic = self.topics.for_kind(envelope.kind());
        Ok(OutboxMessage::from_envelope(&envelope, topic)?)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::common::FixedClock;
    use crate::domain::customer::{CustomerStatus, Sha256PasswordEncoder};
    use crate::errors::ErrorKind;
    use crate::infrastructure::memory::{InMemoryAuthRepository, InMemoryCommandStore, InMemoryCustomerReadRepository};
    use chrono::{TimeZone, Utc};

    struct Fixture {
        store: Arc<InMemoryCommandStore>,
        auth: Arc<InMemoryAuthRepository>,
        metrics: Arc<Metrics>,
        handler: CustomerCommandHandler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryCommandStore::new());
        let auth = Arc::new(InMemoryAuthRepository::new());
        let read = Arc::new(InMemoryCustomerReadRepository::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()));

        let handler = CustomerCommandHandler::new(
            store.clone(),
            auth.clone(),
            CustomerDomainService::new(read),
            Arc::new(Sha256PasswordEncoder),
            clock,
            TopicSet::with_prefix("customer"),
            metrics.clone(),
        );
        Fixture { store, auth, metrics, handler }
    }

    fn details() -> PersonalDetails {
        PersonalDetails {
            first_name: "Ada".into(),
            middle_name: None,
            last_name: "Lovelace".into(),
            country: "UK".into(),
            state: "London".into(),
            city: "London".into(),
            street: "12 St James's Sq".into(),
            postal_code: "SW1Y 4JH".into(),
            phone_number: "+442071234567".into(),
        }
    }

    fn register(email: &str) -> CustomerCommand {
        CustomerCommand::RegisterCustomer {
            details: details(),
            email: email.into(),
            raw_password: RawPassword::new("Secret!23"),
            birth_date: NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_register_writes_customer_credential_and_event() {
        let fx = fixture();
        let id = fx.handler.handle(register("ada@example.com"), Uuid::new_v4()).await.unwrap();

        let customer = fx.store.customer(id).await.unwrap();
        assert_eq!(customer.status(), CustomerStatus::Active);
        assert!(customer.password().matches("Secret!23", &Sha256PasswordEncoder));

        let credential = fx.auth.credential(id).await.unwrap();
        assert_eq!(credential.email, "ada@example.com");
        assert_eq!(credential.password_hash, customer.password().hash());

        let outbox = fx.store.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].topic, "customer-created");
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password_before_writing() {
        let fx = fixture();
        let command = CustomerCommand::RegisterCustomer {
            details: details(),
            email: "ada@example.com".into(),
            raw_password: RawPassword::new("password"),
            birth_date: NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
        };

        let error = fx.handler.handle(command, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(fx.store.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_command_store_unique_index_maps_to_duplicate() {
        // the read store has not caught up, so only the unique index catches it
        let fx = fixture();
        fx.handler.handle(register("ada@example.com"), Uuid::new_v4()).await.unwrap();

        let error = fx.handler.handle(register("ADA@example.com"), Uuid::new_v4()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert!(error.to_string().contains("already exists"));
        assert_eq!(fx.auth.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_credential_write_compensates() {
        let fx = fixture();
        fx.auth.fail_writes(true);

        let error = fx.handler.handle(register("ada@example.com"), Uuid::new_v4()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);

        assert_eq!(fx.store.customer_count().await, 0);
        let topics: Vec<_> = fx.store.outbox().await.into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, ["customer-created", "customer-deleted"]);
    }

    #[tokio::test]
    async fn test_update_and_deactivate() {
        let fx = fixture();
        let id = fx.handler.handle(register("ada@example.com"), Uuid::new_v4()).await.unwrap();

        let mut new_details = details();
        new_details.city = "Ockham".into();
        fx.handler
            .handle(CustomerCommand::UpdateCustomer { customer_id: id, details: new_details }, Uuid::new_v4())
            .await
            .unwrap();
        fx.handler
            .handle(CustomerCommand::DeactivateCustomer { customer_id: id }, Uuid::new_v4())
            .await
            .unwrap();

        let customer = fx.store.customer(id).await.unwrap();
        assert_eq!(customer.address().city(), "Ockham");
        assert_eq!(customer.status(), CustomerStatus::Inactive);
        assert_eq!(customer.version(), 3);
        assert_eq!(fx.store.outbox().await.len(), 3);
    }

    #[tokio::test]
    async fn test_update_unknown_customer_is_not_found() {
        let fx = fixture();
        let error = fx
            .handler
            .handle(CustomerCommand::UpdateCustomer { customer_id: Uuid::new_v4(), details: details() }, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_stands_when_credential_cleanup_fails() {
        let fx = fixture();
        let id = fx.handler.handle(register("ada@example.com"), Uuid::new_v4()).await.unwrap();
        fx.auth.fail_writes(true);

        fx.handler
            .handle(CustomerCommand::DeleteCustomer { customer_id: id }, Uuid::new_v4())
            .await
            .unwrap();

        assert!(fx.store.customer(id).await.is_none());
        assert!(fx.auth.credential(id).await.is_some());
        assert_eq!(
            fx.metrics.consistency_failures.with_label_values(&["credential_cleanup"]).get(),
            1
        );
    }
}
