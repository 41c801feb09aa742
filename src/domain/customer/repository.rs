use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::outbox::OutboxMessage;
use super::aggregate::Customer;

/// Authoritative customer storage. Every write carries the outbox message
/// describing it and stores both atomically.
#[async_trait]
pub trait CustomerCommandRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Customer>, RepositoryError>;

    /// Fails with `UniqueViolation` when the email is already registered.
    async fn insert(&self, customer: &Customer, outbox: &OutboxMessage) -> Result<(), RepositoryError>;

    async fn update(
        &self,
        customer: &Customer,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError>;

    async fn delete(
        &self,
        customer_id: Uuid,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError>;
}

/// Login credential kept in the separate auth store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCredential {
    pub customer_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn save(&self, credential: &AuthCredential) -> Result<(), RepositoryError>;

    /// Returns whether a credential was removed.
    async fn delete(&self, customer_id: Uuid) -> Result<bool, RepositoryError>;
}
