use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::outbox::OutboxMessage;
use super::aggregate::Account;

/// Authoritative account storage.
///
/// Writes take the outbox message that describes the change and must store
/// both in a single transaction: either both land or neither does.
#[async_trait]
pub trait AccountCommandRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, RepositoryError>;

    /// Fails with `UniqueViolation` when the account number is taken.
    async fn insert(&self, account: &Account, outbox: &OutboxMessage) -> Result<(), RepositoryError>;

    /// Replace the stored row only if it is still at `expected_version`,
    /// otherwise `ConcurrencyConflict` and nothing is written.
    async fn update(
        &self,
        account: &Account,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError>;
}
