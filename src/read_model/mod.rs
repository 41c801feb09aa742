use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::account::AccountStatus;
use crate::domain::customer::{CustomerStatus, Email};
use crate::errors::RepositoryError;

// ============================================================================
// Read Model - denormalized rows written only by the projectors
// ============================================================================
//
// `last_sequence` is the aggregate version of the newest event folded into
// the row; events carrying a lower version are discarded against it.
// `last_event_at` is that event's timestamp, kept for display only.
// `needs_backfill` marks rows that were synthesized from an Updated event
// before the matching Created event arrived, so some immutable fields are
// still unknown.
//
// Deleted events leave a tombstone keyed by aggregate id. Created and
// Updated events for a tombstoned id are ignored, and the lookups below
// never return a tombstoned row, whatever order the topics deliver in.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReadEntity {
    pub account_id: Uuid,
    pub account_number: String,
    pub customer_id: Uuid,
    /// Balance in minor units (cents)
    pub balance_amount: i64,
    pub currency_code: String,
    pub status: AccountStatus,
    /// Unknown until the Created event has been applied
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub last_sequence: i64,
    pub last_event_at: DateTime<Utc>,
    pub needs_backfill: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerReadEntity {
    pub customer_id: Uuid,
    /// "First [Middle ]Last"
    pub name: String,
    /// Unknown until the Created event has been applied
    pub email: Option<String>,
    /// "street, city, state, postal code, country"
    pub address: String,
    pub phone_number: String,
    pub birth_date: Option<NaiveDate>,
    pub status: CustomerStatus,
    pub last_sequence: i64,
    pub last_event_at: DateTime<Utc>,
    pub needs_backfill: bool,
}

/// Marker left by a Deleted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub aggregate_id: Uuid,
    pub sequence_number: i64,
    pub deleted_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountReadRepository: Send + Sync {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<AccountReadEntity>, RepositoryError>;

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<AccountReadEntity>, RepositoryError>;

    async fn exists_by_account_number(&self, account_number: &str) -> Result<bool, RepositoryError> {
        Ok(self.find_by_account_number(account_number).await?.is_some())
    }

    /// Insert or fully replace the row keyed by `account_id`.
    async fn upsert(&self, entity: &AccountReadEntity) -> Result<(), RepositoryError>;

    async fn find_tombstone(&self, account_id: Uuid) -> Result<Option<Tombstone>, RepositoryError>;

    /// Record the deletion and drop the live row. Returns whether a live row
    /// was removed.
    async fn tombstone(&self, tombstone: &Tombstone) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CustomerReadRepository: Send + Sync {
    async fn find_by_id(&self, customer_id: Uuid) -> Result<Option<CustomerReadEntity>, RepositoryError>;

    /// Case-insensitive lookup.
    async fn exists_by_email(&self, email: &Email) -> Result<bool, RepositoryError>;

    async fn upsert(&self, entity: &CustomerReadEntity) -> Result<(), RepositoryError>;

    async fn find_tombstone(&self, customer_id: Uuid) -> Result<Option<Tombstone>, RepositoryError>;

    async fn tombstone(&self, tombstone: &Tombstone) -> Result<bool, RepositoryError>;
}
