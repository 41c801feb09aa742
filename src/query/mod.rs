use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::account::AccountStatus;
use crate::domain::common::{AccountNumber, CurrencyCode, Money};
use crate::domain::customer::CustomerStatus;
use crate::errors::AppError;
use crate::read_model::{AccountReadEntity, AccountReadRepository, CustomerReadEntity, CustomerReadRepository};

// ============================================================================
// Query Services - read side only, eventually consistent
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AccountView {
    pub account_id: Uuid,
    pub account_number: String,
    pub customer_id: Uuid,
    pub balance: Money,
    pub status: AccountStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountReadEntity> for AccountView {
    type Error = AppError;

    fn try_from(row: AccountReadEntity) -> Result<Self, Self::Error> {
        let currency = CurrencyCode::new(row.currency_code)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("Corrupt currency in read row")))?;

        Ok(Self {
            account_id: row.account_id,
            account_number: row.account_number,
            customer_id: row.customer_id,
            balance: Money::from_minor_units(row.balance_amount, currency),
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerView {
    pub customer_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub address: String,
    pub phone_number: String,
    pub birth_date: Option<NaiveDate>,
    pub status: CustomerStatus,
}

impl From<CustomerReadEntity> for CustomerView {
    fn from(row: CustomerReadEntity) -> Self {
        Self {
            customer_id: row.customer_id,
            name: row.name,
            email: row.email,
            address: row.address,
            phone_number: row.phone_number,
            birth_date: row.birth_date,
            status: row.status,
        }
    }
}

pub struct AccountQueryService {
    repository: Arc<dyn AccountReadRepository>,
}

impl AccountQueryService {
    pub fn new(repository: Arc<dyn AccountReadRepository>) -> Self {
        Self { repository }
    }

    pub async fn find_by_account_number(&self, account_number: &str) -> Result<AccountView, AppError> {
        let number = AccountNumber::parse(account_number)?;

        let row = self
            .repository
            .find_by_account_number(number.as_str())
            .await?
            .ok_or_else(|| AppError::not_found("Account", number.as_str()))?;

        AccountView::try_from(row)
    }

    pub async fn account_exists(&self, account_number: &str) -> Result<bool, AppError> {
        let number = AccountNumber::parse(account_number)?;
        Ok(self.repository.exists_by_account_number(number.as_str()).await?)
    }
}

pub struct CustomerQueryService {
    repository: Arc<dyn CustomerReadRepository>,
}

impl CustomerQueryService {
    pub fn new(repository: Arc<dyn CustomerReadRepository>) -> Self {
        Self { repository }
    }

    pub async fn get_customer_by_id(&self, customer_id: Uuid) -> Result<CustomerView, AppError> {
        self.repository
            .find_by_id(customer_id)
            .await?
            .map(CustomerView::from)
            .ok_or_else(|| AppError::not_found("Customer", customer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::infrastructure::memory::{InMemoryAccountReadRepository, InMemoryCustomerReadRepository};

    fn row(number: &str) -> AccountReadEntity {
        let now = Utc::now();
        AccountReadEntity {
            account_id: Uuid::new_v4(),
            account_number: number.to_string(),
            customer_id: Uuid::new_v4(),
            balance_amount: 12_345,
            currency_code: "EUR".to_string(),
            status: AccountStatus::Active,
            created_at: Some(now),
            updated_at: now,
            last_sequence: 1,
            last_event_at: now,
            needs_backfill: false,
        }
    }

    #[tokio::test]
    async fn test_find_by_number_converts_minor_units() {
        let repository = Arc::new(InMemoryAccountReadRepository::new());
        repository.upsert(&row("ACCT-AB12CD34")).await.unwrap();
        let service = AccountQueryService::new(repository);

        let view = service.find_by_account_number("ACCT-AB12CD34").await.unwrap();
        assert_eq!(view.balance.to_string(), "123.45 EUR");
        assert!(service.account_exists("ACCT-AB12CD34").await.unwrap());
        assert!(!service.account_exists("ACCT-ZZZZZZZZ").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_number_is_not_found_and_bad_number_invalid() {
        let service = AccountQueryService::new(Arc::new(InMemoryAccountReadRepository::new()));

        let missing = service.find_by_account_number("ACCT-00000000").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let malformed = service.find_by_account_number("12345").await.unwrap_err();
        assert_eq!(malformed.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_not_found() {
        let service = CustomerQueryService::new(Arc::new(InMemoryCustomerReadRepository::new()));
        let error = service.get_customer_by_id(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
