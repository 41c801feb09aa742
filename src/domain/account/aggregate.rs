use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::common::{AccountNumber, Clock, Money};
use super::errors::AccountError;
use super::value_objects::AccountStatus;

// ============================================================================
// Account Aggregate - Business Logic
// ============================================================================
//
// State-stored aggregate. Every operation borrows the current version and
// returns the next one; nothing mutates in place. `version` starts at 1 and
// is what the command repository checks on write.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    id: Uuid,
    account_number: AccountNumber,
    customer_id: Uuid,
    balance: Money,
    status: AccountStatus,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new ACTIVE account with a freshly generated account number.
    pub fn open(
        customer_id: Uuid,
        initial_balance: Money,
        clock: &dyn Clock,
    ) -> Result<Self, AccountError> {
        if initial_balance.is_negative() {
            return Err(AccountError::NegativeInitialBalance(initial_balance));
        }

        let now = clock.now();
        Ok(Self {
            id: Uuid::new_v4(),
            account_number: AccountNumber::generate(),
            customer_id,
            balance: initial_balance,
            status: AccountStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild from persisted state. No business rules run here.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: Uuid,
        account_number: AccountNumber,
        customer_id: Uuid,
        balance: Money,
        status: AccountStatus,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_number,
            customer_id,
            balance,
            status,
            version,
            created_at,
            updated_at,
        }
    }

    /// Legality across statuses is decided by the transition table before
    /// this runs; the aggregate only refuses a no-op.
    pub fn change_status(
        &self,
        new_status: AccountStatus,
        clock: &dyn Clock,
    ) -> Result<Self, AccountError> {
        if self.status == new_status {
            return Err(AccountError::NoOpTransition(new_status));
        }

        Ok(Self {
            status: new_status,
            ..self.next_version(clock)
        })
    }

    pub fn deposit(&self, amount: &Money, clock: &dyn Clock) -> Result<Self, AccountError> {
        ensure_positive(amount)?;
        let balance = self.balance.add(amount)?;

        Ok(Self {
            balance,
            ..self.next_version(clock)
        })
    }

    pub fn withdraw(&self, amount: &Money, clock: &dyn Clock) -> Result<Self, AccountError> {
        ensure_positive(amount)?;
        if self.balance.is_less_than(amount)? {
            return Err(AccountError::InsufficientFunds {
                balance: self.balance.clone(),
                requested: amount.clone(),
            });
        }
        let balance = self.balance.subtract(amount)?;

        Ok(Self {
            balance,
            ..self.next_version(clock)
        })
    }

    fn next_version(&self, clock: &dyn Clock) -> Self {
        Self {
            version: self.version + 1,
            updated_at: clock.now(),
            ..self.clone()
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account_number(&self) -> &AccountNumber {
        &self.account_number
    }

    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    pub fn balance(&self) -> &Money {
        &self.balance
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

fn ensure_positive(amount: &Money) -> Result<(), AccountError> {
    if !amount.is_positive() {
        return Err(AccountError::NonPositiveAmount(amount.clone()));
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
