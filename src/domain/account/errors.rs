use crate::domain::common::{Money, MoneyError};
use super::value_objects::AccountStatus;

// ============================================================================
// Account Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Amount must be positive: {0}")]
    NonPositiveAmount(Money),

    #[error("Initial balance must be zero or positive: {0}")]
    NegativeInitialBalance(Money),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Money, requested: Money },

    #[error("Account is already in status: {0}")]
    NoOpTransition(AccountStatus),

    #[error("Cannot change status from {from} to {to}: {reason}")]
    IllegalTransition { from: AccountStatus, to: AccountStatus, reason: &'static str },

    #[error("Operation requires an ACTIVE account, current status is {0}")]
    NotActive(AccountStatus),

    #[error("Unknown account status: {0:?}")]
    UnknownStatus(String),

    #[error(transparent)]
    Money(#[from] MoneyError),
}
