use uuid::Uuid;

use crate::domain::account::AccountError;
use crate::domain::common::{AccountNumberError, MoneyError};
use crate::domain::customer::CustomerError;

// ============================================================================
// Application Error Taxonomy
// ============================================================================
//
// Domain layers raise their own typed errors. Everything that crosses the
// command/query boundary is converted into `AppError`, which classifies the
// failure and decides what may be shown to a caller.
//
// ============================================================================

/// Failures raised by persistence adapters
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Concurrency conflict on {aggregate_id}: expected version {expected_version}")]
    ConcurrencyConflict { aggregate_id: Uuid, expected_version: i64 },

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Row not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &error {
            if db.is_unique_violation() {
                return RepositoryError::UniqueViolation(
                    db.constraint().unwrap_or("unknown").to_string(),
                );
            }
        }
        RepositoryError::Backend(error.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Consistency,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound { entity, id: id.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Consistency(_) => ErrorKind::Consistency,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand to a caller. Internal details are never exposed.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::Consistency(_) => {
                "An unexpected error occurred. Please contact support.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::ConcurrencyConflict { .. } | RepositoryError::UniqueViolation(_) => {
                AppError::Conflict(error.to_string())
            }
            RepositoryError::NotFound(id) => AppError::not_found("Aggregate", id),
            RepositoryError::Backend(e) => AppError::Internal(e),
        }
    }
}

impl From<MoneyError> for AppError {
    fn from(error: MoneyError) -> Self {
        match error {
            MoneyError::Overflow(_) => AppError::Internal(error.into()),
            _ => AppError::Validation(error.to_string()),
        }
    }
}

impl From<AccountNumberError> for AppError {
    fn from(error: AccountNumberError) -> Self {
        AppError::Validation(error.to_string())
    }
}

impl From<AccountError> for AppError {
    fn from(error: AccountError) -> Self {
        match error {
            AccountError::Money(e) => e.into(),
            AccountError::NonPositiveAmount(_)
            | AccountError::NegativeInitialBalance(_)
            | AccountError::UnknownStatus(_) => AppError::Validation(error.to_string()),
            AccountError::InsufficientFunds { .. }
            | AccountError::NoOpTransition(_)
            | AccountError::IllegalTransition { .. }
            | AccountError::NotActive(_) => AppError::Conflict(error.to_string()),
        }
    }
}

impl From<CustomerError> for AppError {
    fn from(error: CustomerError) -> Self {
        match error {
            CustomerError::DuplicateCustomer(_) => AppError::Conflict(error.to_string()),
            CustomerError::UnknownStatus(_)
            | CustomerError::InvalidEmail(_)
            | CustomerError::InvalidName
            | CustomerError::InvalidAddress
            | CustomerError::InvalidPhoneNumber(_)
            | CustomerError::InvalidPassword
            | CustomerError::BlankPasswordHash => AppError::Validation(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountStatus;

    #[test]
    fn test_domain_errors_are_classified() {
        let conflict: AppError = AccountError::NoOpTransition(AccountStatus::Active).into();
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let validation: AppError = AccountError::UnknownStatus("OPEN".into()).into();
        assert_eq!(validation.kind(), ErrorKind::Validation);

        let duplicate: AppError = CustomerError::DuplicateCustomer("a@b.com".into()).into();
        assert_eq!(duplicate.kind(), ErrorKind::Conflict);

        let missing = AppError::not_found("Account", "ACCT-00000000");
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let error: AppError = RepositoryError::Backend(anyhow::anyhow!("password=hunter2 at db01")).into();
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(!error.public_message().contains("hunter2"));
    }

    #[test]
    fn test_concurrency_conflict_is_a_conflict() {
        let error: AppError = RepositoryError::ConcurrencyConflict {
            aggregate_id: Uuid::new_v4(),
            expected_version: 3,
        }
        .into();
        assert_eq!(error.kind(), ErrorKind::Conflict);
    }
}
