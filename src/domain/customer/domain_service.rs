use std::sync::Arc;

use crate::errors::AppError;
use crate::read_model::CustomerReadRepository;
use super::errors::CustomerError;
use super::value_objects::Email;

/// Cross-aggregate customer rules.
///
/// The email check reads the eventually consistent read store, so it is a
/// fast early rejection only; the unique index in the command store is what
/// actually guarantees one customer per email.
pub struct CustomerDomainService {
    read_repository: Arc<dyn CustomerReadRepository>,
}

impl CustomerDomainService {
    pub fn new(read_repository: Arc<dyn CustomerReadRepository>) -> Self {
        Self { read_repository }
    }

    pub async fn ensure_unique_email(&self, email: &Email) -> Result<(), AppError> {
        if self.read_repository.exists_by_email(email).await? {
            return Err(CustomerError::DuplicateCustomer(email.to_string()).into());
        }
        Ok(())
    }
}
