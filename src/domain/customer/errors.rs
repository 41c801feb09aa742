// ============================================================================
// Customer Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error("Customer with email {0} already exists")]
    DuplicateCustomer(String),

    #[error("Unknown customer status: {0:?}")]
    UnknownStatus(String),

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("First name and last name must be provided")]
    InvalidName,

    #[error("All address fields must be provided")]
    InvalidAddress,

    #[error("Invalid phone number format: {0}")]
    InvalidPhoneNumber(String),

    #[error("Password must be at least 8 characters and contain an uppercase letter and a special character")]
    InvalidPassword,

    #[error("Password hash cannot be blank")]
    BlankPasswordHash,
}
