use std::fmt;

use chrono::NaiveDate;
use uuid::Uuid;

use super::errors::CustomerError;
use super::value_objects::{Address, Name, PhoneNumber};

// ============================================================================
// Customer Domain Commands
// ============================================================================

/// Name, address and phone exactly as the caller sent them.
#[derive(Debug, Clone)]
pub struct PersonalDetails {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub street: String,
    pub postal_code: String,
    pub phone_number: String,
}

impl PersonalDetails {
    pub fn parse(self) -> Result<(Name, Address, PhoneNumber), CustomerError> {
        let name = Name::new(self.first_name, self.middle_name, self.last_name)?;
        let address = Address::new(self.country, self.state, self.city, self.street, self.postal_code)?;
        let phone = PhoneNumber::new(self.phone_number)?;
        Ok((name, address, phone))
    }
}

/// Raw password in transit to the encoder. Never printed.
#[derive(Clone)]
pub struct RawPassword(String);

impl RawPassword {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RawPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[PROTECTED]")
    }
}

#[derive(Debug, Clone)]
pub enum CustomerCommand {
    RegisterCustomer {
        details: PersonalDetails,
        email: String,
        raw_password: RawPassword,
        birth_date: NaiveDate,
    },
    UpdateCustomer {
        customer_id: Uuid,
        details: PersonalDetails,
    },
    DeactivateCustomer {
        customer_id: Uuid,
    },
    DeleteCustomer {
        customer_id: Uuid,
    },
}

impl CustomerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CustomerCommand::RegisterCustomer { .. } => "RegisterCustomer",
            CustomerCommand::UpdateCustomer { .. } => "UpdateCustomer",
            CustomerCommand::DeactivateCustomer { .. } => "DeactivateCustomer",
            CustomerCommand::DeleteCustomer { .. } => "DeleteCustomer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_password_is_redacted_in_debug_output() {
        let command = CustomerCommand::DeactivateCustomer { customer_id: Uuid::nil() };
        assert_eq!(command.name(), "DeactivateCustomer");

        let raw = RawPassword::new("Secret!23");
        assert_eq!(format!("{raw:?}"), "[PROTECTED]");
        assert_eq!(raw.expose(), "Secret!23");
    }
}
