use chrono::NaiveDate;
use uuid::Uuid;

use super::value_objects::{Address, CustomerStatus, Email, Name, Password, PhoneNumber};

// ============================================================================
// Customer Aggregate - Business Logic
// ============================================================================
//
// Immutable: an update hands back a replacement that keeps identity, email,
// password and birth date. The command repository swaps it in using
// `version` as the optimistic check.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    id: Uuid,
    name: Name,
    email: Email,
    address: Address,
    phone_number: PhoneNumber,
    password: Password,
    birth_date: NaiveDate,
    status: CustomerStatus,
    version: i64,
}

impl Customer {
    /// The only way a brand new customer comes into existence.
    pub fn register(
        name: Name,
        email: Email,
        address: Address,
        phone_number: PhoneNumber,
        password: Password,
        birth_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            address,
            phone_number,
            password,
            birth_date,
            status: CustomerStatus::Active,
            version: 1,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: Uuid,
        name: Name,
        email: Email,
        address: Address,
        phone_number: PhoneNumber,
        password: Password,
        birth_date: NaiveDate,
        status: CustomerStatus,
        version: i64,
    ) -> Self {
        Self {
            id,
            name,
            email,
            address,
            phone_number,
            password,
            birth_date,
            status,
            version,
        }
    }

    /// Replace the personal details; everything else carries over.
    pub fn update(&self, name: Name, address: Address, phone_number: PhoneNumber) -> Self {
        Self {
            name,
            address,
            phone_number,
            version: self.version + 1,
            ..self.clone()
        }
    }

    /// Ungated: any status may be deactivated.
    pub fn deactivate(&self) -> Self {
        Self {
            status: CustomerStatus::Inactive,
            version: self.version + 1,
            ..self.clone()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn phone_number(&self) -> &PhoneNumber {
        &self.phone_number
    }

    pub fn password(&self) -> &Password {
        &self.password
    }

    pub fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    pub fn status(&self) -> CustomerStatus {
        self.status
    }

    pub fn version(&self) -> i64 {
        self.version
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Customer {
        Customer::register(
            Name::new("Ada", None, "Lovelace").unwrap(),
            Email::new("ada@example.com").unwrap(),
            Address::new("UK", "London", "London", "12 St James's Sq", "SW1Y 4JH").unwrap(),
            PhoneNumber::new("+442071234567").unwrap(),
            Password::from_hashed("salt$digest").unwrap(),
            NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
        )
    }

    #[test]
    fn test_register_starts_active() {
        let customer = sample();
        assert_eq!(customer.status(), CustomerStatus::Active);
        assert_eq!(customer.version(), 1);
        assert_ne!(sample().id(), customer.id());
    }

    #[test]
    fn test_update_keeps_identity_and_credentials() {
        let original = sample().deactivate();
        let updated = original.update(
            Name::new("Augusta", Some("Ada".into()), "King").unwrap(),
            Address::new("UK", "Surrey", "Ockham", "Ockham Park", "GU23 6NP").unwrap(),
            PhoneNumber::new("+441483000000").unwrap(),
        );

        assert_eq!(updated.id(), original.id());
        assert_eq!(updated.email(), original.email());
        assert_eq!(updated.password(), original.password());
        assert_eq!(updated.birth_date(), original.birth_date());
        assert_eq!(updated.status(), CustomerStatus::Inactive);
        assert_eq!(updated.name().full_name(), "Augusta Ada King");
        assert_eq!(updated.version(), original.version() + 1);
        // original untouched
        assert_eq!(original.name().full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_deactivate_is_ungated() {
        let inactive = sample().deactivate();
        assert_eq!(inactive.status(), CustomerStatus::Inactive);

        let again = inactive.deactivate();
        assert_eq!(again.status(), CustomerStatus::Inactive);
        assert_eq!(again.version(), 3);
    }
}
