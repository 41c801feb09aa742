use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{DomainEvent, EventKind};
use super::aggregate::Customer;
use super::value_objects::{Address, Name};

// ============================================================================
// Customer Domain Events
// ============================================================================

/// Union type for all customer events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CustomerEvent {
    Created(CustomerCreated),
    Updated(CustomerUpdated),
    Deleted(CustomerDeleted),
}

impl DomainEvent for CustomerEvent {
    fn aggregate_type() -> &'static str {
        "Customer"
    }

    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::Created(_) => "CustomerCreated",
            CustomerEvent::Updated(_) => "CustomerUpdated",
            CustomerEvent::Deleted(_) => "CustomerDeleted",
        }
    }

    fn kind(&self) -> EventKind {
        match self {
            CustomerEvent::Created(_) => EventKind::Created,
            CustomerEvent::Updated(_) => EventKind::Updated,
            CustomerEvent::Deleted(_) => EventKind::Deleted,
        }
    }
}

// Wire records

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRecord {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
}

impl NameRecord {
    pub fn full_name(&self) -> String {
        match self.middle_name.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(middle) => format!("{} {} {}", self.first_name, middle, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

impl From<&Name> for NameRecord {
    fn from(name: &Name) -> Self {
        Self {
            first_name: name.first().to_string(),
            middle_name: name.middle().map(str::to_string),
            last_name: name.last().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl AddressRecord {
    pub fn full_address(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}",
            self.street, self.city, self.state, self.postal_code, self.country
        )
    }
}

impl From<&Address> for AddressRecord {
    fn from(address: &Address) -> Self {
        Self {
            street: address.street().to_string(),
            city: address.city().to_string(),
            state: address.state().to_string(),
            postal_code: address.postal_code().to_string(),
            country: address.country().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerCreated {
    pub customer_id: Uuid,
    pub email: String,
    pub name: NameRecord,
    pub birth_date: NaiveDate,
    pub phone_number: String,
    pub address: AddressRecord,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerUpdated {
    pub customer_id: Uuid,
    pub name: NameRecord,
    pub phone_number: String,
    pub address: AddressRecord,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDeleted {
    pub customer_id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

// ============================================================================
// Aggregate -> Event Mapping
// ============================================================================
//
// Customers carry no timestamps of their own; `at` comes from the clock the
// command handler was given.
//

impl CustomerEvent {
    pub fn created(customer: &Customer, at: DateTime<Utc>) -> Self {
        CustomerEvent::Created(CustomerCreated {
            customer_id: customer.id(),
            email: customer.email().to_string(),
            name: customer.name().into(),
            birth_date: customer.birth_date(),
            phone_number: customer.phone_number().to_string(),
            address: customer.address().into(),
            status: customer.status().to_string(),
            created_at: at,
        })
    }

    pub fn updated(customer: &Customer, at: DateTime<Utc>) -> Self {
        CustomerEvent::Updated(CustomerUpdated {
            customer_id: customer.id(),
            name: customer.name().into(),
            phone_number: customer.phone_number().to_string(),
            address: customer.address().into(),
            status: customer.status().to_string(),
            updated_at: at,
        })
    }

    pub fn deleted(customer: &Customer, at: DateTime<Utc>) -> Self {
        CustomerEvent::Deleted(CustomerDeleted {
            customer_id: customer.id(),
            deleted_at: at,
        })
    }

    pub fn customer_id(&self) -> Uuid {
        match self {
            CustomerEvent::Created(e) => e.customer_id,
            CustomerEvent::Updated(e) => e.customer_id,
            CustomerEvent::Deleted(e) => e.customer_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::Created(e) => e.created_at,
            CustomerEvent::Updated(e) => e.updated_at,
            CustomerEvent::Deleted(e) => e.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::{Email, Password, PhoneNumber};
    use chrono::TimeZone;

    #[test]
    fn test_created_event_flattens_customer() {
        let customer = Customer::register(
            Name::new("Grace", Some("Brewster".into()), "Hopper").unwrap(),
            Email::new("grace@navy.mil").unwrap(),
            Address::new("US", "NY", "New York", "1 Broadway", "10004").unwrap(),
            PhoneNumber::new("+12125550100").unwrap(),
            Password::from_hashed("salt$digest").unwrap(),
            NaiveDate::from_ymd_opt(1906, 12, 9).unwrap(),
        );
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let event = CustomerEvent::created(&customer, at);
        assert_eq!(event.event_type(), "CustomerCreated");
        assert_eq!(event.customer_id(), customer.id());
        assert_eq!(event.occurred_at(), at);

        let CustomerEvent::Created(created) = &event else {
            panic!("expected a created event");
        };
        assert_eq!(created.name.full_name(), "Grace Brewster Hopper");
        assert_eq!(created.address.full_address(), "1 Broadway, New York, NY, 10004, US");
        assert_eq!(created.status, "ACTIVE");

        // the password hash never leaves the aggregate
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("salt$digest"));
    }
}
