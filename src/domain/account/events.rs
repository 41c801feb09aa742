use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{DomainEvent, EventKind};
use super::aggregate::Account;

// ============================================================================
// Account Domain Events
// ============================================================================
//
// Flat wire schema. Money travels as decimal text plus a currency code and
// the status as its upper-case name, so consumers never need our types.
//
// ============================================================================

/// Union type for all account events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AccountEvent {
    Created(AccountCreated),
    Updated(AccountUpdated),
    Deleted(AccountDeleted),
}

impl DomainEvent for AccountEvent {
    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Created(_) => "AccountCreated",
            AccountEvent::Updated(_) => "AccountUpdated",
            AccountEvent::Deleted(_) => "AccountDeleted",
        }
    }

    fn kind(&self) -> EventKind {
        match self {
            AccountEvent::Created(_) => EventKind::Created,
            AccountEvent::Updated(_) => EventKind::Updated,
            AccountEvent::Deleted(_) => EventKind::Deleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub account_id: Uuid,
    pub account_number: String,
    pub customer_id: Uuid,
    #[serde(with = "rust_decimal::serde::str")]
    pub initial_balance: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdated {
    pub account_id: Uuid,
    pub account_number: String,
    pub customer_id: Uuid,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    pub currency: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDeleted {
    pub account_id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

// ============================================================================
// Aggregate -> Event Mapping
// ============================================================================

impl AccountEvent {
    pub fn created(account: &Account) -> Self {
        AccountEvent::Created(AccountCreated {
            account_id: account.id(),
            account_number: account.account_number().to_string(),
            customer_id: account.customer_id(),
            initial_balance: account.balance().amount(),
            currency: account.balance().currency().to_string(),
            status: account.status().to_string(),
            created_at: account.created_at(),
        })
    }

    pub fn updated(account: &Account) -> Self {
        AccountEvent::Updated(AccountUpdated {
            account_id: account.id(),
            account_number: account.account_number().to_string(),
            customer_id: account.customer_id(),
            balance: account.balance().amount(),
            currency: account.balance().currency().to_string(),
            status: account.status().to_string(),
            updated_at: account.updated_at(),
        })
    }

    pub fn deleted(account: &Account, deleted_at: DateTime<Utc>) -> Self {
        AccountEvent::Deleted(AccountDeleted {
            account_id: account.id(),
            deleted_at,
        })
    }

    pub fn account_id(&self) -> Uuid {
        match self {
            AccountEvent::Created(e) => e.account_id,
            AccountEvent::Updated(e) => e.account_id,
            AccountEvent::Deleted(e) => e.account_id,
        }
    }

    /// Time of the change this event describes.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::Created(e) => e.created_at,
            AccountEvent::Updated(e) => e.updated_at,
            AccountEvent::Deleted(e) => e.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountStatus;
    use crate::domain::common::{Clock, FixedClock, Money};
    use chrono::TimeZone;

    #[test]
    fn test_created_event_flattens_account() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap());
        let account = Account::open(Uuid::new_v4(), Money::parse("100", "USD").unwrap(), &clock).unwrap();

        let event = AccountEvent::created(&account);
        assert_eq!(event.event_type(), "AccountCreated");
        assert_eq!(event.kind(), EventKind::Created);
        assert_eq!(event.account_id(), account.id());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Created");
        assert_eq!(json["data"]["initial_balance"], "100.00");
        assert_eq!(json["data"]["currency"], "USD");
        assert_eq!(json["data"]["status"], "ACTIVE");
        assert_eq!(json["data"]["account_number"], account.account_number().as_str());
    }

    #[test]
    fn test_updated_event_carries_new_status_and_time() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap());
        let account = Account::open(Uuid::new_v4(), Money::parse("5", "EUR").unwrap(), &clock).unwrap();
        clock.advance(chrono::Duration::hours(1));
        let frozen = account.change_status(AccountStatus::Frozen, &clock).unwrap();

        match AccountEvent::updated(&frozen) {
            AccountEvent::Updated(e) => {
                assert_eq!(e.status, "FROZEN");
                assert_eq!(e.updated_at, clock.now());
                assert_eq!(e.balance.to_string(), "5.00");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
