use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::AccountError;

// ============================================================================
// Account Value Objects
// ============================================================================

/// Account lifecycle status. Closed set, no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Closed,
    Suspended,
    Pending,
    Frozen,
    Dormant,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 7] = [
        AccountStatus::Active,
        AccountStatus::Inactive,
        AccountStatus::Closed,
        AccountStatus::Suspended,
        AccountStatus::Pending,
        AccountStatus::Frozen,
        AccountStatus::Dormant,
    ];

    /// Wire name, as carried in events and stored in the read model
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Closed => "CLOSED",
            AccountStatus::Suspended => "SUSPENDED",
            AccountStatus::Pending => "PENDING",
            AccountStatus::Frozen => "FROZEN",
            AccountStatus::Dormant => "DORMANT",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            AccountStatus::Active => 0,
            AccountStatus::Inactive => 1,
            AccountStatus::Closed => 2,
            AccountStatus::Suspended => 3,
            AccountStatus::Pending => 4,
            AccountStatus::Frozen => 5,
            AccountStatus::Dormant => 6,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match on the wire name. No fallback variant.
impl FromStr for AccountStatus {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AccountError::UnknownStatus(s.to_string()))
    }
}
