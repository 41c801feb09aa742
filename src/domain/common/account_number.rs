use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static ACCOUNT_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ACCT-[A-Z0-9]{8}$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountNumberError {
    #[error("Account number cannot be blank")]
    Blank,

    #[error("Invalid account number format: {0}")]
    InvalidFormat(String),
}

/// Public account identifier, `ACCT-` followed by 8 upper-case alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber(String);

impl AccountNumber {
    pub fn parse(value: impl Into<String>) -> Result<Self, AccountNumberError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AccountNumberError::Blank);
        }
        if !ACCOUNT_NUMBER_PATTERN.is_match(&value) {
            return Err(AccountNumberError::InvalidFormat(value));
        }
        Ok(Self(value))
    }

    /// Random account number; uniqueness is enforced by the command store.
    pub fn generate() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("ACCT-{}", random[..8].to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountNumber {
    type Err = AccountNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = AccountNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AccountNumber> for String {
    fn from(number: AccountNumber) -> Self {
        number.0
    }
}
