use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// ============================================================================
// Money Value Object
// ============================================================================
//
// Amounts are always held at scale 2. Every construction path goes through
// `Money::of`, which rounds half-to-even (banker's rounding) so that values
// reconcile with the ledger systems that consume our events.
//
// ============================================================================

const SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: CurrencyCode, right: CurrencyCode },

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Arithmetic overflow on {0}")]
    Overflow(&'static str),
}

/// ISO-4217 alphabetic currency code (three upper-case ASCII letters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Result<Self, MoneyError> {
        let code = code.into();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(MoneyError::InvalidCurrency(code))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// A monetary amount in a single currency.
///
/// Equality and hashing are value based: `Decimal` compares numerically and
/// every instance carries the same scale, so `1.5 USD == 1.50 USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawMoney")]
pub struct Money {
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    /// Build a money value, rounding the amount to 2 places half-to-even.
    pub fn of(amount: Decimal, currency: CurrencyCode) -> Self {
        let mut amount = amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointNearestEven);
        amount.rescale(SCALE);
        Self { amount, currency }
    }

    /// Parse both the amount text and the currency code.
    pub fn parse(amount: &str, currency: &str) -> Result<Self, MoneyError> {
        let value = Decimal::from_str(amount.trim())
            .map_err(|_| MoneyError::InvalidAmount(amount.to_string()))?;
        Ok(Self::of(value, CurrencyCode::new(currency)?))
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self::of(Decimal::ZERO, currency)
    }

    /// Rebuild from an integer amount of minor units (cents).
    pub fn from_minor_units(units: i64, currency: CurrencyCode) -> Self {
        Self::of(Decimal::new(units, SCALE), currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let sum = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow("add"))?;
        Ok(Money::of(sum, self.currency.clone()))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let difference = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow("subtract"))?;
        Ok(Money::of(difference, self.currency.clone()))
    }

    pub fn is_less_than(&self, other: &Money) -> Result<bool, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.amount < other.amount)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Amount in minor units, e.g. cents. Exact because the scale is fixed at 2.
    pub fn minor_units(&self) -> Result<i64, MoneyError> {
        self.amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
            .ok_or(MoneyError::Overflow("minor units"))
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(())
    }
}

// Deserialized values go back through `Money::of` so the scale invariant holds.
#[derive(Deserialize)]
struct RawMoney {
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
    currency: CurrencyCode,
}

impl From<RawMoney> for Money {
    fn from(raw: RawMoney) -> Self {
        Money::of(raw.amount, raw.currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
