use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::CustomerError;
use super::password::PasswordEncoder;

// ============================================================================
// Customer Value Objects
// ============================================================================

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+$").expect("static regex"));

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9][0-9]{1,14}$").expect("static regex"));

const PASSWORD_MIN_LENGTH: usize = 8;
const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*()-_=+[]{};:'\",.<>/?\\|`~";

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Customer email address. Keeps the spelling it was given but compares
/// and hashes case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn new(value: impl Into<String>) -> Result<Self, CustomerError> {
        let value = value.into();
        if !EMAIL_PATTERN.is_match(&value) {
            return Err(CustomerError::InvalidEmail(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used as the lookup key.
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

impl PartialEq for Email {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Email {}

impl Hash for Email {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = CustomerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

/// Personal name; middle name is optional and dropped when blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    first: String,
    middle: Option<String>,
    last: String,
}

impl Name {
    pub fn new(
        first: impl Into<String>,
        middle: Option<String>,
        last: impl Into<String>,
    ) -> Result<Self, CustomerError> {
        let (first, last) = (first.into(), last.into());
        if is_blank(&first) || is_blank(&last) {
            return Err(CustomerError::InvalidName);
        }
        Ok(Self {
            first,
            middle: middle.filter(|m| !is_blank(m)),
            last,
        })
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn middle(&self) -> Option<&str> {
        self.middle.as_deref()
    }

    pub fn last(&self) -> &str {
        &self.last
    }

    /// "First Last" or "First Middle Last"
    pub fn full_name(&self) -> String {
        match &self.middle {
            Some(middle) => format!("{} {} {}", self.first, middle, self.last),
            None => format!("{} {}", self.first, self.last),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    country: String,
    state: String,
    city: String,
    street: String,
    postal_code: String,
}

impl Address {
    pub fn new(
        country: impl Into<String>,
        state: impl Into<String>,
        city: impl Into<String>,
        street: impl Into<String>,
        postal_code: impl Into<String>,
    ) -> Result<Self, CustomerError> {
        let address = Self {
            country: country.into(),
            state: state.into(),
            city: city.into(),
            street: street.into(),
            postal_code: postal_code.into(),
        };

        let fields = [
            &address.country,
            &address.state,
            &address.city,
            &address.street,
            &address.postal_code,
        ];
        if fields.iter().any(|field| is_blank(field)) {
            return Err(CustomerError::InvalidAddress);
        }
        Ok(address)
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn postal_code(&self) -> &str {
        &self.postal_code
    }

    /// Single-line form: street, city, state, postal code, country
    pub fn full_address(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}",
            self.street, self.city, self.state, self.postal_code, self.country
        )
    }
}

/// E.164-style phone number: optional `+`, no leading zero, 2-15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(value: impl Into<String>) -> Result<Self, CustomerError> {
        let value = value.into();
        if !PHONE_PATTERN.is_match(&value) {
            return Err(CustomerError::InvalidPhoneNumber(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = CustomerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

/// Encoded password. The raw value never lives past `encode`.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Check the strength rules on the raw value and encode it.
    pub fn encode(raw: &str, encoder: &dyn PasswordEncoder) -> Result<Self, CustomerError> {
        let long_enough = raw.trim().chars().count() >= PASSWORD_MIN_LENGTH;
        let has_upper = raw.chars().any(|c| c.is_ascii_uppercase());
        let has_special = raw.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c));

        if !(long_enough && has_upper && has_special) {
            return Err(CustomerError::InvalidPassword);
        }
        Self::from_hashed(encoder.encode(raw))
    }

    /// Wrap a hash loaded from storage.
    pub fn from_hashed(hash: impl Into<String>) -> Result<Self, CustomerError> {
        let hash = hash.into();
        if is_blank(&hash) {
            return Err(CustomerError::BlankPasswordHash);
        }
        Ok(Self(hash))
    }

    pub fn matches(&self, raw: &str, encoder: &dyn PasswordEncoder) -> bool {
        encoder.matches(raw, &self.0)
    }

    pub fn hash(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([PROTECTED])")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[PROTECTED]")
    }
}

/// Customer lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Suspended,
    Closed,
}

impl CustomerStatus {
    pub const ALL: [CustomerStatus; 4] = [
        CustomerStatus::Active,
        CustomerStatus::Inactive,
        CustomerStatus::Suspended,
        CustomerStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Active => "ACTIVE",
            CustomerStatus::Inactive => "INACTIVE",
            CustomerStatus::Suspended => "SUSPENDED",
            CustomerStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustomerStatus {
    type Err = CustomerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CustomerStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CustomerError::UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::password::Sha256PasswordEncoder;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case("a@b.com", true)]
    #[case("first.last+tag@mail.example.org", true)]
    #[case("no-at-sign.com", false)]
    #[case("a@b@c.com", false)]
    #[case("space @b.com", false)]
    #[case("", false)]
    fn test_email_format(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(Email::new(input).is_ok(), valid, "{input}");
    }

    #[test]
    fn test_email_equality_ignores_case() {
        let lower = Email::new("a@b.com").unwrap();
        let upper = Email::new("A@B.COM").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(upper.as_str(), "A@B.COM");
        assert_eq!(upper.normalized(), "a@b.com");

        let mut set = HashSet::new();
        set.insert(lower);
        assert!(set.contains(&upper));
    }

    #[test]
    fn test_name_full_name() {
        let plain = Name::new("Ada", None, "Lovelace").unwrap();
        assert_eq!(plain.full_name(), "Ada Lovelace");

        let middle = Name::new("Ada", Some("King".into()), "Lovelace").unwrap();
        assert_eq!(middle.full_name(), "Ada King Lovelace");

        let blank_middle = Name::new("Ada", Some("  ".into()), "Lovelace").unwrap();
        assert_eq!(blank_middle.middle(), None);

        assert!(matches!(Name::new(" ", None, "Lovelace"), Err(CustomerError::InvalidName)));
        assert!(matches!(Name::new("Ada", None, ""), Err(CustomerError::InvalidName)));
    }

    #[test]
    fn test_address_requires_every_field() {
        let address = Address::new("KR", "Seoul", "Seoul", "1 Main St", "04524").unwrap();
        assert_eq!(address.full_address(), "1 Main St, Seoul, Seoul, 04524, KR");
        assert!(matches!(
            Address::new("KR", "Seoul", "Seoul", "1 Main St", " "),
            Err(CustomerError::InvalidAddress)
        ));
    }

    #[rstest]
    #[case("+821012345678", true)]
    #[case("4155552671", true)]
    #[case("0123456", false)]
    #[case("+1", false)]
    #[case("+1234567890123456", false)]
    #[case("555-1234", false)]
    #[case("+٩٧١٥٠١٢٣٤٥٦٧", false)]
    #[case("4１55552671", false)]
    fn test_phone_number_format(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(PhoneNumber::new(input).is_ok(), valid, "{input}");
    }

    #[rstest]
    #[case("Secret!23", true)]
    #[case("secret!23", false)]
    #[case("Secret123", false)]
    #[case("Se!1", false)]
    #[case("  Se!1  ", false)]
    fn test_password_strength(#[case] raw: &str, #[case] valid: bool) {
        let encoder = Sha256PasswordEncoder;
        assert_eq!(Password::encode(raw, &encoder).is_ok(), valid, "{raw}");
    }

    #[test]
    fn test_password_is_never_rendered() {
        let encoder = Sha256PasswordEncoder;
        let password = Password::encode("Secret!23", &encoder).unwrap();

        assert!(password.matches("Secret!23", &encoder));
        assert!(!password.matches("Secret!24", &encoder));
        assert!(!format!("{password:?}").contains(password.hash()));
        assert_eq!(password.to_string(), "[PROTECTED]");
        assert!(matches!(Password::from_hashed(" "), Err(CustomerError::BlankPasswordHash)));
    }

    #[test]
    fn test_customer_status_parsing() {
        for status in CustomerStatus::ALL {
            assert_eq!(status.as_str().parse::<CustomerStatus>().unwrap(), status);
        }
        assert!(matches!("DELETED".parse::<CustomerStatus>(), Err(CustomerError::UnknownStatus(_))));
    }
}
