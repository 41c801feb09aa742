// ============================================================================
// Shared Domain Types
// ============================================================================
//
// Value objects and ports used by more than one aggregate.
//
// ============================================================================

pub mod account_number;
pub mod clock;
pub mod money;

pub use account_number::{AccountNumber, AccountNumberError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use money::{CurrencyCode, Money, MoneyError};
