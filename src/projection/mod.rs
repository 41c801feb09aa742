use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::common::{CurrencyCode, Money, MoneyError};
use crate::errors::{AppError, RepositoryError};
use crate::utils::IsTransient;

// ============================================================================
// Read-Side Projection
// ============================================================================
//
// Projectors fold Created / Updated / Deleted events into the read store.
// Every handler is idempotent so at-least-once delivery is safe:
//
// - Created: insert, or complete a backfill row, or no-op on redelivery
// - Updated: apply when its sequence number is above the row's, no-op when
//   equal, skip when lower; synthesize a backfill row when the Created
//   event has not been seen yet
// - Deleted: leave a tombstone and drop the row, absent rows are fine
//
// Each event kind has its own topic, so Deleted may overtake the Created or
// Updated events before it. Once an id is tombstoned, Created and Updated
// for it are ignored. Ordering uses the envelope sequence number (the
// aggregate version), never wall-clock timestamps.
//
// ============================================================================

pub mod account;
pub mod customer;
pub mod runner;

pub use account::AccountProjector;
pub use customer::CustomerProjector;
pub use runner::{ProjectionRunner, RunOutcome};

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Unknown status '{0}'")]
    UnknownStatus(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Read store failure: {0}")]
    Store(#[from] RepositoryError),
}

impl ProjectionError {
    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            ProjectionError::InvalidPayload(_) => "invalid_payload",
            ProjectionError::UnknownStatus(_) => "unknown_status",
            ProjectionError::InvalidAmount(_) => "invalid_amount",
            ProjectionError::Store(_) => "store",
        }
    }
}

impl From<MoneyError> for ProjectionError {
    fn from(error: MoneyError) -> Self {
        ProjectionError::InvalidAmount(error.to_string())
    }
}

impl IsTransient for ProjectionError {
    fn is_transient(&self) -> bool {
        matches!(self, ProjectionError::Store(_))
    }
}

impl From<ProjectionError> for AppError {
    fn from(error: ProjectionError) -> Self {
        AppError::Consistency(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// Created applied to an empty slot
    Inserted,
    /// Created filled in a backfill row
    Completed,
    /// Created seen again for a complete row
    Duplicate,
    Updated,
    /// Updated arrived first; row written with `needs_backfill`
    Synthesized,
    /// Updated older than what the row already holds
    SkippedStale,
    /// Created or Updated for an aggregate already deleted
    SkippedDeleted,
    Deleted,
    AlreadyAbsent,
}

impl ProjectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionOutcome::Inserted => "inserted",
            ProjectionOutcome::Completed => "completed",
            ProjectionOutcome::Duplicate => "duplicate",
            ProjectionOutcome::Updated => "updated",
            ProjectionOutcome::Synthesized => "synthesized",
            ProjectionOutcome::SkippedStale => "skipped_stale",
            ProjectionOutcome::SkippedDeleted => "skipped_deleted",
            ProjectionOutcome::Deleted => "deleted",
            ProjectionOutcome::AlreadyAbsent => "already_absent",
        }
    }
}

/// Applies one JSON-encoded event envelope to the read store.
#[async_trait]
pub trait ProjectionHandler: Send + Sync {
    /// Aggregate family handled, used for metrics and logs
    fn aggregate(&self) -> &'static str;

    async fn handle(&self, payload: &str) -> Result<ProjectionOutcome, ProjectionError>;
}

/// Closed-enum parse of a wire status; unknown names fail the event.
pub(crate) fn parse_status<S: FromStr>(value: &str) -> Result<S, ProjectionError> {
    value
        .parse()
        .map_err(|_| ProjectionError::UnknownStatus(value.to_string()))
}

/// Exact conversion of a wire amount to minor units. Amounts with more than
/// two significant decimals are rejected rather than rounded.
pub(crate) fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64, ProjectionError> {
    let currency = CurrencyCode::new(currency)?;
    if amount.normalize().scale() > 2 {
        return Err(ProjectionError::InvalidAmount(amount.to_string()));
    }
    Ok(Money::of(amount, currency).minor_units()?)
}
