// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Value objects
// - Events
// - Commands
// - Errors
// - Aggregate implementation
// - Repository contracts
// - Command handler
//
// `common` holds the value objects both aggregates share.
//
// ============================================================================

pub mod common;
pub mod account;
pub mod customer;
