// ============================================================================
// Customer Domain
// ============================================================================
//
// Everything specific to customers:
// - Value objects (Email, Name, Address, PhoneNumber, Password, status)
// - Password encoding contract and the default encoder
// - Customer aggregate (immutable-with-replacement updates)
// - Created/Updated/Deleted event schema and the mapping into it
// - Commands, repositories (command store + auth store), email uniqueness
//   and the command handler running the registration saga
//
// ============================================================================

pub mod value_objects;
pub mod password;
pub mod errors;
pub mod aggregate;
pub mod events;
pub mod commands;
pub mod repository;
pub mod domain_service;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use password::*;
pub use errors::*;
pub use aggregate::*;
pub use events::*;
pub use commands::*;
pub use repository::*;
pub use domain_service::*;
pub use command_handler::*;
