// ============================================================================
// Account Domain
// ============================================================================
//
// Everything specific to bank accounts:
// - Status value object and the transition table that gates it
// - Account aggregate (balance + status state machine)
// - Created/Updated/Deleted event schema and the mapping into it
// - Commands, the command repository contract and the command handler
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod transitions;
pub mod aggregate;
pub mod events;
pub mod commands;
pub mod repository;
pub mod command_handler;

pub use value_objects::*;
pub use errors::*;
pub use transitions::*;
pub use aggregate::*;
pub use events::*;
pub use commands::*;
pub use repository::*;
pub use command_handler::*;
