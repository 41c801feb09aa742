pub mod account_repository;
pub mod customer_repository;
pub mod dlq_store;
pub mod outbox_store;
pub mod schema;

pub use account_repository::PgAccountCommandRepository;
pub use customer_repository::{PgAuthRepository, PgCustomerCommandRepository};
pub use dlq_store::PgDeadLetterStore;
pub use outbox_store::PgOutboxStore;
pub use schema::{ensure_auth_schema, ensure_command_schema};
