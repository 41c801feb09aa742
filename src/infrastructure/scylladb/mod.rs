pub mod account_read;
pub mod customer_read;
pub mod schema;
mod tombstone;

pub use account_read::ScyllaAccountReadRepository;
pub use customer_read::ScyllaCustomerReadRepository;
pub use schema::ensure_read_schema;
