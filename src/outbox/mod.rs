pub mod message;
pub mod relay;
pub mod store;

pub use message::OutboxMessage;
pub use relay::{OutboxRelay, RelayConfig, RelayReport};
pub use store::OutboxStore;
