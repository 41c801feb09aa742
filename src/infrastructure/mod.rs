// ============================================================================
// Infrastructure Adapters
// ============================================================================
//
// postgres: command store, outbox, dead letters, auth store
// scylladb: read store
// memory:   in-process stand-ins for all of the above plus the broker
//
// ============================================================================

pub mod memory;
pub mod postgres;
pub mod scylladb;
