//! Storage adapters owned by the domain crate
//!
//! The PostgreSQL adapter lives in `infra_db`; the in-memory adapter here
//! backs the test suite and embedded use.

pub mod memory;

pub use memory::InMemoryBillingStore;
