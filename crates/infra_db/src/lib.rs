//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the customer ledger core, implementing the
//! storage port defined by `domain_billing` on SQLx.
//!
//! # Atomicity
//!
//! A customer's ledger saves as one aggregate in one transaction with the
//! customer row locked `FOR UPDATE`. That boundary is what keeps a payment
//! from ever being recorded without its journal entry or distribution rows;
//! a storage failure anywhere rolls the whole operation back.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool_from_url, run_migrations, PgBillingStore};
//!
//! let pool = create_pool_from_url("postgres://localhost/ledger").await?;
//! run_migrations(&pool).await?;
//! let store = PgBillingStore::new(pool);
//! let service = BillingService::new(Arc::new(store));
//! ```

pub mod error;
pub mod pool;
pub mod repositories;

pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
pub use repositories::PgBillingStore;
