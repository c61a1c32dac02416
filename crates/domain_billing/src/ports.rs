//! Storage port for the billing domain
//!
//! The domain defines the trait; adapters implement it. The contract is
//! aggregate-oriented: a whole customer ledger loads and saves as one unit,
//! and `save` is atomic. Either every row of the aggregate is persisted or
//! none is; that single rule is what keeps a payment from ever being
//! recorded without its journal entry.

use async_trait::async_trait;

use core_kernel::CustomerId;

use crate::error::BillingError;
use crate::ledger::CustomerLedger;

/// Atomic per-customer storage for ledgers
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Loads a customer's full ledger
    ///
    /// # Errors
    ///
    /// `CustomerNotFound` for an unknown customer, `Persistence` on
    /// storage failure.
    async fn load(&self, customer_id: CustomerId) -> Result<CustomerLedger, BillingError>;

    /// Persists a new customer's ledger
    ///
    /// # Errors
    ///
    /// `StateConflict` when the customer already exists.
    async fn create(&self, ledger: &CustomerLedger) -> Result<(), BillingError>;

    /// Atomically replaces a customer's persisted state with the aggregate
    ///
    /// # Errors
    ///
    /// `Persistence` on storage failure; on error nothing is written.
    async fn save(&self, ledger: &CustomerLedger) -> Result<(), BillingError>;

    /// Returns true when a payment number is already in use by any customer
    async fn payment_number_taken(&self, payment_number: &str) -> Result<bool, BillingError>;

    /// Next value of the year-scoped payment sequence (monotonic within a
    /// year, resets each year)
    async fn next_payment_sequence(&self, year: i32) -> Result<u32, BillingError>;
}
