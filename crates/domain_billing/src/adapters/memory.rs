//! In-memory billing store
//!
//! Reference implementation of the storage port. Save replaces the whole
//! aggregate under a write lock, which gives the same all-or-nothing
//! contract the PostgreSQL adapter provides with a transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use core_kernel::CustomerId;

use crate::error::BillingError;
use crate::ledger::CustomerLedger;
use crate::ports::BillingStore;

/// HashMap-backed store for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    ledgers: RwLock<HashMap<CustomerId, CustomerLedger>>,
    sequences: RwLock<HashMap<i32, u32>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn load(&self, customer_id: CustomerId) -> Result<CustomerLedger, BillingError> {
        self.ledgers
            .read()
            .await
            .get(&customer_id)
            .cloned()
            .ok_or_else(|| BillingError::CustomerNotFound(customer_id.to_string()))
    }

    async fn create(&self, ledger: &CustomerLedger) -> Result<(), BillingError> {
        let mut ledgers = self.ledgers.write().await;
        let customer_id = ledger.customer().id;
        if ledgers.contains_key(&customer_id) {
            return Err(BillingError::state_conflict(format!(
                "Customer {} already exists",
                customer_id
            )));
        }
        ledgers.insert(customer_id, ledger.clone());
        Ok(())
    }

    async fn save(&self, ledger: &CustomerLedger) -> Result<(), BillingError> {
        let mut ledgers = self.ledgers.write().await;
        let customer_id = ledger.customer().id;
        if !ledgers.contains_key(&customer_id) {
            return Err(BillingError::CustomerNotFound(customer_id.to_string()));
        }
        ledgers.insert(customer_id, ledger.clone());
        Ok(())
    }

    async fn payment_number_taken(&self, payment_number: &str) -> Result<bool, BillingError> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.values().any(|ledger| {
            ledger
                .payments()
                .any(|payment| payment.payment_number == payment_number)
        }))
    }

    async fn next_payment_sequence(&self, year: i32) -> Result<u32, BillingError> {
        let mut sequences = self.sequences.write().await;
        let sequence = sequences.entry(year).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }
}
