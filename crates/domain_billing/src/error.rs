//! Billing domain errors

use chrono::NaiveDate;
use core_kernel::MoneyError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in the billing domain
///
/// Every rejected operation carries a specific, actionable message: these
/// are financial decisions surfaced to the end user, not internal codes.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Bad input rejected before any mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Customer not found
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Invoice not found
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    /// Payment not found
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Discount not found
    #[error("Discount not found: {0}")]
    DiscountNotFound(String),

    /// Journal entry not found
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),

    /// Operation conflicts with the entity's current state
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Cheque or parchi instruments cannot be cleared before their date
    #[error("Instrument dated {instrument_date} is in the future and cannot be marked completed")]
    FutureInstrumentDate { instrument_date: NaiveDate },

    /// Allocation asked an invoice for more than it has outstanding
    #[error("Payment of {requested} exceeds pending amount of {pending}")]
    Overpayment { requested: Decimal, pending: Decimal },

    /// Discount exceeds the customer's total outstanding balance
    #[error("Discount of {requested} exceeds outstanding balance of {outstanding}")]
    DiscountExceedsBalance {
        requested: Decimal,
        outstanding: Decimal,
    },

    /// Payment number already in use
    #[error("Duplicate payment number: {0}")]
    DuplicatePaymentNumber(String),

    /// Cash received beyond every recorded obligation
    #[error("Received amount leaves {remainder} unallocated; no matching obligation exists")]
    UnappliedPayment { remainder: Decimal },

    /// Storage layer failure; the operation was rolled back
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Cached balance diverged from the journal replay
    #[error("Balance invariant violated: cached {cached}, journal replay {computed}")]
    InvariantViolation { cached: Decimal, computed: Decimal },

    /// Money arithmetic error
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        BillingError::StateConflict(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        BillingError::Persistence(message.into())
    }
}
