//! Billing Domain - Customer Ledger and Payment Allocation
//!
//! This crate implements the financial core of the billing system: the
//! append-only customer journal that backs every balance, the FIFO
//! algorithm that applies an incoming payment across an opening balance and
//! outstanding invoices, the discount rule, and the reversal and
//! recalculation logic triggered by edits and deletes.
//!
//! # Balance model
//!
//! Each customer has one ledger. Debits increase what the customer owes,
//! credits decrease it, and the cached `current_balance` always equals the
//! signed sum of the journal in `(date, created_at)` order.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BillingService, InMemoryBillingStore, NewPayment};
//!
//! let service = BillingService::new(Arc::new(InMemoryBillingStore::new()));
//!
//! // Apply a payment FIFO across the opening balance and open invoices
//! let payment = service.create_payment(NewPayment { .. }).await?;
//! ```

pub mod adapters;
pub mod allocation;
pub mod customer;
pub mod discount;
pub mod error;
pub mod invoice;
pub mod journal;
pub mod ledger;
pub mod payment;
pub mod ports;
pub mod services;

pub use adapters::InMemoryBillingStore;
pub use allocation::{allocate, Allocation, AllocationInput, InvoiceAllocation, OutstandingInvoice};
pub use customer::CustomerAccount;
pub use discount::Discount;
pub use error::BillingError;
pub use invoice::{Invoice, InvoiceItem, InvoiceStatus};
pub use journal::{CustomerJournal, EntryType, JournalEntry, LedgerStatement, StatementLine};
pub use ledger::{CustomerLedger, DiscountInput, PaymentInput};
pub use payment::{
    format_payment_number, PayeeType, Payment, PaymentDistribution, PaymentMethod, PaymentStatus,
};
pub use ports::BillingStore;
pub use services::{BillingService, NewCustomer, NewDiscount, NewInvoice, NewPayment};
