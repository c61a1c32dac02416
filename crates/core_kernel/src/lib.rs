//! Core Kernel - Foundational types for the customer ledger system
//!
//! This crate provides the fundamental building blocks used across the
//! billing and ledger crates:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers for domain entities
//! - Common error types

pub mod error;
pub mod identifiers;
pub mod money;

pub use error::CoreError;
pub use identifiers::{
    CustomerId, DiscountId, DistributionId, InvoiceId, LedgerEntryId, PaymentId,
};
pub use money::{Currency, Money, MoneyError};
