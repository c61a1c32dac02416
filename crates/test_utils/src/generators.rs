//! Property-Based Test Generators
//!
//! Proptest strategies for generating random ledger data that maintains
//! domain invariants.

use chrono::{Days, NaiveDate, Utc};
use core_kernel::{Currency, InvoiceId, Money};
use proptest::prelude::*;

use domain_billing::allocation::{AllocationInput, OutstandingInvoice};

/// Strategy for positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000_00i64
}

/// Strategy for non-negative amounts in minor units
pub fn amount_minor_strategy() -> impl Strategy<Value = i64> {
    0i64..1_000_000_00i64
}

/// Strategy for positive PKR Money values
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(|minor| Money::from_minor(minor, Currency::PKR))
}

/// Strategy for non-negative PKR Money values
pub fn money_strategy() -> impl Strategy<Value = Money> {
    amount_minor_strategy().prop_map(|minor| Money::from_minor(minor, Currency::PKR))
}

/// Strategy for a due date in the first quarter of 2024
pub fn due_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0u64..90u64).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(offset)
    })
}

/// Strategy for a single outstanding invoice
pub fn outstanding_invoice_strategy() -> impl Strategy<Value = OutstandingInvoice> {
    (positive_amount_minor_strategy(), due_date_strategy(), 0u32..10_000u32).prop_map(
        |(pending, due_date, number)| OutstandingInvoice {
            invoice_id: InvoiceId::new_v7(),
            invoice_number: format!("INV-{:05}", number),
            due_date,
            created_at: Utc::now(),
            pending_amount: Money::from_minor(pending, Currency::PKR),
        },
    )
}

/// Strategy for a full allocation input
pub fn allocation_input_strategy() -> impl Strategy<Value = AllocationInput> {
    (
        money_strategy(),
        money_strategy(),
        money_strategy(),
        prop::collection::vec(outstanding_invoice_strategy(), 0..10),
    )
        .prop_map(
            |(total_amount, discount_amount, opening_balance_remaining, outstanding_invoices)| {
                AllocationInput {
                    total_amount,
                    discount_amount,
                    opening_balance_remaining,
                    outstanding_invoices,
                }
            },
        )
}
