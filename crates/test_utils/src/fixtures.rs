//! Pre-built Test Fixtures
//!
//! Ready-to-use test data for the ledger test suite, designed to be
//! consistent and predictable across unit tests.

use chrono::NaiveDate;
use core_kernel::{Currency, Money};
use fake::faker::company::en::CompanyName;
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// A standard PKR amount
    pub fn pkr_1000() -> Money {
        Money::new(dec!(1000.00), Currency::PKR)
    }

    /// A typical invoice total
    pub fn pkr_invoice_total() -> Money {
        Money::new(dec!(10000.00), Currency::PKR)
    }

    /// A typical opening balance
    pub fn pkr_opening_balance() -> Money {
        Money::new(dec!(5000.00), Currency::PKR)
    }

    /// A zero amount
    pub fn pkr_zero() -> Money {
        Money::zero(Currency::PKR)
    }

    /// A USD amount for currency mismatch tests
    pub fn usd_1000() -> Money {
        Money::new(dec!(1000.00), Currency::USD)
    }

    /// An arbitrary amount in PKR
    pub fn pkr(amount: Decimal) -> Money {
        Money::new(amount, Currency::PKR)
    }
}

/// Fixture for date test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// The standard opening-balance date
    pub fn opening_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 12, 1).unwrap()
    }

    /// A January due date (oldest in FIFO tests)
    pub fn january_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    /// A February due date
    pub fn february_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    /// The standard payment date, after both due dates
    pub fn payment_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()
    }
}

/// Fixture for display strings
pub struct StringFixtures;

impl StringFixtures {
    /// A generated trading-company customer name
    pub fn customer_name() -> String {
        CompanyName().fake()
    }

    /// A deterministic invoice number
    pub fn invoice_number(sequence: u32) -> String {
        format!("INV-{:04}", sequence)
    }

    /// A deterministic payment number in the 2024 sequence
    pub fn payment_number(sequence: u32) -> String {
        format!("PAY-2024-{:04}", sequence)
    }
}
