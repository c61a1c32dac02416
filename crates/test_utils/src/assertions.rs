//! Custom Test Assertions
//!
//! Assertion helpers for domain types that give more meaningful error
//! messages than standard assertions.

use core_kernel::Money;
use domain_billing::ledger::CustomerLedger;

/// Asserts that two Money values are exactly equal, reporting both sides
pub fn assert_money_eq(actual: Money, expected: Money, context: &str) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "{}: currency mismatch (actual={}, expected={})",
        context,
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "{}: expected {}, got {}",
        context,
        expected,
        actual
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: Money, context: &str) {
    assert!(
        money.is_zero(),
        "{}: expected zero, got {}",
        context,
        money
    );
}

/// Asserts every financial invariant of a ledger at once
///
/// - the cached balance matches the journal replay
/// - every invoice conserves `paid + pending + discount relief == total`
/// - journal snapshots are the prefix sum of the entries
pub fn assert_ledger_consistent(ledger: &CustomerLedger) {
    ledger
        .verify_integrity()
        .expect("Cached balance diverged from journal replay");

    for invoice in ledger.invoices() {
        let accounted = invoice.paid_amount + invoice.pending_amount + invoice.discount_relief();
        assert_eq!(
            accounted, invoice.total_amount,
            "Invoice {} does not conserve amounts: paid {} + pending {} + relief {} != total {}",
            invoice.invoice_number,
            invoice.paid_amount,
            invoice.pending_amount,
            invoice.discount_relief(),
            invoice.total_amount
        );
        assert!(
            !invoice.pending_amount.is_negative(),
            "Invoice {} has negative pending amount {}",
            invoice.invoice_number,
            invoice.pending_amount
        );
    }

    let mut running = Money::zero(ledger.customer().currency);
    for entry in ledger.journal_entries() {
        running = running + entry.debit - entry.credit;
        assert_eq!(
            entry.balance, running,
            "Journal snapshot for {} drifted from the prefix sum",
            entry.reference_number
        );
    }
}
