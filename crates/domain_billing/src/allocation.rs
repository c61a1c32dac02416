//! FIFO payment allocation
//!
//! Pure, deterministic distribution of a received amount across the
//! remaining opening balance and outstanding invoices, oldest due date
//! first. Calling [`allocate`] twice with the same input yields the same
//! output; there is no clock, no randomness and no side effect here, which
//! is what lets callers recompute the split on every form change.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{InvoiceId, Money};

/// An invoice eligible to receive part of a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstandingInvoice {
    /// Invoice identifier
    pub invoice_id: InvoiceId,
    /// Invoice number, used as the final ordering tie-break
    pub invoice_number: String,
    /// Due date (primary FIFO key)
    pub due_date: NaiveDate,
    /// Creation timestamp (first tie-break)
    pub created_at: DateTime<Utc>,
    /// Unpaid portion
    pub pending_amount: Money,
}

/// Input to the allocation engine
#[derive(Debug, Clone)]
pub struct AllocationInput {
    /// Cash received
    pub total_amount: Money,
    /// Discount granted alongside the payment (not cash)
    pub discount_amount: Money,
    /// Unrelieved portion of the customer's opening balance
    pub opening_balance_remaining: Money,
    /// Invoices with a positive pending amount
    pub outstanding_invoices: Vec<OutstandingInvoice>,
}

/// Cash and discount routed to a single invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAllocation {
    /// Target invoice
    pub invoice_id: InvoiceId,
    /// Invoice number (carried for distribution purposes)
    pub invoice_number: String,
    /// Cash applied
    pub amount: Money,
    /// Discount applied
    pub discount: Money,
}

/// Result of a FIFO run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Cash applied against the opening balance
    pub opening_balance_applied: Money,
    /// Per-invoice applications, in FIFO order
    pub invoices: Vec<InvoiceAllocation>,
    /// Cash left over after every known obligation; callers must treat a
    /// positive remainder as an error or an explicit credit
    pub unallocated: Money,
}

impl Allocation {
    /// Total cash placed on invoices
    pub fn invoice_cash_total(&self) -> Money {
        let zero = Money::zero(self.opening_balance_applied.currency());
        self.invoices.iter().fold(zero, |acc, a| acc + a.amount)
    }

    /// Total discount placed on invoices
    pub fn discount_total(&self) -> Money {
        let zero = Money::zero(self.opening_balance_applied.currency());
        self.invoices.iter().fold(zero, |acc, a| acc + a.discount)
    }
}

/// Distributes `total_amount` across the opening balance and outstanding
/// invoices, oldest due date first
///
/// Ordering: ascending `(due_date, created_at, invoice_number)`. The
/// opening balance is relieved before any invoice; every other invoice
/// receives plain `min(pending, remaining)`. The discount rides at the end
/// of the cash run: it lands on the invoice the cash runs out inside of
/// (`cash = min(max(0, pending - discount), remaining)`), or on the next
/// invoice with no cash portion when the cash ends exactly at a boundary.
/// This models a discount granted specifically to close out the final
/// invoice of the run. Cash displaced by the discount keeps flowing to
/// later invoices; iteration stops only once nothing remains to place or
/// the invoices are exhausted.
///
/// Invoices with no pending amount are skipped. No cash at all with an
/// unplaced discount attaches the discount to the oldest outstanding
/// invoice; a discount left unplaced because cash covered every invoice is
/// reported as zero discount here and becomes a goodwill credit upstream.
pub fn allocate(input: &AllocationInput) -> Allocation {
    let currency = input.total_amount.currency();
    let zero = Money::zero(currency);

    let mut invoices: Vec<&OutstandingInvoice> = input
        .outstanding_invoices
        .iter()
        .filter(|invoice| invoice.pending_amount.is_positive())
        .collect();
    invoices.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.invoice_number.cmp(&b.invoice_number))
    });

    let mut remaining = input.total_amount.clamp_non_negative();
    let mut discount_left = input.discount_amount.clamp_non_negative();
    let mut opening_balance_applied = zero;

    if input.opening_balance_remaining.is_positive() && remaining.is_positive() {
        opening_balance_applied = input.opening_balance_remaining.min(remaining);
        remaining = remaining - opening_balance_applied;
    }

    let mut applied = Vec::new();

    for invoice in &invoices {
        if remaining.is_zero() && discount_left.is_zero() {
            break;
        }

        if remaining.is_zero() {
            // Cash exhausted exactly at an invoice boundary: the trailing
            // discount lands here with no cash portion.
            applied.push(InvoiceAllocation {
                invoice_id: invoice.invoice_id,
                invoice_number: invoice.invoice_number.clone(),
                amount: zero,
                discount: invoice.pending_amount.min(discount_left),
            });
            discount_left = zero;
            break;
        }

        if discount_left.is_positive()
            && remaining.amount() < invoice.pending_amount.amount()
        {
            // Cash runs out inside this invoice: the discount closes it
            // out, shrinking the effective need before the cash portion.
            // Cash the discount displaces keeps flowing to later invoices.
            let effective_needed =
                (invoice.pending_amount - discount_left).clamp_non_negative();
            let cash = effective_needed.min(remaining);
            applied.push(InvoiceAllocation {
                invoice_id: invoice.invoice_id,
                invoice_number: invoice.invoice_number.clone(),
                amount: cash,
                discount: invoice.pending_amount.min(discount_left),
            });
            remaining = remaining - cash;
            discount_left = zero;
            continue;
        }

        let cash = invoice.pending_amount.min(remaining);
        applied.push(InvoiceAllocation {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number.clone(),
            amount: cash,
            discount: zero,
        });
        remaining = remaining - cash;
    }

    Allocation {
        opening_balance_applied,
        invoices: applied,
        unallocated: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_kernel::Currency;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn pkr(amount: Decimal) -> Money {
        Money::new(amount, Currency::PKR)
    }

    fn outstanding(number: &str, due: (i32, u32, u32), pending: Decimal) -> OutstandingInvoice {
        OutstandingInvoice {
            invoice_id: InvoiceId::new_v7(),
            invoice_number: number.to_string(),
            due_date: NaiveDate::from_ymd_opt(due.0, due.1, due.2).unwrap(),
            created_at: Utc.with_ymd_and_hms(due.0, due.1, due.2, 9, 0, 0).unwrap(),
            pending_amount: pkr(pending),
        }
    }

    #[test]
    fn test_opening_balance_relieved_first() {
        let input = AllocationInput {
            total_amount: pkr(dec!(3000)),
            discount_amount: pkr(dec!(0)),
            opening_balance_remaining: pkr(dec!(5000)),
            outstanding_invoices: vec![outstanding("INV-1", (2024, 1, 1), dec!(10000))],
        };

        let result = allocate(&input);

        assert_eq!(result.opening_balance_applied, pkr(dec!(3000)));
        assert!(result.invoices.is_empty());
        assert!(result.unallocated.is_zero());
    }

    #[test]
    fn test_oldest_due_date_first() {
        let newer = outstanding("INV-2", (2024, 2, 1), dec!(500));
        let older = outstanding("INV-1", (2024, 1, 1), dec!(500));
        let input = AllocationInput {
            total_amount: pkr(dec!(600)),
            discount_amount: pkr(dec!(0)),
            opening_balance_remaining: pkr(dec!(0)),
            outstanding_invoices: vec![newer, older.clone()],
        };

        let result = allocate(&input);

        assert_eq!(result.invoices[0].invoice_id, older.invoice_id);
        assert_eq!(result.invoices[0].amount, pkr(dec!(500)));
        assert_eq!(result.invoices[1].amount, pkr(dec!(100)));
        assert!(result.unallocated.is_zero());
    }

    /// The worked example: opening balance 5,000; invoices due Jan (10,000)
    /// and Feb (8,000); payment 15,000 with a 2,000 discount. The discount
    /// closes part of the February invoice even though no cash reaches it.
    #[test]
    fn test_discount_lands_on_invoice_after_cash_exhausts() {
        let january = outstanding("INV-1", (2024, 1, 1), dec!(10000));
        let february = outstanding("INV-2", (2024, 2, 1), dec!(8000));
        let input = AllocationInput {
            total_amount: pkr(dec!(15000)),
            discount_amount: pkr(dec!(2000)),
            opening_balance_remaining: pkr(dec!(5000)),
            outstanding_invoices: vec![january.clone(), february.clone()],
        };

        let result = allocate(&input);

        assert_eq!(result.opening_balance_applied, pkr(dec!(5000)));
        assert_eq!(result.invoices.len(), 2);

        assert_eq!(result.invoices[0].invoice_id, january.invoice_id);
        assert_eq!(result.invoices[0].amount, pkr(dec!(10000)));
        assert!(result.invoices[0].discount.is_zero());

        assert_eq!(result.invoices[1].invoice_id, february.invoice_id);
        assert!(result.invoices[1].amount.is_zero());
        assert_eq!(result.invoices[1].discount, pkr(dec!(2000)));

        assert!(result.unallocated.is_zero());
    }

    #[test]
    fn test_discount_shrinks_final_invoice_cash() {
        let invoice = outstanding("INV-1", (2024, 1, 1), dec!(1000));
        let input = AllocationInput {
            total_amount: pkr(dec!(800)),
            discount_amount: pkr(dec!(200)),
            opening_balance_remaining: pkr(dec!(0)),
            outstanding_invoices: vec![invoice],
        };

        let result = allocate(&input);

        // 200 discount leaves 800 effective need, exactly covered by cash.
        assert_eq!(result.invoices[0].amount, pkr(dec!(800)));
        assert_eq!(result.invoices[0].discount, pkr(dec!(200)));
        assert!(result.unallocated.is_zero());
    }

    #[test]
    fn test_overpayment_leaves_unallocated_remainder() {
        let invoice = outstanding("INV-1", (2024, 1, 1), dec!(1000));
        let input = AllocationInput {
            total_amount: pkr(dec!(1500)),
            discount_amount: pkr(dec!(0)),
            opening_balance_remaining: pkr(dec!(0)),
            outstanding_invoices: vec![invoice],
        };

        let result = allocate(&input);

        assert_eq!(result.invoices[0].amount, pkr(dec!(1000)));
        assert_eq!(result.unallocated, pkr(dec!(500)));
    }

    #[test]
    fn test_discount_only_attaches_to_oldest_invoice() {
        let older = outstanding("INV-1", (2024, 1, 1), dec!(700));
        let newer = outstanding("INV-2", (2024, 2, 1), dec!(300));
        let input = AllocationInput {
            total_amount: pkr(dec!(0)),
            discount_amount: pkr(dec!(250)),
            opening_balance_remaining: pkr(dec!(400)),
            outstanding_invoices: vec![newer, older.clone()],
        };

        let result = allocate(&input);

        assert!(result.opening_balance_applied.is_zero());
        assert_eq!(result.invoices.len(), 1);
        assert_eq!(result.invoices[0].invoice_id, older.invoice_id);
        assert!(result.invoices[0].amount.is_zero());
        assert_eq!(result.invoices[0].discount, pkr(dec!(250)));
    }

    #[test]
    fn test_tie_break_on_created_at_then_number() {
        let mut first = outstanding("INV-B", (2024, 1, 15), dec!(100));
        let mut second = outstanding("INV-A", (2024, 1, 15), dec!(100));
        let created = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        first.created_at = created;
        second.created_at = created;

        let input = AllocationInput {
            total_amount: pkr(dec!(100)),
            discount_amount: pkr(dec!(0)),
            opening_balance_remaining: pkr(dec!(0)),
            outstanding_invoices: vec![first, second],
        };

        let result = allocate(&input);

        // Same due date and created_at: invoice number decides.
        assert_eq!(result.invoices[0].invoice_number, "INV-A");
    }

    #[test]
    fn test_allocation_is_deterministic() {
        let input = AllocationInput {
            total_amount: pkr(dec!(12345.67)),
            discount_amount: pkr(dec!(432.10)),
            opening_balance_remaining: pkr(dec!(2500)),
            outstanding_invoices: vec![
                outstanding("INV-1", (2024, 1, 5), dec!(4000)),
                outstanding("INV-2", (2024, 1, 20), dec!(6500.50)),
                outstanding("INV-3", (2024, 3, 1), dec!(9000)),
            ],
        };

        assert_eq!(allocate(&input), allocate(&input));
    }
}
