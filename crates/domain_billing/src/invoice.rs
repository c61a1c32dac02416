//! Invoice management
//!
//! This module owns the paid/pending arithmetic on an invoice. The
//! conservation rule `paid_amount + pending_amount == total_amount` holds
//! after every apply/reverse operation; callers never set the fields
//! directly.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{Currency, CustomerId, InvoiceId, Money};

use crate::error::BillingError;

/// Invoice status
///
/// Status is derived from `(paid_amount, pending_amount, due_date)`;
/// `Draft`/`Sent` record whether the invoice has been issued, and
/// `Cancelled` is sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Invoice is being drafted
    Draft,
    /// Invoice has been issued to the customer
    Sent,
    /// Partial payment received
    Partial,
    /// Fully paid
    Paid,
    /// Past due date with nothing received
    Overdue,
    /// Cancelled/voided
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "partial" => InvoiceStatus::Partial,
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Draft,
        }
    }
}

/// A line item on an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    /// Item ID
    pub id: Uuid,
    /// Description
    pub description: String,
    /// Quantity
    pub quantity: Decimal,
    /// Unit price
    pub unit_price: Money,
}

impl InvoiceItem {
    /// Creates a new invoice item with quantity one
    pub fn new(description: impl Into<String>, unit_price: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            quantity: Decimal::ONE,
            unit_price,
        }
    }

    /// Sets the quantity
    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    /// Calculates the total for this item
    pub fn total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// An invoice against a customer's ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Invoice number (human-readable)
    pub invoice_number: String,
    /// Customer being billed
    pub customer_id: CustomerId,
    /// Issue date
    pub issue_date: NaiveDate,
    /// Due date
    pub due_date: NaiveDate,
    /// Line items
    pub items: Vec<InvoiceItem>,
    /// Sum of line items
    pub total_amount: Money,
    /// Cash received against this invoice
    pub paid_amount: Money,
    /// Remaining unpaid portion (includes discount relief)
    pub pending_amount: Money,
    /// Status
    pub status: InvoiceStatus,
    /// Notes
    pub notes: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a new invoice from line items
    ///
    /// # Errors
    ///
    /// Returns `Validation` if there are no items or the total is not
    /// positive.
    pub fn new(
        customer_id: CustomerId,
        invoice_number: impl Into<String>,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        items: Vec<InvoiceItem>,
        currency: Currency,
    ) -> Result<Self, BillingError> {
        let total = Self::total_of(&items, currency)?;
        if !total.is_positive() {
            return Err(BillingError::validation(
                "Invoice total must be positive",
            ));
        }

        let now = Utc::now();

        Ok(Self {
            id: InvoiceId::new_v7(),
            invoice_number: invoice_number.into(),
            customer_id,
            issue_date,
            due_date,
            items,
            total_amount: total,
            paid_amount: Money::zero(currency),
            pending_amount: total,
            status: InvoiceStatus::Draft,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sums line items, rejecting currency mixes
    pub fn total_of(items: &[InvoiceItem], currency: Currency) -> Result<Money, BillingError> {
        let mut total = Money::zero(currency);
        for item in items {
            total = total.checked_add(&item.total())?;
        }
        Ok(total)
    }

    /// Marks the invoice as issued
    pub fn mark_sent(&mut self) {
        if self.status == InvoiceStatus::Draft {
            self.status = InvoiceStatus::Sent;
            self.updated_at = Utc::now();
        }
    }

    /// Records a cash payment against the invoice
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive amount
    /// - `Overpayment` when `amount > pending_amount`; the allocation
    ///   engine never requests more than pending, but the rule is enforced
    ///   here as well
    pub fn apply_payment(&mut self, amount: Money, as_of: NaiveDate) -> Result<(), BillingError> {
        if !amount.is_positive() {
            return Err(BillingError::validation(
                "Payment amount must be positive",
            ));
        }
        if amount.amount() > self.pending_amount.amount() {
            return Err(BillingError::Overpayment {
                requested: amount.amount(),
                pending: self.pending_amount.amount(),
            });
        }

        self.paid_amount = self.paid_amount + amount;
        self.pending_amount = (self.pending_amount - amount).clamp_non_negative();
        self.refresh_status(as_of);
        self.updated_at = Utc::now();

        Ok(())
    }

    /// Reverses a previously recorded cash payment
    ///
    /// Clamped so `paid_amount` never goes negative; pending is rederived
    /// from the conservation rule rather than incremented blindly.
    pub fn reverse_payment(&mut self, amount: Money, as_of: NaiveDate) -> Result<(), BillingError> {
        if !amount.is_positive() {
            return Err(BillingError::validation(
                "Reversal amount must be positive",
            ));
        }

        let relief = self.discount_relief();
        self.paid_amount = (self.paid_amount - amount).clamp_non_negative();
        self.pending_amount =
            (self.total_amount - self.paid_amount - relief).clamp_non_negative();
        self.refresh_status(as_of);
        self.updated_at = Utc::now();

        Ok(())
    }

    /// Applies a discount: reduces pending without touching paid
    pub fn apply_discount(&mut self, amount: Money, as_of: NaiveDate) -> Result<(), BillingError> {
        if !amount.is_positive() {
            return Err(BillingError::validation(
                "Discount amount must be positive",
            ));
        }

        self.pending_amount = (self.pending_amount - amount).clamp_non_negative();
        self.refresh_status(as_of);
        self.updated_at = Utc::now();

        Ok(())
    }

    /// Restores pending after a discount reversal
    ///
    /// Clamped so `paid_amount + pending_amount` never exceeds the total.
    pub fn reverse_discount(&mut self, amount: Money, as_of: NaiveDate) -> Result<(), BillingError> {
        if !amount.is_positive() {
            return Err(BillingError::validation(
                "Discount reversal amount must be positive",
            ));
        }

        self.pending_amount =
            (self.pending_amount + amount).min(self.total_amount - self.paid_amount);
        self.refresh_status(as_of);
        self.updated_at = Utc::now();

        Ok(())
    }

    /// Amount relieved by discounts rather than cash
    pub fn discount_relief(&self) -> Money {
        (self.total_amount - self.paid_amount - self.pending_amount).clamp_non_negative()
    }

    /// Effective paid amount: cash plus discount relief
    pub fn effective_paid(&self) -> Money {
        self.total_amount - self.pending_amount
    }

    /// Returns true if the invoice still carries a pending amount and can
    /// receive allocations
    pub fn is_outstanding(&self) -> bool {
        self.pending_amount.is_positive()
            && !matches!(
                self.status,
                InvoiceStatus::Draft | InvoiceStatus::Cancelled
            )
    }

    /// Re-derives the status from the current amounts
    ///
    /// `Cancelled` is sticky. A partially paid invoice reports `Partial`
    /// even past its due date; `Overdue` is reserved for invoices with
    /// nothing received.
    pub fn refresh_status(&mut self, as_of: NaiveDate) {
        if self.status == InvoiceStatus::Cancelled {
            return;
        }

        self.status = if self.pending_amount.is_zero() {
            InvoiceStatus::Paid
        } else if self.effective_paid().is_positive() {
            InvoiceStatus::Partial
        } else if as_of > self.due_date {
            InvoiceStatus::Overdue
        } else if self.status == InvoiceStatus::Draft {
            InvoiceStatus::Draft
        } else {
            InvoiceStatus::Sent
        };
    }
}

/// Generates an invoice number from the current timestamp
pub fn generate_invoice_number() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("INV-{}", duration.as_millis() % 10_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice_for(total: Decimal) -> Invoice {
        Invoice::new(
            CustomerId::new(),
            "INV-1001",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            vec![InvoiceItem::new(
                "Goods",
                Money::new(total, Currency::PKR),
            )],
            Currency::PKR,
        )
        .unwrap()
    }

    #[test]
    fn test_conservation_after_payment() {
        let mut invoice = invoice_for(dec!(1000));
        invoice.mark_sent();

        invoice
            .apply_payment(
                Money::new(dec!(400), Currency::PKR),
                invoice.due_date,
            )
            .unwrap();

        assert_eq!(
            invoice.paid_amount + invoice.pending_amount,
            invoice.total_amount
        );
        assert_eq!(invoice.status, InvoiceStatus::Partial);
    }

    #[test]
    fn test_overpayment_rejected() {
        let mut invoice = invoice_for(dec!(1000));
        invoice.mark_sent();

        let result = invoice.apply_payment(
            Money::new(dec!(1500), Currency::PKR),
            invoice.due_date,
        );

        assert!(matches!(result, Err(BillingError::Overpayment { .. })));
        assert_eq!(invoice.paid_amount.amount(), dec!(0));
    }

    #[test]
    fn test_discount_leaves_paid_untouched() {
        let mut invoice = invoice_for(dec!(1000));
        invoice.mark_sent();

        invoice
            .apply_discount(
                Money::new(dec!(200), Currency::PKR),
                invoice.due_date,
            )
            .unwrap();

        assert_eq!(invoice.paid_amount.amount(), dec!(0));
        assert_eq!(invoice.pending_amount.amount(), dec!(800));
        assert_eq!(invoice.discount_relief().amount(), dec!(200));
        assert_eq!(invoice.status, InvoiceStatus::Partial);
    }

    #[test]
    fn test_full_payment_closes_invoice() {
        let mut invoice = invoice_for(dec!(1000));
        invoice.mark_sent();

        invoice
            .apply_payment(
                Money::new(dec!(1000), Currency::PKR),
                invoice.due_date,
            )
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.pending_amount.is_zero());
    }

    #[test]
    fn test_reverse_payment_round_trip() {
        let mut invoice = invoice_for(dec!(1000));
        invoice.mark_sent();
        let as_of = invoice.due_date;
        let amount = Money::new(dec!(600), Currency::PKR);

        invoice.apply_payment(amount, as_of).unwrap();
        invoice.reverse_payment(amount, as_of).unwrap();

        assert_eq!(invoice.paid_amount.amount(), dec!(0));
        assert_eq!(invoice.pending_amount, invoice.total_amount);
        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }

    #[test]
    fn test_overdue_when_unpaid_past_due() {
        let mut invoice = invoice_for(dec!(1000));
        invoice.mark_sent();

        let day_after_due = invoice.due_date.succ_opt().unwrap();
        invoice.refresh_status(day_after_due);

        assert_eq!(invoice.status, InvoiceStatus::Overdue);
    }

    #[test]
    fn test_zero_total_rejected() {
        let result = Invoice::new(
            CustomerId::new(),
            "INV-1002",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            vec![],
            Currency::PKR,
        );

        assert!(matches!(result, Err(BillingError::Validation(_))));
    }
}
