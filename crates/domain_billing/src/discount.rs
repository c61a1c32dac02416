//! Discount records
//!
//! A discount reduces what the customer owes without being cash. It always
//! produces exactly one journal credit; when it targets an invoice it also
//! reduces that invoice's pending amount. The application rules live on the
//! `CustomerLedger` aggregate, which validates the amount against the
//! customer's total outstanding balance before any mutation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{CustomerId, DiscountId, InvoiceId, Money, PaymentId};

/// A granted discount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    /// Unique identifier
    pub id: DiscountId,
    /// Customer whose balance the discount relieves
    pub customer_id: CustomerId,
    /// Target invoice, if any (a discount with no target is a goodwill
    /// credit against the running balance)
    pub invoice_id: Option<InvoiceId>,
    /// Payment this discount was granted alongside, if any
    pub payment_id: Option<PaymentId>,
    /// Discount amount
    pub amount: Money,
    /// Reason recorded for the statement
    pub reason: String,
    /// Grant date
    pub date: NaiveDate,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Discount {
    /// Creates a new discount record
    pub fn new(
        customer_id: CustomerId,
        amount: Money,
        reason: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: DiscountId::new_v7(),
            customer_id,
            invoice_id: None,
            payment_id: None,
            amount,
            reason: reason.into(),
            date,
            created_at: Utc::now(),
        }
    }

    /// Targets an invoice
    pub fn for_invoice(mut self, invoice_id: InvoiceId) -> Self {
        self.invoice_id = Some(invoice_id);
        self
    }

    /// Links the payment the discount was granted with
    pub fn with_payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }
}
