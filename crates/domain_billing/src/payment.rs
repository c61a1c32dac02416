//! Payment records and the payment state machine
//!
//! Cheque and parchi payments start `Pending` until the instrument clears;
//! the pending → completed transition is rejected while the instrument date
//! is still in the future (calendar dates, not timestamps).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{CustomerId, DistributionId, Money, PaymentId};

use crate::error::BillingError;

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash over the counter
    Cash,
    /// Bank transfer
    BankTransfer,
    /// Cheque (clears on the instrument date)
    Cheque,
    /// Parchi (informal written note, cleared like a cheque)
    Parchi,
    /// Debit/credit card
    Card,
    /// Online payment
    Online,
}

impl PaymentMethod {
    /// Returns true for instrument-backed methods that start `Pending`
    pub fn is_deferred(&self) -> bool {
        matches!(self, PaymentMethod::Cheque | PaymentMethod::Parchi)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::Parchi => "parchi",
            PaymentMethod::Card => "card",
            PaymentMethod::Online => "online",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "bank_transfer" => PaymentMethod::BankTransfer,
            "cheque" => PaymentMethod::Cheque,
            "parchi" => PaymentMethod::Parchi,
            "card" => PaymentMethod::Card,
            "online" => PaymentMethod::Online,
            _ => PaymentMethod::Cash,
        }
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Instrument not yet cleared
    Pending,
    /// Allocation left targeted invoices partly open
    Partial,
    /// Fully settled
    Completed,
    /// Manually cancelled; invoice state intentionally untouched
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "partial" => PaymentStatus::Partial,
            "completed" => PaymentStatus::Completed,
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Pending,
        }
    }
}

/// A received payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier
    pub id: PaymentId,
    /// Sequence-scoped number, `PAY-<year>-<seq>`
    pub payment_number: String,
    /// Paying customer
    pub customer_id: CustomerId,
    /// Value date of the payment
    pub date: NaiveDate,
    /// Actual cash/instrument value received
    pub total_received: Money,
    /// Discount granted alongside; not cash, posted separately
    pub discount_amount: Money,
    /// Payment method
    pub method: PaymentMethod,
    /// Cheque/parchi date, required for deferred methods
    pub instrument_date: Option<NaiveDate>,
    /// Status
    pub status: PaymentStatus,
    /// Notes
    pub notes: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Marks a pending payment as completed
    ///
    /// # Errors
    ///
    /// - `FutureInstrumentDate` when the cheque/parchi date is after
    ///   `as_of` (compared as calendar dates)
    /// - `StateConflict` when the payment is not pending
    pub fn mark_completed(&mut self, as_of: NaiveDate) -> Result<(), BillingError> {
        if self.status != PaymentStatus::Pending {
            return Err(BillingError::state_conflict(format!(
                "Payment {} is {} and cannot be marked completed",
                self.payment_number,
                self.status.as_str()
            )));
        }

        if self.method.is_deferred() {
            if let Some(instrument_date) = self.instrument_date {
                if instrument_date > as_of {
                    return Err(BillingError::FutureInstrumentDate { instrument_date });
                }
            }
        }

        self.status = PaymentStatus::Completed;
        self.updated_at = Utc::now();

        Ok(())
    }

    /// Cancels the payment without reversing invoice state
    pub fn cancel(&mut self) -> Result<(), BillingError> {
        if self.status == PaymentStatus::Cancelled {
            return Err(BillingError::state_conflict(format!(
                "Payment {} is already cancelled",
                self.payment_number
            )));
        }

        self.status = PaymentStatus::Cancelled;
        self.updated_at = Utc::now();

        Ok(())
    }
}

/// Where a slice of a payment went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayeeType {
    /// Applied to an invoice
    Invoice,
    /// Applied against the customer's opening balance
    OpeningBalance,
    /// Routed to a supplier
    Supplier,
    /// Routed to an expense
    Expense,
    /// Owner draw
    Owner,
    /// Anything else, e.g. unapplied credit
    Other,
}

impl PayeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayeeType::Invoice => "invoice",
            PayeeType::OpeningBalance => "opening_balance",
            PayeeType::Supplier => "supplier",
            PayeeType::Expense => "expense",
            PayeeType::Owner => "owner",
            PayeeType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "invoice" => PayeeType::Invoice,
            "opening_balance" => PayeeType::OpeningBalance,
            "supplier" => PayeeType::Supplier,
            "expense" => PayeeType::Expense,
            "owner" => PayeeType::Owner,
            _ => PayeeType::Other,
        }
    }
}

/// One bucket a payment was applied to
///
/// Distributions only move received cash; a discount is tracked on the
/// payment and the discount record, never here. Deleting a payment
/// reconstructs its effects strictly from these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDistribution {
    /// Unique identifier
    pub id: DistributionId,
    /// Owning payment
    pub payment_id: PaymentId,
    /// Bucket type
    pub payee_type: PayeeType,
    /// Target entity (invoice id for `Invoice`, none for `OpeningBalance`)
    pub target_id: Option<Uuid>,
    /// Cash routed to this bucket
    pub amount: Money,
    /// Human-readable purpose for the statement
    pub purpose: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl PaymentDistribution {
    /// Creates a new distribution row
    pub fn new(
        payment_id: PaymentId,
        payee_type: PayeeType,
        target_id: Option<Uuid>,
        amount: Money,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            id: DistributionId::new_v7(),
            payment_id,
            payee_type,
            target_id,
            amount,
            purpose: purpose.into(),
            created_at: Utc::now(),
        }
    }
}

/// Formats a sequence-scoped payment number
///
/// The sequence resets each year and is monotonic within a year.
pub fn format_payment_number(year: i32, sequence: u32) -> String {
    format!("PAY-{}-{:04}", year, sequence)
}
