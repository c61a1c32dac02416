//! The customer ledger aggregate
//!
//! One `CustomerLedger` holds everything the engine knows about a single
//! customer: the account with its cached balance, the journal, invoices,
//! payments, distributions and discounts. Every multi-step mutation is a
//! method here that validates before it mutates; the storage layer persists
//! a whole aggregate atomically, so a failed operation is discarded rather
//! than rolled back piecemeal.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{DiscountId, InvoiceId, Money, PaymentId};

use crate::allocation::{allocate, AllocationInput, OutstandingInvoice};
use crate::customer::CustomerAccount;
use crate::discount::Discount;
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceItem};
use crate::journal::{CustomerJournal, EntryType, JournalEntry, LedgerStatement, NewEntry};
use crate::payment::{
    PayeeType, Payment, PaymentDistribution, PaymentMethod, PaymentStatus,
};

/// Input for creating a payment against a ledger
///
/// The payment number is resolved by the caller (sequence-scoped or
/// caller-chosen); the aggregate enforces uniqueness within the customer.
#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub payment_number: String,
    pub date: NaiveDate,
    pub total_received: Money,
    pub discount_amount: Money,
    pub discount_reason: Option<String>,
    pub method: PaymentMethod,
    pub instrument_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// When cash exceeds every recorded obligation, record the remainder
    /// as an explicit customer credit instead of rejecting the payment
    pub treat_excess_as_credit: bool,
}

/// Input for granting a standalone discount
#[derive(Debug, Clone)]
pub struct DiscountInput {
    pub invoice_id: Option<InvoiceId>,
    pub payment_id: Option<PaymentId>,
    pub amount: Money,
    pub reason: String,
    pub date: NaiveDate,
}

/// All financial state for one customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerLedger {
    customer: CustomerAccount,
    invoices: BTreeMap<InvoiceId, Invoice>,
    journal: CustomerJournal,
    payments: BTreeMap<PaymentId, Payment>,
    distributions: Vec<PaymentDistribution>,
    discounts: BTreeMap<DiscountId, Discount>,
}

impl CustomerLedger {
    /// Opens a ledger for a new customer
    ///
    /// A non-zero opening balance posts an `OpeningBalance` journal debit
    /// dated at the customer's `as_of_date`.
    ///
    /// # Errors
    ///
    /// `Validation` if the opening balance is negative.
    pub fn open(customer: CustomerAccount) -> Result<Self, BillingError> {
        if customer.opening_balance.is_negative() {
            return Err(BillingError::validation(
                "Opening balance must not be negative",
            ));
        }

        let mut ledger = Self {
            journal: CustomerJournal::new(customer.id, customer.currency),
            customer,
            invoices: BTreeMap::new(),
            payments: BTreeMap::new(),
            distributions: Vec::new(),
            discounts: BTreeMap::new(),
        };

        if ledger.customer.opening_balance.is_positive() {
            ledger.journal.append(NewEntry::debit(
                ledger.customer.as_of_date,
                EntryType::OpeningBalance,
                *ledger.customer.id.as_uuid(),
                ledger.customer.id.to_string(),
                ledger.customer.opening_balance,
                format!("Opening balance as of {}", ledger.customer.as_of_date),
            ))?;
            ledger.sync_balance();
        }

        Ok(ledger)
    }

    /// Rebuilds an aggregate from persisted rows
    ///
    /// The stored `current_balance` cache is kept as-is so that
    /// [`CustomerLedger::verify_integrity`] can still detect divergence
    /// from the journal replay.
    pub fn from_parts(
        customer: CustomerAccount,
        invoices: Vec<Invoice>,
        entries: Vec<JournalEntry>,
        payments: Vec<Payment>,
        distributions: Vec<PaymentDistribution>,
        discounts: Vec<Discount>,
    ) -> Self {
        let journal = CustomerJournal::from_entries(customer.id, customer.currency, entries);

        Self {
            journal,
            customer,
            invoices: invoices.into_iter().map(|i| (i.id, i)).collect(),
            payments: payments.into_iter().map(|p| (p.id, p)).collect(),
            distributions,
            discounts: discounts.into_iter().map(|d| (d.id, d)).collect(),
        }
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    pub fn customer(&self) -> &CustomerAccount {
        &self.customer
    }

    pub fn invoice(&self, id: &InvoiceId) -> Option<&Invoice> {
        self.invoices.get(id)
    }

    pub fn invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.values()
    }

    pub fn payment(&self, id: &PaymentId) -> Option<&Payment> {
        self.payments.get(id)
    }

    pub fn payments(&self) -> impl Iterator<Item = &Payment> {
        self.payments.values()
    }

    pub fn distributions(&self) -> &[PaymentDistribution] {
        &self.distributions
    }

    pub fn distributions_for(&self, payment_id: &PaymentId) -> Vec<&PaymentDistribution> {
        self.distributions
            .iter()
            .filter(|d| d.payment_id == *payment_id)
            .collect()
    }

    pub fn discount(&self, id: &DiscountId) -> Option<&Discount> {
        self.discounts.get(id)
    }

    pub fn discounts(&self) -> impl Iterator<Item = &Discount> {
        self.discounts.values()
    }

    pub fn journal_entries(&self) -> &[JournalEntry] {
        self.journal.entries()
    }

    /// Invoices eligible for payment allocation
    pub fn outstanding_invoices(&self) -> Vec<OutstandingInvoice> {
        self.invoices
            .values()
            .filter(|invoice| invoice.is_outstanding())
            .map(|invoice| OutstandingInvoice {
                invoice_id: invoice.id,
                invoice_number: invoice.invoice_number.clone(),
                due_date: invoice.due_date,
                created_at: invoice.created_at,
                pending_amount: invoice.pending_amount,
            })
            .collect()
    }

    // -------------------------------------------------------------------
    // Invoice ledger bridge
    // -------------------------------------------------------------------

    /// Records an invoice: marks it sent and posts the journal debit
    ///
    /// # Errors
    ///
    /// - `Validation` for a customer/currency mismatch or duplicate number
    pub fn record_invoice(&mut self, mut invoice: Invoice) -> Result<InvoiceId, BillingError> {
        if invoice.customer_id != self.customer.id {
            return Err(BillingError::validation(
                "Invoice belongs to a different customer",
            ));
        }
        if invoice.total_amount.currency() != self.customer.currency {
            return Err(BillingError::validation(format!(
                "Invoice must be in {}",
                self.customer.currency
            )));
        }
        if self
            .invoices
            .values()
            .any(|existing| existing.invoice_number == invoice.invoice_number)
        {
            return Err(BillingError::validation(format!(
                "Invoice number {} already exists",
                invoice.invoice_number
            )));
        }

        invoice.mark_sent();

        self.journal.append(NewEntry::debit(
            invoice.issue_date,
            EntryType::Invoice,
            *invoice.id.as_uuid(),
            invoice.invoice_number.clone(),
            invoice.total_amount,
            format!("Invoice {}", invoice.invoice_number),
        ))?;
        self.sync_balance();

        let id = invoice.id;
        self.invoices.insert(id, invoice);
        Ok(id)
    }

    /// Replaces an invoice's line items, repostings its journal entry
    ///
    /// The old entry is removed and a new one posted at the original issue
    /// date, which is never the chronologically-latest position, so a full
    /// recalculation always follows.
    ///
    /// # Errors
    ///
    /// - `InvoiceNotFound` for an unknown id
    /// - `StateConflict` when the new total is below what has already been
    ///   paid or discounted
    pub fn update_invoice_items(
        &mut self,
        invoice_id: InvoiceId,
        items: Vec<InvoiceItem>,
        as_of: NaiveDate,
    ) -> Result<(), BillingError> {
        let currency = self.customer.currency;
        let new_total = Invoice::total_of(&items, currency)?;
        if !new_total.is_positive() {
            return Err(BillingError::validation(
                "Invoice total must be positive",
            ));
        }

        let invoice = self
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))?;

        let settled = invoice.paid_amount + invoice.discount_relief();
        if new_total.amount() < settled.amount() {
            return Err(BillingError::state_conflict(format!(
                "New total {} is below the {} already settled on invoice {}",
                new_total, settled, invoice.invoice_number
            )));
        }

        invoice.items = items;
        invoice.total_amount = new_total;
        invoice.pending_amount = new_total - settled;
        invoice.refresh_status(as_of);
        invoice.updated_at = chrono::Utc::now();

        let issue_date = invoice.issue_date;
        let number = invoice.invoice_number.clone();
        let reference = *invoice.id.as_uuid();

        self.journal.remove_entries(reference, EntryType::Invoice);
        self.journal.append(NewEntry::debit(
            issue_date,
            EntryType::Invoice,
            reference,
            number.clone(),
            new_total,
            format!("Invoice {}", number),
        ))?;
        self.journal.recalculate();
        self.sync_balance();

        Ok(())
    }

    /// Deletes an invoice and its journal entry
    ///
    /// # Errors
    ///
    /// - `InvoiceNotFound` for an unknown id
    /// - `StateConflict` when payments or discounts have been applied;
    ///   those must be deleted first so their reversals stay consistent
    pub fn delete_invoice(&mut self, invoice_id: InvoiceId) -> Result<(), BillingError> {
        let invoice = self
            .invoices
            .get(&invoice_id)
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))?;

        if invoice.paid_amount.is_positive() || invoice.discount_relief().is_positive() {
            return Err(BillingError::state_conflict(format!(
                "Invoice {} has payments or discounts applied; delete those first",
                invoice.invoice_number
            )));
        }

        self.journal
            .remove_entries(*invoice_id.as_uuid(), EntryType::Invoice);
        self.invoices.remove(&invoice_id);
        self.sync_balance();

        Ok(())
    }

    // -------------------------------------------------------------------
    // Discount engine
    // -------------------------------------------------------------------

    /// Grants a discount
    ///
    /// Validated against the customer's total outstanding balance before
    /// any mutation. With a target invoice the pending amount is reduced
    /// (clamped at zero) and the status rederived from the effective paid
    /// amount; without one the discount is a goodwill credit against the
    /// running balance. Either way exactly one journal credit is posted.
    ///
    /// # Errors
    ///
    /// - `DiscountExceedsBalance` when the amount exceeds the outstanding
    ///   balance
    /// - `InvoiceNotFound` for an unknown target
    pub fn apply_discount(&mut self, input: DiscountInput) -> Result<Discount, BillingError> {
        if !input.amount.is_positive() {
            return Err(BillingError::validation(
                "Discount amount must be positive",
            ));
        }
        if input.amount.currency() != self.customer.currency {
            return Err(BillingError::validation(format!(
                "Discount must be in {}",
                self.customer.currency
            )));
        }

        let outstanding = self.customer.outstanding_balance();
        if input.amount.amount() > outstanding.amount() {
            return Err(BillingError::DiscountExceedsBalance {
                requested: input.amount.amount(),
                outstanding: outstanding.amount(),
            });
        }

        if let Some(invoice_id) = input.invoice_id {
            if !self.invoices.contains_key(&invoice_id) {
                return Err(BillingError::InvoiceNotFound(invoice_id.to_string()));
            }
        }

        let mut discount = Discount::new(
            self.customer.id,
            input.amount,
            input.reason,
            input.date,
        );
        if let Some(invoice_id) = input.invoice_id {
            discount = discount.for_invoice(invoice_id);
            let invoice = self.invoices.get_mut(&invoice_id).unwrap();
            invoice.apply_discount(input.amount, input.date)?;
        }
        if let Some(payment_id) = input.payment_id {
            discount = discount.with_payment(payment_id);
        }

        let reference_number = discount
            .payment_id
            .and_then(|id| self.payments.get(&id))
            .map(|payment| payment.payment_number.clone())
            .unwrap_or_else(|| discount.id.to_string());

        self.journal.append(NewEntry::credit(
            discount.date,
            EntryType::Discount,
            *discount.id.as_uuid(),
            reference_number,
            discount.amount,
            format!("Discount: {}", discount.reason),
        ))?;
        self.sync_balance();

        self.discounts.insert(discount.id, discount.clone());
        Ok(discount)
    }

    /// Reverses a discount: restores the invoice pending amount, removes
    /// the journal credit and recalculates
    pub fn reverse_discount(
        &mut self,
        discount_id: DiscountId,
        as_of: NaiveDate,
    ) -> Result<(), BillingError> {
        let discount = self
            .discounts
            .remove(&discount_id)
            .ok_or_else(|| BillingError::DiscountNotFound(discount_id.to_string()))?;

        if let Some(invoice_id) = discount.invoice_id {
            if let Some(invoice) = self.invoices.get_mut(&invoice_id) {
                invoice.reverse_discount(discount.amount, as_of)?;
            }
        }

        self.journal
            .remove_entries(*discount.id.as_uuid(), EntryType::Discount);
        self.journal.recalculate();
        self.sync_balance();

        Ok(())
    }

    // -------------------------------------------------------------------
    // Payment lifecycle
    // -------------------------------------------------------------------

    /// Creates a payment: runs the FIFO allocation and applies every
    /// side effect in one aggregate mutation
    ///
    /// Applies, in order: the payment row, one distribution per non-zero
    /// bucket, per-invoice amounts, the discount (posting its own credit),
    /// the opening-balance decrement, and exactly one journal credit for
    /// the received cash. All validation happens before the first
    /// mutation.
    pub fn create_payment(&mut self, input: PaymentInput) -> Result<Payment, BillingError> {
        let currency = self.customer.currency;

        if input.total_received.currency() != currency
            || input.discount_amount.currency() != currency
        {
            return Err(BillingError::validation(format!(
                "Payment must be in {}",
                currency
            )));
        }
        if input.total_received.is_negative() || input.discount_amount.is_negative() {
            return Err(BillingError::validation(
                "Received and discount amounts must not be negative",
            ));
        }
        if input.total_received.is_zero() && input.discount_amount.is_zero() {
            return Err(BillingError::validation(
                "Payment must carry a received amount or a discount",
            ));
        }
        if input.method.is_deferred() && input.instrument_date.is_none() {
            return Err(BillingError::validation(format!(
                "{} payments require an instrument date",
                input.method.as_str()
            )));
        }
        if self
            .payments
            .values()
            .any(|payment| payment.payment_number == input.payment_number)
        {
            return Err(BillingError::DuplicatePaymentNumber(
                input.payment_number.clone(),
            ));
        }
        if input.discount_amount.is_positive() {
            let outstanding = self.customer.outstanding_balance();
            if input.discount_amount.amount() > outstanding.amount() {
                return Err(BillingError::DiscountExceedsBalance {
                    requested: input.discount_amount.amount(),
                    outstanding: outstanding.amount(),
                });
            }
        }

        let allocation = allocate(&AllocationInput {
            total_amount: input.total_received,
            discount_amount: input.discount_amount,
            opening_balance_remaining: self.customer.opening_balance_remaining,
            outstanding_invoices: self.outstanding_invoices(),
        });

        if allocation.unallocated.is_positive() && !input.treat_excess_as_credit {
            return Err(BillingError::UnappliedPayment {
                remainder: allocation.unallocated.amount(),
            });
        }

        let fully_covered = allocation.invoices.iter().all(|applied| {
            let invoice = &self.invoices[&applied.invoice_id];
            (invoice.pending_amount - applied.amount - applied.discount).is_zero()
        });
        let status = if input.method.is_deferred() {
            PaymentStatus::Pending
        } else if fully_covered {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Partial
        };

        let now = chrono::Utc::now();
        let payment = Payment {
            id: PaymentId::new_v7(),
            payment_number: input.payment_number,
            customer_id: self.customer.id,
            date: input.date,
            total_received: input.total_received,
            discount_amount: input.discount_amount,
            method: input.method,
            instrument_date: input.instrument_date,
            status,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };

        if allocation.opening_balance_applied.is_positive() {
            self.distributions.push(PaymentDistribution::new(
                payment.id,
                PayeeType::OpeningBalance,
                None,
                allocation.opening_balance_applied,
                "Applied to opening balance",
            ));
            self.customer.opening_balance_remaining =
                self.customer.opening_balance_remaining - allocation.opening_balance_applied;
        }

        let mut discount_invoice: Option<InvoiceId> = None;
        for applied in &allocation.invoices {
            if applied.amount.is_positive() {
                self.distributions.push(PaymentDistribution::new(
                    payment.id,
                    PayeeType::Invoice,
                    Some(*applied.invoice_id.as_uuid()),
                    applied.amount,
                    format!("Applied to invoice {}", applied.invoice_number),
                ));
                let invoice = self.invoices.get_mut(&applied.invoice_id).unwrap();
                invoice.apply_payment(applied.amount, input.date)?;
            }
            if applied.discount.is_positive() {
                discount_invoice = Some(applied.invoice_id);
            }
        }

        if allocation.unallocated.is_positive() {
            self.distributions.push(PaymentDistribution::new(
                payment.id,
                PayeeType::Other,
                None,
                allocation.unallocated,
                "Unapplied credit",
            ));
        }

        if input.total_received.is_positive() {
            self.journal.append(NewEntry::credit(
                input.date,
                EntryType::Payment,
                *payment.id.as_uuid(),
                payment.payment_number.clone(),
                input.total_received,
                format!(
                    "Payment {} ({})",
                    payment.payment_number,
                    payment.method.as_str()
                ),
            ))?;
            self.sync_balance();
        }

        self.payments.insert(payment.id, payment.clone());

        // The discount posts its own journal credit, separate from the
        // received cash.
        if input.discount_amount.is_positive() {
            let discount = self.apply_discount_for_payment(
                payment.id,
                discount_invoice,
                input.discount_amount,
                input
                    .discount_reason
                    .unwrap_or_else(|| "Discount on payment".to_string()),
                input.date,
            )?;
            self.discounts.insert(discount.id, discount);
        }

        Ok(payment)
    }

    /// Marks a pending payment as completed (cheque/parchi clearing)
    pub fn complete_payment(
        &mut self,
        payment_id: PaymentId,
        as_of: NaiveDate,
    ) -> Result<(), BillingError> {
        let payment = self
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| BillingError::PaymentNotFound(payment_id.to_string()))?;
        payment.mark_completed(as_of)
    }

    /// Cancels a payment without reversing invoice state
    pub fn cancel_payment(&mut self, payment_id: PaymentId) -> Result<(), BillingError> {
        let payment = self
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| BillingError::PaymentNotFound(payment_id.to_string()))?;
        payment.cancel()
    }

    /// Deletes a payment, reversing every side effect it caused
    ///
    /// Reconstruction is strictly from the explicit distribution rows:
    /// invoice amounts are reversed, the linked discount undone, the
    /// opening-balance remainder restored, then the distributions, journal
    /// entry and payment row are removed and the journal recalculated.
    pub fn delete_payment(
        &mut self,
        payment_id: PaymentId,
        as_of: NaiveDate,
    ) -> Result<(), BillingError> {
        if !self.payments.contains_key(&payment_id) {
            return Err(BillingError::PaymentNotFound(payment_id.to_string()));
        }

        let (reversals, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.distributions)
            .into_iter()
            .partition(|dist| dist.payment_id == payment_id);
        self.distributions = kept;

        for dist in &reversals {
            match dist.payee_type {
                PayeeType::Invoice => {
                    let invoice_id = dist
                        .target_id
                        .map(InvoiceId::from_uuid)
                        .ok_or_else(|| {
                            BillingError::state_conflict(
                                "Invoice distribution is missing its target",
                            )
                        })?;
                    let invoice = self.invoices.get_mut(&invoice_id).ok_or_else(|| {
                        BillingError::InvoiceNotFound(invoice_id.to_string())
                    })?;
                    invoice.reverse_payment(dist.amount, as_of)?;
                }
                PayeeType::OpeningBalance => {
                    self.customer.opening_balance_remaining =
                        self.customer.opening_balance_remaining + dist.amount;
                }
                // Third-party and credit buckets carry no customer-side
                // state beyond the journal entry removed below.
                _ => {}
            }
        }

        let linked_discounts: Vec<DiscountId> = self
            .discounts
            .values()
            .filter(|discount| discount.payment_id == Some(payment_id))
            .map(|discount| discount.id)
            .collect();
        for discount_id in linked_discounts {
            self.reverse_discount(discount_id, as_of)?;
        }

        self.journal
            .remove_entries(*payment_id.as_uuid(), EntryType::Payment);
        self.payments.remove(&payment_id);
        self.journal.recalculate();
        self.sync_balance();

        Ok(())
    }

    // -------------------------------------------------------------------
    // Journal operations
    // -------------------------------------------------------------------

    /// Posts a manual adjustment
    ///
    /// A positive amount debits the customer (increases what they owe), a
    /// negative amount credits them. Hidden adjustments stay off the
    /// statement but inside the balance math.
    pub fn record_adjustment(
        &mut self,
        date: NaiveDate,
        amount: Money,
        description: impl Into<String>,
        hidden: bool,
    ) -> Result<(), BillingError> {
        if amount.is_zero() {
            return Err(BillingError::validation(
                "Adjustment amount must not be zero",
            ));
        }

        let reference = Uuid::new_v4();
        let mut entry = if amount.is_positive() {
            NewEntry::debit(
                date,
                EntryType::Adjustment,
                reference,
                format!("ADJ-{}", &reference.to_string()[..8]),
                amount,
                description,
            )
        } else {
            NewEntry::credit(
                date,
                EntryType::Adjustment,
                reference,
                format!("ADJ-{}", &reference.to_string()[..8]),
                amount.abs(),
                description,
            )
        };
        if hidden {
            entry = entry.hidden();
        }

        self.journal.append(entry)?;
        self.sync_balance();

        Ok(())
    }

    /// Customer-facing statement for a date range
    pub fn statement(&self, from: NaiveDate, to: NaiveDate) -> LedgerStatement {
        self.journal.statement(from, to)
    }

    /// Full journal replay; rewrites snapshots and the balance cache
    pub fn recalculate(&mut self) -> Money {
        let balance = self.journal.recalculate();
        self.customer.current_balance = balance;
        self.customer.updated_at = chrono::Utc::now();
        balance
    }

    /// Compares the cached balance against a journal replay
    ///
    /// # Errors
    ///
    /// `InvariantViolation` carrying both figures when they diverge. This
    /// should never surface in correct operation; the safe response is to
    /// recalculate, not to guess.
    pub fn verify_integrity(&self) -> Result<(), BillingError> {
        let computed = self.journal.computed_balance();
        if computed != self.customer.current_balance {
            return Err(BillingError::InvariantViolation {
                cached: self.customer.current_balance.amount(),
                computed: computed.amount(),
            });
        }
        Ok(())
    }

    fn sync_balance(&mut self) {
        self.customer.current_balance = self.journal.last_balance();
        self.customer.updated_at = chrono::Utc::now();
    }

    fn apply_discount_for_payment(
        &mut self,
        payment_id: PaymentId,
        invoice_id: Option<InvoiceId>,
        amount: Money,
        reason: String,
        date: NaiveDate,
    ) -> Result<Discount, BillingError> {
        let mut discount = Discount::new(self.customer.id, amount, reason, date)
            .with_payment(payment_id);

        if let Some(invoice_id) = invoice_id {
            discount = discount.for_invoice(invoice_id);
            let invoice = self.invoices.get_mut(&invoice_id).ok_or_else(|| {
                BillingError::InvoiceNotFound(invoice_id.to_string())
            })?;
            invoice.apply_discount(amount, date)?;
        }

        let reference_number = self
            .payments
            .get(&payment_id)
            .map(|payment| payment.payment_number.clone())
            .unwrap_or_else(|| discount.id.to_string());

        self.journal.append(NewEntry::credit(
            date,
            EntryType::Discount,
            *discount.id.as_uuid(),
            reference_number,
            amount,
            format!("Discount: {}", discount.reason),
        ))?;
        self.sync_balance();

        Ok(discount)
    }
}
