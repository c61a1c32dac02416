//! Billing application services
//!
//! `BillingService` orchestrates the aggregate over the storage port. Every
//! mutation follows the same shape: take the customer's lock, load the
//! aggregate, mutate in memory (validate-then-mutate), save atomically. A
//! failure anywhere discards the in-memory copy, so the persisted state
//! never sees a partial operation. Operations for different customers run
//! in parallel; operations for the same customer are serialized to keep the
//! read-balance-then-post sequence race free.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use core_kernel::{Currency, CustomerId, DiscountId, InvoiceId, Money, PaymentId};

use crate::customer::CustomerAccount;
use crate::discount::Discount;
use crate::error::BillingError;
use crate::invoice::{generate_invoice_number, Invoice, InvoiceItem};
use crate::journal::LedgerStatement;
use crate::ledger::{CustomerLedger, DiscountInput, PaymentInput};
use crate::payment::{format_payment_number, Payment, PaymentMethod};
use crate::ports::BillingStore;

/// Request to register a customer
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub currency: Currency,
    pub opening_balance: Money,
    pub as_of_date: NaiveDate,
}

/// Request to record an invoice
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub customer_id: CustomerId,
    /// Caller-chosen number; generated when absent
    pub invoice_number: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub items: Vec<InvoiceItem>,
    pub notes: Option<String>,
}

/// Request to create a payment
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub customer_id: CustomerId,
    /// Caller-chosen number; sequence-generated (`PAY-<year>-<seq>`) when
    /// absent
    pub payment_number: Option<String>,
    pub date: NaiveDate,
    pub total_received: Money,
    pub discount_amount: Money,
    pub discount_reason: Option<String>,
    pub method: PaymentMethod,
    pub instrument_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub treat_excess_as_credit: bool,
}

/// Request to grant a discount outside a payment
#[derive(Debug, Clone)]
pub struct NewDiscount {
    pub customer_id: CustomerId,
    pub invoice_id: Option<InvoiceId>,
    pub amount: Money,
    pub reason: String,
    pub date: NaiveDate,
}

/// Orchestrates ledger mutations over a storage port
pub struct BillingService<S> {
    store: Arc<S>,
    locks: Mutex<HashMap<CustomerId, Arc<Mutex<()>>>>,
}

impl<S: BillingStore> BillingService<S> {
    /// Creates a service over a store
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a customer; a positive opening balance posts the
    /// `OpeningBalance` journal debit dated at `as_of_date`
    pub async fn register_customer(
        &self,
        request: NewCustomer,
    ) -> Result<CustomerId, BillingError> {
        let customer = CustomerAccount::new(
            request.name,
            request.currency,
            request.opening_balance,
            request.as_of_date,
        );
        let customer_id = customer.id;

        let ledger = CustomerLedger::open(customer)?;
        self.store.create(&ledger).await?;

        info!(%customer_id, opening_balance = %request.opening_balance, "Customer registered");
        Ok(customer_id)
    }

    /// Records an invoice and its journal debit
    pub async fn record_invoice(&self, request: NewInvoice) -> Result<InvoiceId, BillingError> {
        let customer_id = request.customer_id;
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;

        let mut invoice = Invoice::new(
            customer_id,
            request
                .invoice_number
                .unwrap_or_else(generate_invoice_number),
            request.issue_date,
            request.due_date,
            request.items,
            ledger.customer().currency,
        )?;
        invoice.notes = request.notes;

        let invoice_id = ledger.record_invoice(invoice)?;
        self.store.save(&ledger).await?;

        info!(%customer_id, %invoice_id, "Invoice recorded");
        Ok(invoice_id)
    }

    /// Replaces an invoice's line items; the journal entry is reposted and
    /// the ledger recalculated
    pub async fn update_invoice_items(
        &self,
        customer_id: CustomerId,
        invoice_id: InvoiceId,
        items: Vec<InvoiceItem>,
    ) -> Result<(), BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        ledger.update_invoice_items(invoice_id, items, today())?;
        self.store.save(&ledger).await?;

        info!(%customer_id, %invoice_id, "Invoice items updated");
        Ok(())
    }

    /// Deletes an invoice with no payments or discounts applied
    pub async fn delete_invoice(
        &self,
        customer_id: CustomerId,
        invoice_id: InvoiceId,
    ) -> Result<(), BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        ledger.delete_invoice(invoice_id)?;
        self.store.save(&ledger).await?;

        info!(%customer_id, %invoice_id, "Invoice deleted");
        Ok(())
    }

    /// Creates a payment: FIFO allocation, distributions, invoice
    /// applications, discount, opening-balance decrement and the journal
    /// credit, atomically
    pub async fn create_payment(&self, request: NewPayment) -> Result<Payment, BillingError> {
        let customer_id = request.customer_id;
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let payment_number = match request.payment_number {
            Some(number) => {
                if self.store.payment_number_taken(&number).await? {
                    return Err(BillingError::DuplicatePaymentNumber(number));
                }
                number
            }
            None => {
                let year = request.date.year();
                let sequence = self.store.next_payment_sequence(year).await?;
                format_payment_number(year, sequence)
            }
        };

        let mut ledger = self.store.load(customer_id).await?;
        let payment = ledger.create_payment(PaymentInput {
            payment_number,
            date: request.date,
            total_received: request.total_received,
            discount_amount: request.discount_amount,
            discount_reason: request.discount_reason,
            method: request.method,
            instrument_date: request.instrument_date,
            notes: request.notes,
            treat_excess_as_credit: request.treat_excess_as_credit,
        })?;
        self.store.save(&ledger).await?;

        info!(
            %customer_id,
            payment_number = %payment.payment_number,
            total_received = %payment.total_received,
            status = payment.status.as_str(),
            "Payment created"
        );
        Ok(payment)
    }

    /// Marks a pending cheque/parchi payment as completed
    ///
    /// Rejected while the instrument date is still in the future, compared
    /// as calendar dates.
    pub async fn complete_payment(
        &self,
        customer_id: CustomerId,
        payment_id: PaymentId,
    ) -> Result<(), BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        ledger.complete_payment(payment_id, today())?;
        self.store.save(&ledger).await?;

        info!(%customer_id, %payment_id, "Payment completed");
        Ok(())
    }

    /// Cancels a payment without reversing invoice state
    pub async fn cancel_payment(
        &self,
        customer_id: CustomerId,
        payment_id: PaymentId,
    ) -> Result<(), BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        ledger.cancel_payment(payment_id)?;
        self.store.save(&ledger).await?;

        info!(%customer_id, %payment_id, "Payment cancelled");
        Ok(())
    }

    /// Deletes a payment, reversing every side effect it caused
    pub async fn delete_payment(
        &self,
        customer_id: CustomerId,
        payment_id: PaymentId,
    ) -> Result<(), BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        ledger.delete_payment(payment_id, today())?;
        self.store.save(&ledger).await?;

        info!(%customer_id, %payment_id, "Payment deleted and reversed");
        Ok(())
    }

    /// Grants a discount outside a payment
    pub async fn apply_discount(&self, request: NewDiscount) -> Result<Discount, BillingError> {
        let customer_id = request.customer_id;
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        let discount = ledger.apply_discount(DiscountInput {
            invoice_id: request.invoice_id,
            payment_id: None,
            amount: request.amount,
            reason: request.reason,
            date: request.date,
        })?;
        self.store.save(&ledger).await?;

        info!(%customer_id, discount_id = %discount.id, amount = %discount.amount, "Discount granted");
        Ok(discount)
    }

    /// Reverses a discount
    pub async fn reverse_discount(
        &self,
        customer_id: CustomerId,
        discount_id: DiscountId,
    ) -> Result<(), BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        ledger.reverse_discount(discount_id, today())?;
        self.store.save(&ledger).await?;

        info!(%customer_id, %discount_id, "Discount reversed");
        Ok(())
    }

    /// Posts a manual adjustment (positive debits, negative credits)
    pub async fn record_adjustment(
        &self,
        customer_id: CustomerId,
        date: NaiveDate,
        amount: Money,
        description: String,
        hidden: bool,
    ) -> Result<(), BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        ledger.record_adjustment(date, amount, description, hidden)?;
        self.store.save(&ledger).await?;

        debug!(%customer_id, %amount, hidden, "Adjustment posted");
        Ok(())
    }

    /// The statement read contract for the presentation layer
    pub async fn customer_statement(
        &self,
        customer_id: CustomerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<LedgerStatement, BillingError> {
        let ledger = self.store.load(customer_id).await?;
        Ok(ledger.statement(from, to))
    }

    /// Current cached balance
    pub async fn customer_balance(&self, customer_id: CustomerId) -> Result<Money, BillingError> {
        let ledger = self.store.load(customer_id).await?;
        Ok(ledger.customer().current_balance)
    }

    /// Loads a customer's full ledger (read-only)
    pub async fn customer_ledger(
        &self,
        customer_id: CustomerId,
    ) -> Result<CustomerLedger, BillingError> {
        self.store.load(customer_id).await
    }

    /// Forces a full journal replay and rewrites the balance cache
    pub async fn recalculate(&self, customer_id: CustomerId) -> Result<Money, BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        let balance = ledger.recalculate();
        self.store.save(&ledger).await?;

        info!(%customer_id, %balance, "Ledger recalculated");
        Ok(balance)
    }

    /// Audits the cached balance against a journal replay
    ///
    /// On divergence this logs loudly, repairs the ledger with a full
    /// recalculation, and still returns the violation so callers can
    /// investigate what drifted.
    pub async fn audit_customer(&self, customer_id: CustomerId) -> Result<Money, BillingError> {
        let lock = self.customer_lock(customer_id).await;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(customer_id).await?;
        match ledger.verify_integrity() {
            Ok(()) => Ok(ledger.customer().current_balance),
            Err(violation) => {
                error!(%customer_id, %violation, "Balance invariant violated; recalculating");
                ledger.recalculate();
                self.store.save(&ledger).await?;
                Err(violation)
            }
        }
    }

    async fn customer_lock(&self, customer_id: CustomerId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(customer_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
