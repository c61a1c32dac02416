//! Test Data Builders
//!
//! Builder patterns for constructing test data with sensible defaults.
//! Tests specify only the fields they care about.

use chrono::NaiveDate;
use core_kernel::{Currency, CustomerId, Money};
use rust_decimal::Decimal;

use domain_billing::customer::CustomerAccount;
use domain_billing::invoice::{Invoice, InvoiceItem};
use domain_billing::ledger::{CustomerLedger, PaymentInput};
use domain_billing::payment::PaymentMethod;

use crate::fixtures::{MoneyFixtures, StringFixtures, TemporalFixtures};

/// Builder for an opened customer ledger
pub struct TestLedgerBuilder {
    name: String,
    currency: Currency,
    opening_balance: Money,
    as_of_date: NaiveDate,
}

impl Default for TestLedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLedgerBuilder {
    /// Creates a builder with a zero opening balance
    pub fn new() -> Self {
        Self {
            name: StringFixtures::customer_name(),
            currency: Currency::PKR,
            opening_balance: MoneyFixtures::pkr_zero(),
            as_of_date: TemporalFixtures::opening_date(),
        }
    }

    /// Sets the customer name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the opening balance
    pub fn with_opening_balance(mut self, amount: Decimal) -> Self {
        self.opening_balance = MoneyFixtures::pkr(amount);
        self
    }

    /// Sets the opening-balance date
    pub fn with_as_of_date(mut self, date: NaiveDate) -> Self {
        self.as_of_date = date;
        self
    }

    /// Opens the ledger
    pub fn build(self) -> CustomerLedger {
        let customer = CustomerAccount::new(
            self.name,
            self.currency,
            self.opening_balance,
            self.as_of_date,
        );
        CustomerLedger::open(customer).expect("Failed to open test ledger")
    }
}

/// Builder for test invoices
pub struct TestInvoiceBuilder {
    customer_id: CustomerId,
    invoice_number: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    items: Vec<InvoiceItem>,
}

impl TestInvoiceBuilder {
    /// Creates a builder for the given customer with a single 10,000 item
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            invoice_number: StringFixtures::invoice_number(1),
            issue_date: TemporalFixtures::opening_date(),
            due_date: TemporalFixtures::january_due(),
            items: vec![InvoiceItem::new(
                "Goods",
                MoneyFixtures::pkr_invoice_total(),
            )],
        }
    }

    /// Sets the invoice number
    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = number.into();
        self
    }

    /// Sets the due date
    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        self
    }

    /// Replaces the line items with a single item of the given total
    pub fn with_total(mut self, total: Decimal) -> Self {
        self.items = vec![InvoiceItem::new("Goods", MoneyFixtures::pkr(total))];
        self
    }

    /// Builds the invoice
    pub fn build(self) -> Invoice {
        Invoice::new(
            self.customer_id,
            self.invoice_number,
            self.issue_date,
            self.due_date,
            self.items,
            Currency::PKR,
        )
        .expect("Failed to build test invoice")
    }
}

/// Builder for payment inputs against a ledger
pub struct TestPaymentBuilder {
    payment_number: String,
    date: NaiveDate,
    total_received: Money,
    discount_amount: Money,
    method: PaymentMethod,
    instrument_date: Option<NaiveDate>,
    treat_excess_as_credit: bool,
}

impl TestPaymentBuilder {
    /// Creates a cash payment builder
    pub fn new(sequence: u32, received: Decimal) -> Self {
        Self {
            payment_number: StringFixtures::payment_number(sequence),
            date: TemporalFixtures::payment_date(),
            total_received: MoneyFixtures::pkr(received),
            discount_amount: MoneyFixtures::pkr_zero(),
            method: PaymentMethod::Cash,
            instrument_date: None,
            treat_excess_as_credit: false,
        }
    }

    /// Adds a discount
    pub fn with_discount(mut self, amount: Decimal) -> Self {
        self.discount_amount = MoneyFixtures::pkr(amount);
        self
    }

    /// Makes this a cheque payment with the given instrument date
    pub fn as_cheque(mut self, instrument_date: NaiveDate) -> Self {
        self.method = PaymentMethod::Cheque;
        self.instrument_date = Some(instrument_date);
        self
    }

    /// Allows excess cash to post as customer credit
    pub fn allowing_excess_credit(mut self) -> Self {
        self.treat_excess_as_credit = true;
        self
    }

    /// Builds the payment input
    pub fn build(self) -> PaymentInput {
        PaymentInput {
            payment_number: self.payment_number,
            date: self.date,
            total_received: self.total_received,
            discount_amount: self.discount_amount,
            discount_reason: None,
            method: self.method,
            instrument_date: self.instrument_date,
            notes: None,
            treat_excess_as_credit: self.treat_excess_as_credit,
        }
    }
}
