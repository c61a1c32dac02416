//! Payment lifecycle tests through the service and storage port
//!
//! These exercise the full orchestration path: per-customer locking, load,
//! aggregate mutation, atomic save against the in-memory store.

use std::sync::{Arc, Once};

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{Currency, CustomerId, InvoiceId, Money};

use domain_billing::error::BillingError;
use domain_billing::invoice::{InvoiceItem, InvoiceStatus};
use domain_billing::payment::{PaymentMethod, PaymentStatus};
use domain_billing::services::{
    BillingService, NewCustomer, NewDiscount, NewInvoice, NewPayment,
};
use domain_billing::InMemoryBillingStore;

fn pkr(amount: Decimal) -> Money {
    Money::new(amount, Currency::PKR)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,domain_billing=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn service() -> BillingService<InMemoryBillingStore> {
    init_tracing();
    BillingService::new(Arc::new(InMemoryBillingStore::new()))
}

async fn register_customer(
    service: &BillingService<InMemoryBillingStore>,
    opening: Decimal,
) -> CustomerId {
    service
        .register_customer(NewCustomer {
            name: "Khan Traders".to_string(),
            currency: Currency::PKR,
            opening_balance: pkr(opening),
            as_of_date: today() - Days::new(90),
        })
        .await
        .unwrap()
}

async fn record_invoice(
    service: &BillingService<InMemoryBillingStore>,
    customer_id: CustomerId,
    number: &str,
    due_in_days: u64,
    total: Decimal,
) -> InvoiceId {
    service
        .record_invoice(NewInvoice {
            customer_id,
            invoice_number: Some(number.to_string()),
            issue_date: today() - Days::new(10),
            due_date: today() + Days::new(due_in_days),
            items: vec![InvoiceItem::new("Goods", pkr(total))],
            notes: None,
        })
        .await
        .unwrap()
}

fn cash_payment(customer_id: CustomerId, received: Decimal, discount: Decimal) -> NewPayment {
    NewPayment {
        customer_id,
        payment_number: None,
        date: today(),
        total_received: pkr(received),
        discount_amount: pkr(discount),
        discount_reason: None,
        method: PaymentMethod::Cash,
        instrument_date: None,
        notes: None,
        treat_excess_as_credit: false,
    }
}

#[tokio::test]
async fn fifo_payment_flows_through_service() {
    let service = service();
    let customer_id = register_customer(&service, dec!(5000)).await;
    let first = record_invoice(&service, customer_id, "INV-1001", 30, dec!(10000)).await;
    let second = record_invoice(&service, customer_id, "INV-1002", 60, dec!(8000)).await;

    let payment = service
        .create_payment(cash_payment(customer_id, dec!(15000), dec!(2000)))
        .await
        .unwrap();

    assert!(payment.payment_number.starts_with("PAY-"));

    let ledger = service.customer_ledger(customer_id).await.unwrap();
    assert!(ledger.customer().opening_balance_remaining.is_zero());
    assert_eq!(ledger.invoice(&first).unwrap().status, InvoiceStatus::Paid);
    assert_eq!(
        ledger.invoice(&second).unwrap().pending_amount,
        pkr(dec!(6000))
    );
    assert_eq!(
        service.customer_balance(customer_id).await.unwrap(),
        pkr(dec!(6000))
    );
}

#[tokio::test]
async fn generated_payment_numbers_are_sequential_within_a_year() {
    let service = service();
    let customer_id = register_customer(&service, dec!(50000)).await;

    let first = service
        .create_payment(cash_payment(customer_id, dec!(1000), dec!(0)))
        .await
        .unwrap();
    let second = service
        .create_payment(cash_payment(customer_id, dec!(1000), dec!(0)))
        .await
        .unwrap();

    let year = today().format("%Y").to_string();
    assert_eq!(first.payment_number, format!("PAY-{}-0001", year));
    assert_eq!(second.payment_number, format!("PAY-{}-0002", year));
}

#[tokio::test]
async fn duplicate_payment_number_leaves_no_partial_rows() {
    let service = service();
    let customer_id = register_customer(&service, dec!(50000)).await;

    let mut request = cash_payment(customer_id, dec!(1000), dec!(0));
    request.payment_number = Some("PAY-2024-0042".to_string());
    service.create_payment(request.clone()).await.unwrap();

    let before = service.customer_ledger(customer_id).await.unwrap();
    let result = service.create_payment(request).await;

    assert!(matches!(
        result,
        Err(BillingError::DuplicatePaymentNumber(_))
    ));

    let after = service.customer_ledger(customer_id).await.unwrap();
    assert_eq!(before.payments().count(), after.payments().count());
    assert_eq!(before.distributions().len(), after.distributions().len());
    assert_eq!(
        before.journal_entries().len(),
        after.journal_entries().len()
    );
    assert_eq!(
        before.customer().current_balance,
        after.customer().current_balance
    );
}

#[tokio::test]
async fn future_dated_cheque_cannot_complete_until_due() {
    let service = service();
    let customer_id = register_customer(&service, dec!(50000)).await;

    let mut request = cash_payment(customer_id, dec!(5000), dec!(0));
    request.method = PaymentMethod::Cheque;
    request.instrument_date = Some(today() + Days::new(1));
    let future_cheque = service.create_payment(request).await.unwrap();
    assert_eq!(future_cheque.status, PaymentStatus::Pending);

    let result = service
        .complete_payment(customer_id, future_cheque.id)
        .await;
    assert!(matches!(
        result,
        Err(BillingError::FutureInstrumentDate { .. })
    ));

    let mut request = cash_payment(customer_id, dec!(5000), dec!(0));
    request.method = PaymentMethod::Cheque;
    request.instrument_date = Some(today());
    let due_cheque = service.create_payment(request).await.unwrap();

    service
        .complete_payment(customer_id, due_cheque.id)
        .await
        .unwrap();
    let ledger = service.customer_ledger(customer_id).await.unwrap();
    assert_eq!(
        ledger.payment(&due_cheque.id).unwrap().status,
        PaymentStatus::Completed
    );
}

#[tokio::test]
async fn create_then_delete_payment_restores_prior_state() {
    let service = service();
    let customer_id = register_customer(&service, dec!(5000)).await;
    let first = record_invoice(&service, customer_id, "INV-1001", 30, dec!(10000)).await;
    let second = record_invoice(&service, customer_id, "INV-1002", 60, dec!(8000)).await;

    let before = service.customer_ledger(customer_id).await.unwrap();

    let payment = service
        .create_payment(cash_payment(customer_id, dec!(15000), dec!(2000)))
        .await
        .unwrap();
    service
        .delete_payment(customer_id, payment.id)
        .await
        .unwrap();

    let after = service.customer_ledger(customer_id).await.unwrap();
    assert_eq!(
        before.customer().current_balance,
        after.customer().current_balance
    );
    assert_eq!(
        before.customer().opening_balance_remaining,
        after.customer().opening_balance_remaining
    );
    for invoice_id in [first, second] {
        let old = before.invoice(&invoice_id).unwrap();
        let new = after.invoice(&invoice_id).unwrap();
        assert_eq!(old.paid_amount, new.paid_amount);
        assert_eq!(old.pending_amount, new.pending_amount);
        assert_eq!(old.status, new.status);
    }
    assert_eq!(after.payments().count(), 0);
    assert!(after.distributions().is_empty());
}

#[tokio::test]
async fn failed_payment_persists_nothing() {
    let service = service();
    let customer_id = register_customer(&service, dec!(0)).await;
    record_invoice(&service, customer_id, "INV-1001", 30, dec!(1000)).await;

    let before = service.customer_ledger(customer_id).await.unwrap();

    // Cash beyond every obligation is rejected by default.
    let result = service
        .create_payment(cash_payment(customer_id, dec!(4000), dec!(0)))
        .await;
    assert!(matches!(result, Err(BillingError::UnappliedPayment { .. })));

    let after = service.customer_ledger(customer_id).await.unwrap();
    assert_eq!(before.payments().count(), after.payments().count());
    assert_eq!(
        before.customer().current_balance,
        after.customer().current_balance
    );
    assert_eq!(
        before.journal_entries().len(),
        after.journal_entries().len()
    );
}

#[tokio::test]
async fn discount_bound_enforced_through_service() {
    let service = service();
    let customer_id = register_customer(&service, dec!(0)).await;
    let invoice_id = record_invoice(&service, customer_id, "INV-1001", 30, dec!(1000)).await;

    let result = service
        .apply_discount(NewDiscount {
            customer_id,
            invoice_id: Some(invoice_id),
            amount: pkr(dec!(2500)),
            reason: "Too generous".to_string(),
            date: today(),
        })
        .await;

    assert!(matches!(
        result,
        Err(BillingError::DiscountExceedsBalance { .. })
    ));

    let granted = service
        .apply_discount(NewDiscount {
            customer_id,
            invoice_id: Some(invoice_id),
            amount: pkr(dec!(400)),
            reason: "Season goodwill".to_string(),
            date: today(),
        })
        .await
        .unwrap();
    assert_eq!(granted.amount, pkr(dec!(400)));

    service
        .reverse_discount(customer_id, granted.id)
        .await
        .unwrap();
    assert_eq!(
        service.customer_balance(customer_id).await.unwrap(),
        pkr(dec!(1000))
    );
}

#[tokio::test]
async fn statement_read_contract_for_presentation_layer() {
    let service = service();
    let customer_id = register_customer(&service, dec!(5000)).await;
    record_invoice(&service, customer_id, "INV-1001", 30, dec!(3000)).await;
    service
        .create_payment(cash_payment(customer_id, dec!(4000), dec!(0)))
        .await
        .unwrap();

    let statement = service
        .customer_statement(customer_id, today() - Days::new(30), today())
        .await
        .unwrap();

    assert_eq!(statement.opening_balance, pkr(dec!(5000)));
    assert_eq!(statement.total_debits, pkr(dec!(3000)));
    assert_eq!(statement.total_credits, pkr(dec!(4000)));
    assert_eq!(statement.closing_balance, pkr(dec!(4000)));
    assert_eq!(
        statement.closing_balance,
        statement.opening_balance + statement.total_debits - statement.total_credits
    );
}

#[tokio::test]
async fn audit_detects_and_repairs_nothing_on_healthy_ledger() {
    let service = service();
    let customer_id = register_customer(&service, dec!(5000)).await;
    record_invoice(&service, customer_id, "INV-1001", 30, dec!(3000)).await;

    let balance = service.audit_customer(customer_id).await.unwrap();
    assert_eq!(balance, pkr(dec!(8000)));

    let recalculated = service.recalculate(customer_id).await.unwrap();
    assert_eq!(recalculated, balance);
}

#[tokio::test]
async fn operations_for_different_customers_run_independently() {
    let service = Arc::new(service());
    let first = register_customer(&service, dec!(10000)).await;
    let second = register_customer(&service, dec!(10000)).await;

    let mut handles = Vec::new();
    for customer_id in [first, second] {
        for _ in 0..5 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .create_payment(NewPayment {
                        customer_id,
                        payment_number: None,
                        date: today(),
                        total_received: pkr(dec!(1000)),
                        discount_amount: pkr(dec!(0)),
                        discount_reason: None,
                        method: PaymentMethod::Cash,
                        instrument_date: None,
                        notes: None,
                        treat_excess_as_credit: false,
                    })
                    .await
                    .unwrap();
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Serialized postings per customer: no lost updates on either ledger.
    for customer_id in [first, second] {
        assert_eq!(
            service.customer_balance(customer_id).await.unwrap(),
            pkr(dec!(5000))
        );
        let ledger = service.customer_ledger(customer_id).await.unwrap();
        assert!(ledger.verify_integrity().is_ok());
        assert_eq!(ledger.payments().count(), 5);
    }
}
