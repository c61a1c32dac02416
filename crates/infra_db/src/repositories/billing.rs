//! PostgreSQL billing store
//!
//! Implements the domain's storage port. A customer's ledger is persisted
//! as one aggregate: `save` runs a single transaction that locks the
//! customer row `FOR UPDATE`, replaces every child row and updates the
//! cached balance. Either the whole aggregate commits or none of it does.
//! Queries are runtime-checked so the crate builds without a live database.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use core_kernel::{
    Currency, CustomerId, DiscountId, DistributionId, InvoiceId, LedgerEntryId, Money, PaymentId,
};
use domain_billing::customer::CustomerAccount;
use domain_billing::discount::Discount;
use domain_billing::invoice::{Invoice, InvoiceItem, InvoiceStatus};
use domain_billing::journal::{EntryType, JournalEntry};
use domain_billing::ledger::CustomerLedger;
use domain_billing::payment::{
    PayeeType, Payment, PaymentDistribution, PaymentMethod, PaymentStatus,
};
use domain_billing::{BillingError, BillingStore};

use crate::error::DatabaseError;

/// Repository persisting customer ledgers to PostgreSQL
#[derive(Debug, Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    /// Creates a new store over a connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_inner(&self, customer_id: CustomerId) -> Result<CustomerLedger, DatabaseError> {
        let customer_uuid = *customer_id.as_uuid();

        let row = sqlx::query(
            r#"
            SELECT customer_id, name, currency, opening_balance,
                   opening_balance_remaining, as_of_date, current_balance,
                   created_at, updated_at
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_uuid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Customer", customer_id))?;

        let currency = parse_currency(row.try_get::<String, _>("currency")?.as_str())?;
        let customer = CustomerAccount {
            id: customer_id,
            name: row.try_get("name")?,
            currency,
            opening_balance: money(row.try_get("opening_balance")?, currency),
            opening_balance_remaining: money(
                row.try_get("opening_balance_remaining")?,
                currency,
            ),
            as_of_date: row.try_get("as_of_date")?,
            current_balance: money(row.try_get("current_balance")?, currency),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        };

        let invoices = self.load_invoices(customer_uuid, customer_id, currency).await?;
        let entries = self.load_entries(customer_uuid, customer_id, currency).await?;
        let payments = self.load_payments(customer_uuid, customer_id, currency).await?;
        let distributions = self.load_distributions(customer_uuid, currency).await?;
        let discounts = self.load_discounts(customer_uuid, customer_id, currency).await?;

        debug!(
            %customer_id,
            invoices = invoices.len(),
            entries = entries.len(),
            payments = payments.len(),
            "Ledger loaded"
        );

        Ok(CustomerLedger::from_parts(
            customer,
            invoices,
            entries,
            payments,
            distributions,
            discounts,
        ))
    }

    async fn load_invoices(
        &self,
        customer_uuid: Uuid,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Result<Vec<Invoice>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT invoice_id, invoice_number, issue_date, due_date, items,
                   total_amount, paid_amount, pending_amount, status, notes,
                   created_at, updated_at
            FROM invoices
            WHERE customer_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(customer_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let items: Vec<InvoiceItem> =
                    serde_json::from_value(row.try_get("items")?)
                        .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
                Ok(Invoice {
                    id: InvoiceId::from_uuid(row.try_get("invoice_id")?),
                    invoice_number: row.try_get("invoice_number")?,
                    customer_id,
                    issue_date: row.try_get("issue_date")?,
                    due_date: row.try_get("due_date")?,
                    items,
                    total_amount: money(row.try_get("total_amount")?, currency),
                    paid_amount: money(row.try_get("paid_amount")?, currency),
                    pending_amount: money(row.try_get("pending_amount")?, currency),
                    status: InvoiceStatus::from_str(
                        row.try_get::<String, _>("status")?.as_str(),
                    ),
                    notes: row.try_get("notes")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    async fn load_entries(
        &self,
        customer_uuid: Uuid,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Result<Vec<JournalEntry>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, entry_date, entry_type, reference_id,
                   reference_number, debit, credit, balance, is_hidden,
                   description, created_at
            FROM journal_entries
            WHERE customer_id = $1
            ORDER BY entry_date, created_at
            "#,
        )
        .bind(customer_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(JournalEntry {
                    id: LedgerEntryId::from_uuid(row.try_get("entry_id")?),
                    customer_id,
                    date: row.try_get("entry_date")?,
                    entry_type: EntryType::from_str(
                        row.try_get::<String, _>("entry_type")?.as_str(),
                    ),
                    reference_id: row.try_get("reference_id")?,
                    reference_number: row.try_get("reference_number")?,
                    debit: money(row.try_get("debit")?, currency),
                    credit: money(row.try_get("credit")?, currency),
                    balance: money(row.try_get("balance")?, currency),
                    is_hidden: row.try_get("is_hidden")?,
                    description: row.try_get("description")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn load_payments(
        &self,
        customer_uuid: Uuid,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Result<Vec<Payment>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT payment_id, payment_number, payment_date, total_received,
                   discount_amount, method, instrument_date, status, notes,
                   created_at, updated_at
            FROM payments
            WHERE customer_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(customer_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Payment {
                    id: PaymentId::from_uuid(row.try_get("payment_id")?),
                    payment_number: row.try_get("payment_number")?,
                    customer_id,
                    date: row.try_get("payment_date")?,
                    total_received: money(row.try_get("total_received")?, currency),
                    discount_amount: money(row.try_get("discount_amount")?, currency),
                    method: PaymentMethod::from_str(
                        row.try_get::<String, _>("method")?.as_str(),
                    ),
                    instrument_date: row.try_get("instrument_date")?,
                    status: PaymentStatus::from_str(
                        row.try_get::<String, _>("status")?.as_str(),
                    ),
                    notes: row.try_get("notes")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    async fn load_distributions(
        &self,
        customer_uuid: Uuid,
        currency: Currency,
    ) -> Result<Vec<PaymentDistribution>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT distribution_id, payment_id, payee_type, target_id, amount,
                   purpose, created_at
            FROM payment_distributions
            WHERE customer_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(customer_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PaymentDistribution {
                    id: DistributionId::from_uuid(row.try_get("distribution_id")?),
                    payment_id: PaymentId::from_uuid(row.try_get("payment_id")?),
                    payee_type: PayeeType::from_str(
                        row.try_get::<String, _>("payee_type")?.as_str(),
                    ),
                    target_id: row.try_get("target_id")?,
                    amount: money(row.try_get("amount")?, currency),
                    purpose: row.try_get("purpose")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn load_discounts(
        &self,
        customer_uuid: Uuid,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Result<Vec<Discount>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT discount_id, invoice_id, payment_id, amount, reason,
                   discount_date, created_at
            FROM discounts
            WHERE customer_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(customer_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Discount {
                    id: DiscountId::from_uuid(row.try_get("discount_id")?),
                    customer_id,
                    invoice_id: row
                        .try_get::<Option<Uuid>, _>("invoice_id")?
                        .map(InvoiceId::from_uuid),
                    payment_id: row
                        .try_get::<Option<Uuid>, _>("payment_id")?
                        .map(PaymentId::from_uuid),
                    amount: money(row.try_get("amount")?, currency),
                    reason: row.try_get("reason")?,
                    date: row.try_get("discount_date")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn save_inner(
        &self,
        ledger: &CustomerLedger,
        create: bool,
    ) -> Result<(), DatabaseError> {
        let customer = ledger.customer();
        let customer_uuid = *customer.id.as_uuid();

        let mut tx = self.pool.begin().await?;

        if create {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM customers WHERE customer_id = $1)",
            )
            .bind(customer_uuid)
            .fetch_one(&mut *tx)
            .await?;
            if exists {
                return Err(DatabaseError::DuplicateEntry(format!(
                    "Customer {} already exists",
                    customer.id
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO customers (
                    customer_id, name, currency, opening_balance,
                    opening_balance_remaining, as_of_date, current_balance,
                    created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(customer_uuid)
            .bind(&customer.name)
            .bind(customer.currency.code())
            .bind(customer.opening_balance.amount())
            .bind(customer.opening_balance_remaining.amount())
            .bind(customer.as_of_date)
            .bind(customer.current_balance.amount())
            .bind(customer.created_at)
            .bind(customer.updated_at)
            .execute(&mut *tx)
            .await?;
        } else {
            // Per-customer serialization across processes: the row lock
            // holds until the whole aggregate commits.
            let locked = sqlx::query(
                "SELECT customer_id FROM customers WHERE customer_id = $1 FOR UPDATE",
            )
            .bind(customer_uuid)
            .fetch_optional(&mut *tx)
            .await?;
            if locked.is_none() {
                return Err(DatabaseError::not_found("Customer", customer.id));
            }

            sqlx::query(
                r#"
                UPDATE customers
                SET name = $2, opening_balance = $3, opening_balance_remaining = $4,
                    as_of_date = $5, current_balance = $6, updated_at = $7
                WHERE customer_id = $1
                "#,
            )
            .bind(customer_uuid)
            .bind(&customer.name)
            .bind(customer.opening_balance.amount())
            .bind(customer.opening_balance_remaining.amount())
            .bind(customer.as_of_date)
            .bind(customer.current_balance.amount())
            .bind(customer.updated_at)
            .execute(&mut *tx)
            .await?;

            for table in [
                "payment_distributions",
                "discounts",
                "payments",
                "journal_entries",
                "invoices",
            ] {
                sqlx::query(&format!("DELETE FROM {} WHERE customer_id = $1", table))
                    .bind(customer_uuid)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        self.insert_children(&mut tx, ledger, customer_uuid).await?;

        tx.commit().await?;

        info!(customer_id = %customer.id, balance = %customer.current_balance, "Ledger saved");
        Ok(())
    }

    async fn insert_children(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ledger: &CustomerLedger,
        customer_uuid: Uuid,
    ) -> Result<(), DatabaseError> {
        for invoice in ledger.invoices() {
            let items = serde_json::to_value(&invoice.items)
                .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO invoices (
                    invoice_id, customer_id, invoice_number, issue_date, due_date,
                    items, total_amount, paid_amount, pending_amount, status,
                    notes, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(*invoice.id.as_uuid())
            .bind(customer_uuid)
            .bind(&invoice.invoice_number)
            .bind(invoice.issue_date)
            .bind(invoice.due_date)
            .bind(items)
            .bind(invoice.total_amount.amount())
            .bind(invoice.paid_amount.amount())
            .bind(invoice.pending_amount.amount())
            .bind(invoice.status.as_str())
            .bind(&invoice.notes)
            .bind(invoice.created_at)
            .bind(invoice.updated_at)
            .execute(&mut **tx)
            .await?;
        }

        for entry in ledger.journal_entries() {
            sqlx::query(
                r#"
                INSERT INTO journal_entries (
                    entry_id, customer_id, entry_date, entry_type, reference_id,
                    reference_number, debit, credit, balance, is_hidden,
                    description, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(*entry.id.as_uuid())
            .bind(customer_uuid)
            .bind(entry.date)
            .bind(entry.entry_type.as_str())
            .bind(entry.reference_id)
            .bind(&entry.reference_number)
            .bind(entry.debit.amount())
            .bind(entry.credit.amount())
            .bind(entry.balance.amount())
            .bind(entry.is_hidden)
            .bind(&entry.description)
            .bind(entry.created_at)
            .execute(&mut **tx)
            .await?;
        }

        for payment in ledger.payments() {
            sqlx::query(
                r#"
                INSERT INTO payments (
                    payment_id, customer_id, payment_number, payment_date,
                    total_received, discount_amount, method, instrument_date,
                    status, notes, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(*payment.id.as_uuid())
            .bind(customer_uuid)
            .bind(&payment.payment_number)
            .bind(payment.date)
            .bind(payment.total_received.amount())
            .bind(payment.discount_amount.amount())
            .bind(payment.method.as_str())
            .bind(payment.instrument_date)
            .bind(payment.status.as_str())
            .bind(&payment.notes)
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .execute(&mut **tx)
            .await?;
        }

        for dist in ledger.distributions() {
            sqlx::query(
                r#"
                INSERT INTO payment_distributions (
                    distribution_id, customer_id, payment_id, payee_type,
                    target_id, amount, purpose, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(*dist.id.as_uuid())
            .bind(customer_uuid)
            .bind(*dist.payment_id.as_uuid())
            .bind(dist.payee_type.as_str())
            .bind(dist.target_id)
            .bind(dist.amount.amount())
            .bind(&dist.purpose)
            .bind(dist.created_at)
            .execute(&mut **tx)
            .await?;
        }

        for discount in ledger.discounts() {
            sqlx::query(
                r#"
                INSERT INTO discounts (
                    discount_id, customer_id, invoice_id, payment_id, amount,
                    reason, discount_date, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(*discount.id.as_uuid())
            .bind(customer_uuid)
            .bind(discount.invoice_id.map(|id| *id.as_uuid()))
            .bind(discount.payment_id.map(|id| *id.as_uuid()))
            .bind(discount.amount.amount())
            .bind(&discount.reason)
            .bind(discount.date)
            .bind(discount.created_at)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn load(&self, customer_id: CustomerId) -> Result<CustomerLedger, BillingError> {
        Ok(self.load_inner(customer_id).await?)
    }

    async fn create(&self, ledger: &CustomerLedger) -> Result<(), BillingError> {
        self.save_inner(ledger, true).await.map_err(|error| match error {
            DatabaseError::DuplicateEntry(message) => BillingError::StateConflict(message),
            other => other.into(),
        })
    }

    async fn save(&self, ledger: &CustomerLedger) -> Result<(), BillingError> {
        Ok(self.save_inner(ledger, false).await?)
    }

    async fn payment_number_taken(&self, payment_number: &str) -> Result<bool, BillingError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payments WHERE payment_number = $1)",
        )
        .bind(payment_number)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::SqlError)?;
        Ok(taken)
    }

    async fn next_payment_sequence(&self, year: i32) -> Result<u32, BillingError> {
        let value: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO payment_sequences (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year)
            DO UPDATE SET last_value = payment_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::SqlError)?;
        Ok(value as u32)
    }
}

fn money(amount: Decimal, currency: Currency) -> Money {
    Money::new(amount, currency)
}

fn parse_currency(code: &str) -> Result<Currency, DatabaseError> {
    Currency::from_code(code).ok_or_else(|| {
        DatabaseError::SerializationError(format!("Unknown currency code '{}'", code))
    })
}
