//! Append-only customer journal
//!
//! Every balance in the system is backed by this journal: an ordered
//! sequence of immutable debit/credit entries per customer, each carrying a
//! running-balance snapshot. The snapshot sequence, ordered by
//! `(date, created_at)`, is always the prefix sum of `debit - credit`; any
//! mutation that is not provably the chronologically-latest entry triggers
//! a full recalculation, because an earlier change invalidates every later
//! snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{Currency, CustomerId, LedgerEntryId, Money};

use crate::error::BillingError;

/// What caused a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// An invoice was recorded (debit)
    Invoice,
    /// A payment was received (credit)
    Payment,
    /// A discount was granted (credit)
    Discount,
    /// The customer's opening balance (debit)
    OpeningBalance,
    /// A manual adjustment
    Adjustment,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Invoice => "invoice",
            EntryType::Payment => "payment",
            EntryType::Discount => "discount",
            EntryType::OpeningBalance => "opening_balance",
            EntryType::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "payment" => EntryType::Payment,
            "discount" => EntryType::Discount,
            "opening_balance" => EntryType::OpeningBalance,
            "adjustment" => EntryType::Adjustment,
            _ => EntryType::Invoice,
        }
    }
}

/// One immutable posting to a customer's ledger
///
/// Exactly one of `debit`/`credit` is non-zero. `balance` is the running
/// snapshot after this entry in `(date, created_at)` order; it is the only
/// field ever rewritten, and only by [`CustomerJournal::recalculate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique identifier
    pub id: LedgerEntryId,
    /// Owning customer
    pub customer_id: CustomerId,
    /// Business date of the posting
    pub date: NaiveDate,
    /// What caused the entry
    pub entry_type: EntryType,
    /// Invoice/payment/discount that caused it
    pub reference_id: Uuid,
    /// Display number of the reference, denormalized for statements
    pub reference_number: String,
    /// Debit amount (increases what the customer owes)
    pub debit: Money,
    /// Credit amount (decreases what the customer owes)
    pub credit: Money,
    /// Running balance after this entry
    pub balance: Money,
    /// Internal bookkeeping entries are excluded from statements but
    /// included in balance math
    pub is_hidden: bool,
    /// Description
    pub description: String,
    /// Created timestamp (tie-break within a date)
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Signed effect on the customer's balance
    pub fn signed_amount(&self) -> Money {
        self.debit - self.credit
    }
}

/// A posting not yet in the journal
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub date: NaiveDate,
    pub entry_type: EntryType,
    pub reference_id: Uuid,
    pub reference_number: String,
    pub debit: Money,
    pub credit: Money,
    pub description: String,
    pub is_hidden: bool,
}

impl NewEntry {
    /// Creates a debit posting
    pub fn debit(
        date: NaiveDate,
        entry_type: EntryType,
        reference_id: Uuid,
        reference_number: impl Into<String>,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            date,
            entry_type,
            reference_id,
            reference_number: reference_number.into(),
            debit: amount,
            credit: Money::zero(amount.currency()),
            description: description.into(),
            is_hidden: false,
        }
    }

    /// Creates a credit posting
    pub fn credit(
        date: NaiveDate,
        entry_type: EntryType,
        reference_id: Uuid,
        reference_number: impl Into<String>,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            date,
            entry_type,
            reference_id,
            reference_number: reference_number.into(),
            debit: Money::zero(amount.currency()),
            credit: amount,
            description: description.into(),
            is_hidden: false,
        }
    }

    /// Marks the entry as internal bookkeeping
    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }
}

/// One line of a customer-facing statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementLine {
    pub date: NaiveDate,
    pub entry_type: EntryType,
    pub reference_number: String,
    pub debit: Money,
    pub credit: Money,
    pub balance: Money,
    pub description: String,
}

/// The read contract the presentation layer depends on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStatement {
    pub customer_id: CustomerId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub opening_balance: Money,
    pub closing_balance: Money,
    pub total_debits: Money,
    pub total_credits: Money,
    pub lines: Vec<StatementLine>,
}

/// The append-only journal for a single customer
///
/// Entries are held in insertion order; chronological order is
/// `(date, created_at)` with stable sorting, so same-instant entries keep
/// their insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerJournal {
    customer_id: CustomerId,
    currency: Currency,
    entries: Vec<JournalEntry>,
}

impl CustomerJournal {
    /// Creates an empty journal
    pub fn new(customer_id: CustomerId, currency: Currency) -> Self {
        Self {
            customer_id,
            currency,
            entries: Vec::new(),
        }
    }

    /// Rebuilds a journal from persisted entries
    ///
    /// The entries are re-sorted chronologically and every snapshot is
    /// recomputed, so a journal loaded from storage is always consistent.
    pub fn from_entries(
        customer_id: CustomerId,
        currency: Currency,
        entries: Vec<JournalEntry>,
    ) -> Self {
        let mut journal = Self {
            customer_id,
            currency,
            entries,
        };
        journal.recalculate();
        journal
    }

    /// All entries, chronologically ordered
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Balance after the chronologically-latest entry (zero when empty)
    pub fn last_balance(&self) -> Money {
        self.entries
            .last()
            .map(|entry| entry.balance)
            .unwrap_or_else(|| Money::zero(self.currency))
    }

    /// Appends an entry, computing its running-balance snapshot
    ///
    /// The snapshot is `previous_balance + debit - credit` where the
    /// previous balance comes from the latest `(date, created_at)` entry.
    /// An entry dated earlier than the current latest invalidates later
    /// snapshots, so the whole journal is recalculated in that case.
    ///
    /// # Errors
    ///
    /// `Validation` unless exactly one of debit/credit is a positive
    /// amount in the journal's currency.
    pub fn append(&mut self, new: NewEntry) -> Result<&JournalEntry, BillingError> {
        self.validate(&new)?;

        let created_at = Utc::now();
        let needs_recalculation = self
            .entries
            .last()
            .map(|last| new.date < last.date)
            .unwrap_or(false);

        let balance = self.last_balance() + new.debit - new.credit;
        self.entries.push(JournalEntry {
            id: LedgerEntryId::new_v7(),
            customer_id: self.customer_id,
            date: new.date,
            entry_type: new.entry_type,
            reference_id: new.reference_id,
            reference_number: new.reference_number,
            debit: new.debit,
            credit: new.credit,
            balance,
            is_hidden: new.is_hidden,
            description: new.description,
            created_at,
        });

        if needs_recalculation {
            self.recalculate();
        }

        // Position of the entry just appended: last unless recalculation
        // re-sorted an out-of-order date into place.
        let index = self
            .entries
            .iter()
            .rposition(|entry| entry.created_at == created_at)
            .unwrap_or(self.entries.len() - 1);
        Ok(&self.entries[index])
    }

    /// Removes every entry for a reference and recalculates
    ///
    /// Returns the number of entries removed.
    pub fn remove_entries(&mut self, reference_id: Uuid, entry_type: EntryType) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !(entry.reference_id == reference_id && entry.entry_type == entry_type));
        let removed = before - self.entries.len();

        if removed > 0 {
            self.recalculate();
        }

        removed
    }

    /// Replays every entry in `(date, created_at)` order, rewriting each
    /// running-balance snapshot
    ///
    /// Idempotent; this is the authoritative repair operation after any
    /// non-latest insertion or deletion.
    pub fn recalculate(&mut self) -> Money {
        self.entries
            .sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));

        let mut balance = Money::zero(self.currency);
        for entry in &mut self.entries {
            balance = balance + entry.debit - entry.credit;
            entry.balance = balance;
        }

        balance
    }

    /// Replay without mutation, for integrity checks
    pub fn computed_balance(&self) -> Money {
        self.entries
            .iter()
            .fold(Money::zero(self.currency), |acc, entry| {
                acc + entry.debit - entry.credit
            })
    }

    /// Builds the customer-facing statement for a date range
    ///
    /// Hidden entries are excluded from the lines but included in the
    /// opening balance and range totals, so
    /// `closing == opening + total_debits - total_credits` always agrees
    /// with the running balance.
    pub fn statement(&self, from: NaiveDate, to: NaiveDate) -> LedgerStatement {
        let zero = Money::zero(self.currency);

        let opening_balance = self
            .entries
            .iter()
            .filter(|entry| entry.date < from)
            .fold(zero, |acc, entry| acc + entry.signed_amount());

        let mut total_debits = zero;
        let mut total_credits = zero;
        let mut lines = Vec::new();

        for entry in self
            .entries
            .iter()
            .filter(|entry| entry.date >= from && entry.date <= to)
        {
            total_debits = total_debits + entry.debit;
            total_credits = total_credits + entry.credit;

            if !entry.is_hidden {
                lines.push(StatementLine {
                    date: entry.date,
                    entry_type: entry.entry_type,
                    reference_number: entry.reference_number.clone(),
                    debit: entry.debit,
                    credit: entry.credit,
                    balance: entry.balance,
                    description: entry.description.clone(),
                });
            }
        }

        LedgerStatement {
            customer_id: self.customer_id,
            from,
            to,
            opening_balance,
            closing_balance: opening_balance + total_debits - total_credits,
            total_debits,
            total_credits,
            lines,
        }
    }

    fn validate(&self, new: &NewEntry) -> Result<(), BillingError> {
        if new.debit.currency() != self.currency || new.credit.currency() != self.currency {
            return Err(BillingError::validation(format!(
                "Journal entries must be in {}",
                self.currency
            )));
        }
        if new.debit.is_negative() || new.credit.is_negative() {
            return Err(BillingError::validation(
                "Journal amounts must not be negative",
            ));
        }
        match (new.debit.is_positive(), new.credit.is_positive()) {
            (true, false) | (false, true) => Ok(()),
            _ => Err(BillingError::validation(
                "Exactly one of debit or credit must be non-zero",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn pkr(amount: Decimal) -> Money {
        Money::new(amount, Currency::PKR)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn journal() -> CustomerJournal {
        CustomerJournal::new(CustomerId::new(), Currency::PKR)
    }

    #[test]
    fn test_append_computes_running_balance() {
        let mut journal = journal();

        let first = journal
            .append(NewEntry::debit(
                date(2024, 1, 1),
                EntryType::Invoice,
                Uuid::new_v4(),
                "INV-1",
                pkr(dec!(1000)),
                "Invoice INV-1",
            ))
            .unwrap();
        assert_eq!(first.balance, pkr(dec!(1000)));

        let second = journal
            .append(NewEntry::credit(
                date(2024, 1, 5),
                EntryType::Payment,
                Uuid::new_v4(),
                "PAY-2024-0001",
                pkr(dec!(400)),
                "Payment PAY-2024-0001",
            ))
            .unwrap();
        assert_eq!(second.balance, pkr(dec!(600)));
        assert_eq!(journal.last_balance(), pkr(dec!(600)));
    }

    #[test]
    fn test_backdated_entry_triggers_recalculation() {
        let mut journal = journal();

        journal
            .append(NewEntry::debit(
                date(2024, 2, 1),
                EntryType::Invoice,
                Uuid::new_v4(),
                "INV-2",
                pkr(dec!(500)),
                "Invoice INV-2",
            ))
            .unwrap();

        // Earlier date than the existing entry: snapshots must be rebuilt.
        journal
            .append(NewEntry::debit(
                date(2024, 1, 1),
                EntryType::OpeningBalance,
                Uuid::new_v4(),
                "OB",
                pkr(dec!(300)),
                "Opening balance",
            ))
            .unwrap();

        let balances: Vec<Decimal> = journal
            .entries()
            .iter()
            .map(|entry| entry.balance.amount())
            .collect();
        assert_eq!(balances, vec![dec!(300), dec!(800)]);
        assert_eq!(journal.last_balance(), pkr(dec!(800)));
    }

    #[test]
    fn test_both_sides_rejected() {
        let mut journal = journal();
        let mut entry = NewEntry::debit(
            date(2024, 1, 1),
            EntryType::Adjustment,
            Uuid::new_v4(),
            "ADJ",
            pkr(dec!(10)),
            "bad",
        );
        entry.credit = pkr(dec!(10));

        assert!(matches!(
            journal.append(entry),
            Err(BillingError::Validation(_))
        ));
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn test_remove_entries_recalculates() {
        let mut journal = journal();
        let invoice_ref = Uuid::new_v4();

        journal
            .append(NewEntry::debit(
                date(2024, 1, 1),
                EntryType::Invoice,
                invoice_ref,
                "INV-1",
                pkr(dec!(1000)),
                "Invoice INV-1",
            ))
            .unwrap();
        journal
            .append(NewEntry::credit(
                date(2024, 1, 10),
                EntryType::Payment,
                Uuid::new_v4(),
                "PAY-2024-0001",
                pkr(dec!(200)),
                "Payment",
            ))
            .unwrap();

        let removed = journal.remove_entries(invoice_ref, EntryType::Invoice);

        assert_eq!(removed, 1);
        assert_eq!(journal.last_balance(), pkr(dec!(-200)));
        assert_eq!(journal.entries().len(), 1);
    }

    #[test]
    fn test_recalculate_is_idempotent() {
        let mut journal = journal();
        for (day, amount) in [(1, dec!(100)), (3, dec!(250)), (7, dec!(75))] {
            journal
                .append(NewEntry::debit(
                    date(2024, 1, day),
                    EntryType::Invoice,
                    Uuid::new_v4(),
                    format!("INV-{}", day),
                    pkr(amount),
                    "Invoice",
                ))
                .unwrap();
        }

        let first = journal.recalculate();
        let second = journal.recalculate();

        assert_eq!(first, second);
        assert_eq!(first, pkr(dec!(425)));
    }

    #[test]
    fn test_statement_excludes_hidden_lines_but_not_totals() {
        let mut journal = journal();

        journal
            .append(NewEntry::debit(
                date(2024, 1, 5),
                EntryType::Invoice,
                Uuid::new_v4(),
                "INV-1",
                pkr(dec!(1000)),
                "Invoice INV-1",
            ))
            .unwrap();
        journal
            .append(
                NewEntry::credit(
                    date(2024, 1, 10),
                    EntryType::Adjustment,
                    Uuid::new_v4(),
                    "ADJ-1",
                    pkr(dec!(100)),
                    "Internal correction",
                )
                .hidden(),
            )
            .unwrap();

        let statement = journal.statement(date(2024, 1, 1), date(2024, 1, 31));

        assert_eq!(statement.lines.len(), 1);
        assert_eq!(statement.total_debits, pkr(dec!(1000)));
        assert_eq!(statement.total_credits, pkr(dec!(100)));
        assert_eq!(statement.closing_balance, pkr(dec!(900)));
        assert_eq!(
            statement.closing_balance,
            statement.opening_balance + statement.total_debits - statement.total_credits
        );
    }

    #[test]
    fn test_statement_opening_balance_covers_prior_entries() {
        let mut journal = journal();

        journal
            .append(NewEntry::debit(
                date(2023, 12, 15),
                EntryType::Invoice,
                Uuid::new_v4(),
                "INV-0",
                pkr(dec!(600)),
                "December invoice",
            ))
            .unwrap();
        journal
            .append(NewEntry::credit(
                date(2024, 1, 8),
                EntryType::Payment,
                Uuid::new_v4(),
                "PAY-2024-0001",
                pkr(dec!(600)),
                "January payment",
            ))
            .unwrap();

        let statement = journal.statement(date(2024, 1, 1), date(2024, 1, 31));

        assert_eq!(statement.opening_balance, pkr(dec!(600)));
        assert_eq!(statement.closing_balance, pkr(dec!(0)));
        assert_eq!(statement.lines.len(), 1);
    }
}
