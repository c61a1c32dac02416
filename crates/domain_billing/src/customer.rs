//! Customer account state
//!
//! The core reads the customer directory only for balance fields; identity
//! and contact data live in the excluded application layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, CustomerId, Money};

/// Balance-bearing view of a customer
///
/// `current_balance` is a cache over the journal: positive means the
/// customer owes money, negative means the customer is in credit. The
/// opening balance is what the customer owed as of `as_of_date`, tracked
/// outside the invoice system; `opening_balance_remaining` is the portion
/// payments have not yet relieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAccount {
    /// Unique identifier
    pub id: CustomerId,
    /// Display name
    pub name: String,
    /// Ledger currency
    pub currency: Currency,
    /// Amount owed as of `as_of_date`
    pub opening_balance: Money,
    /// Portion of the opening balance not yet paid off
    pub opening_balance_remaining: Money,
    /// Date the opening balance was established
    pub as_of_date: NaiveDate,
    /// Cached running balance (signed)
    pub current_balance: Money,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl CustomerAccount {
    /// Creates a new customer account
    ///
    /// # Arguments
    ///
    /// * `name` - Display name
    /// * `currency` - Ledger currency
    /// * `opening_balance` - Amount owed as of `as_of_date` (zero if none)
    /// * `as_of_date` - Date the opening balance was established
    pub fn new(
        name: impl Into<String>,
        currency: Currency,
        opening_balance: Money,
        as_of_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: CustomerId::new_v7(),
            name: name.into(),
            currency,
            opening_balance,
            opening_balance_remaining: opening_balance,
            as_of_date,
            current_balance: Money::zero(currency),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the customer's outstanding balance, floored at zero
    ///
    /// Discounts are validated against this figure; a customer in credit
    /// has nothing outstanding to discount.
    pub fn outstanding_balance(&self) -> Money {
        self.current_balance.clamp_non_negative()
    }
}
