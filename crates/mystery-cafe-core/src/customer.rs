//! Customer records.
//!
//! A customer is created the first time a reservation names them (or when an
//! admin enters them by hand) and is never hard-deleted. Visit and spend
//! aggregates are maintained as their reservations complete.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::CustomerId;

/// Prefix for generated customer numbers.
pub const CUSTOMER_NUMBER_PREFIX: char = 'C';

/// A cafe customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Row identifier.
    pub id: CustomerId,

    /// Human-facing number, see [`customer_number`].
    pub customer_number: String,

    /// Display name.
    pub name: String,

    /// Contact email.
    pub email: Option<String>,

    /// Contact phone.
    pub phone: Option<String>,

    /// Free-form admin notes.
    pub notes: Option<String>,

    /// Account status.
    pub status: CustomerStatus,

    /// Completed visits.
    pub total_visits: i32,

    /// Lifetime spend in the smallest currency unit.
    pub total_spent: i64,

    /// When the customer last completed a visit.
    pub last_visit_at: Option<DateTime<Utc>>,

    /// When the customer was created.
    pub created_at: DateTime<Utc>,

    /// When the customer was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Create a new active customer with zeroed aggregates.
    #[must_use]
    pub fn new(input: CustomerInput, customer_number: String) -> Self {
        let now = Utc::now();
        Self {
            id: CustomerId::generate(),
            customer_number,
            name: input.name,
            email: input.email,
            phone: input.phone,
            notes: input.notes,
            status: CustomerStatus::Active,
            total_visits: 0,
            total_spent: 0,
            last_visit_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a completed visit worth `amount`. Totals saturate.
    pub fn record_visit(&mut self, amount: i64, at: DateTime<Utc>) {
        self.total_visits = self.total_visits.saturating_add(1);
        self.total_spent = self.total_spent.saturating_add(amount);
        self.last_visit_at = Some(at);
        self.updated_at = Utc::now();
    }

    /// Whether new reservations may be taken for this customer.
    #[must_use]
    pub fn can_reserve(&self) -> bool {
        self.status != CustomerStatus::Blocked
    }
}

/// Customer account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    /// Normal customer.
    Active,
    /// Dormant, still allowed to book.
    Inactive,
    /// Not allowed to book.
    Blocked,
}

text_enum!(CustomerStatus {
    Active => "active",
    Inactive => "inactive",
    Blocked => "blocked",
});

/// Customer details supplied with a reservation or by an admin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInput {
    /// Display name.
    pub name: String,

    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,

    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,

    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl CustomerInput {
    /// Input with just a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Format the customer number for the `existing_today + 1`-th customer of `date`.
///
/// The sequence comes from counting the customers already created that day,
/// so two requests racing on the same day can produce the same number.
#[must_use]
pub fn customer_number(date: NaiveDate, existing_today: u64) -> String {
    format!(
        "{CUSTOMER_NUMBER_PREFIX}{}{:04}",
        date.format("%Y%m%d"),
        existing_today + 1
    )
}
