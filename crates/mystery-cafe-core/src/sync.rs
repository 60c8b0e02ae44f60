//! Realtime change notification types.
//!
//! A [`SyncEvent`] is the normalized, in-memory description of one row-level
//! change in a backend table. Events are never persisted; listeners consume
//! them as they arrive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// `customers`
    Customers,
    /// `reservations`
    Reservations,
    /// `reservation_options`
    ReservationOptions,
    /// `reservation_history`
    ReservationHistory,
    /// `stores`
    Stores,
    /// `scenarios`
    Scenarios,
    /// `staff`
    Staff,
    /// `edit_history`
    EditHistory,
    /// `inventory_items`
    InventoryItems,
    /// `stock_movements`
    StockMovements,
}

text_enum!(Table {
    Customers => "customers",
    Reservations => "reservations",
    ReservationOptions => "reservation_options",
    ReservationHistory => "reservation_history",
    Stores => "stores",
    Scenarios => "scenarios",
    Staff => "staff",
    EditHistory => "edit_history",
    InventoryItems => "inventory_items",
    StockMovements => "stock_movements",
});

impl Table {
    /// Tables the admin screens follow in realtime.
    pub const REALTIME: &'static [Table] = &[
        Table::Customers,
        Table::Reservations,
        Table::Stores,
        Table::Scenarios,
        Table::Staff,
        Table::InventoryItems,
        Table::StockMovements,
    ];
}

/// Kind of row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
}

text_enum!(ChangeKind {
    Insert => "INSERT",
    Update => "UPDATE",
    Delete => "DELETE",
});

/// Deployment a change or notification originates from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    /// The internal admin tool.
    #[default]
    Admin,
    /// The customer-facing reservation site.
    ReservationSite,
}

text_enum!(SyncSource {
    Admin => "admin",
    ReservationSite => "reservation_site",
});

/// A normalized row-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Table the change happened in.
    pub table: Table,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Row before the change (updates and deletes).
    pub old_record: Option<Value>,
    /// Row after the change (inserts and updates).
    pub new_record: Option<Value>,
    /// When the change was observed.
    pub timestamp: DateTime<Utc>,
    /// Deployment that observed it.
    pub source: SyncSource,
}

impl SyncEvent {
    /// The `id` of the affected row, from whichever payload carries it.
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        self.new_record
            .as_ref()
            .or(self.old_record.as_ref())
            .and_then(|row| row.get("id"))
            .and_then(Value::as_str)
    }
}

/// Per-table subscription state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "error")]
pub enum SubscriptionState {
    /// No channel.
    Unsubscribed,
    /// Channel being opened.
    Subscribing,
    /// Channel open and dispatching.
    Subscribed,
    /// Channel failed; not retried.
    Error(String),
}

/// Reservation change announced to the outbound webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationChange {
    /// Reservation created.
    Created,
    /// Reservation updated.
    Updated,
    /// Reservation cancelled.
    Cancelled,
}

text_enum!(ReservationChange {
    Created => "created",
    Updated => "updated",
    Cancelled => "cancelled",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_roundtrip() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), *table);
        }
        assert!("nope".parse::<Table>().is_err());
    }

    #[test]
    fn change_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ChangeKind::Update).unwrap(), "\"UPDATE\"");
    }

    #[test]
    fn record_id_prefers_new_row() {
        let event = SyncEvent {
            table: Table::Staff,
            kind: ChangeKind::Update,
            old_record: Some(serde_json::json!({"id": "old"})),
            new_record: Some(serde_json::json!({"id": "new"})),
            timestamp: Utc::now(),
            source: SyncSource::Admin,
        };
        assert_eq!(event.record_id(), Some("new"));
    }

    #[test]
    fn subscription_state_json() {
        let json = serde_json::to_value(SubscriptionState::Error("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "error", "error": "boom"}));
    }
}
