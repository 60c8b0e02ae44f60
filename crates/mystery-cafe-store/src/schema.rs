//! Table metadata used to build generic statements.
//!
//! Table names are interpolated into SQL, so they only ever come from the
//! [`Table`] enum.

use mystery_cafe_core::Table;

/// Prefix of the `LISTEN/NOTIFY` channel each table's trigger publishes on.
pub const CHANGE_CHANNEL_PREFIX: &str = "cafe_changes_";

/// Notification channel for `table`.
#[must_use]
pub fn change_channel(table: Table) -> String {
    format!("{CHANGE_CHANNEL_PREFIX}{}", table.as_str())
}

/// Columns written by generic `id`-keyed upserts, or `None` when the table is
/// only written through its typed operations.
#[must_use]
pub const fn upsert_columns(table: Table) -> Option<&'static [&'static str]> {
    match table {
        Table::Stores => Some(&["id", "name", "address", "phone", "is_active"]),
        Table::Scenarios => Some(&[
            "id",
            "title",
            "description",
            "duration_minutes",
            "min_players",
            "max_players",
            "base_price",
            "is_active",
        ]),
        Table::Staff => Some(&[
            "id", "name", "role", "email", "phone", "store_ids", "is_active",
        ]),
        Table::InventoryItems => Some(&[
            "id",
            "name",
            "category",
            "quantity",
            "unit_price",
            "reorder_level",
        ]),
        Table::Customers
        | Table::Reservations
        | Table::ReservationOptions
        | Table::ReservationHistory
        | Table::EditHistory
        | Table::StockMovements => None,
    }
}

/// Column that orders a table's rows by recency.
#[must_use]
pub const fn recency_column(table: Table) -> &'static str {
    match table {
        Table::ReservationOptions
        | Table::ReservationHistory
        | Table::EditHistory
        | Table::StockMovements => "created_at",
        _ => "updated_at",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_per_table() {
        assert_eq!(change_channel(Table::Reservations), "cafe_changes_reservations");
    }

    #[test]
    fn only_catalog_tables_take_generic_upserts() {
        assert!(upsert_columns(Table::Staff).is_some());
        assert!(upsert_columns(Table::Reservations).is_none());
        for table in Table::ALL {
            if let Some(columns) = upsert_columns(*table) {
                assert_eq!(columns[0], "id");
            }
        }
    }
}
