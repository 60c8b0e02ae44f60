//! Records owned by the admin screens.
//!
//! These are the shapes the one-time migrator copies out of the local cache.
//! Cached records were written by the front end, so camelCase keys are
//! accepted and every optional column has a default.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{ScenarioId, StaffId, StoreId, Table};

/// A record type that lives in a single backend table keyed by `id`.
pub trait CatalogRecord: Serialize + DeserializeOwned + Send + Sync {
    /// Backend table.
    const TABLE: Table;

    /// Row key.
    fn id(&self) -> &str;
}

const fn yes() -> bool {
    true
}

/// A cafe location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLocation {
    /// Store id.
    pub id: StoreId,
    /// Display name.
    pub name: String,
    /// Street address.
    #[serde(default)]
    pub address: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Whether the store takes reservations.
    #[serde(default = "yes", alias = "isActive")]
    pub is_active: bool,
}

impl CatalogRecord for StoreLocation {
    const TABLE: Table = Table::Stores;

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// A playable murder-mystery scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario id.
    pub id: ScenarioId,
    /// Title.
    pub title: String,
    /// Synopsis.
    #[serde(default)]
    pub description: Option<String>,
    /// Typical session length.
    #[serde(default = "default_scenario_minutes", alias = "durationMinutes", alias = "duration")]
    pub duration_minutes: i32,
    /// Minimum players.
    #[serde(default = "default_min_players", alias = "minPlayers")]
    pub min_players: i32,
    /// Maximum players.
    #[serde(default = "default_max_players", alias = "maxPlayers")]
    pub max_players: i32,
    /// Standard price.
    #[serde(default, alias = "basePrice", alias = "price")]
    pub base_price: i64,
    /// Whether it can be booked.
    #[serde(default = "yes", alias = "isActive")]
    pub is_active: bool,
}

const fn default_scenario_minutes() -> i32 {
    180
}

const fn default_min_players() -> i32 {
    1
}

const fn default_max_players() -> i32 {
    8
}

impl CatalogRecord for Scenario {
    const TABLE: Table = Table::Scenarios;

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// A staff member (game master, floor staff, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    /// Staff id.
    pub id: StaffId,
    /// Display name.
    pub name: String,
    /// Role label.
    #[serde(default = "default_role")]
    pub role: String,
    /// Email.
    #[serde(default)]
    pub email: Option<String>,
    /// Phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Stores the member works at.
    #[serde(default, alias = "storeIds", alias = "stores")]
    pub store_ids: Vec<StoreId>,
    /// Whether the member is active.
    #[serde(default = "yes", alias = "isActive")]
    pub is_active: bool,
}

fn default_role() -> String {
    "staff".to_string()
}

impl CatalogRecord for StaffMember {
    const TABLE: Table = Table::Staff;

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// A stocked item (props, drinks, consumables).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Item id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Category label.
    #[serde(default)]
    pub category: Option<String>,
    /// Units on hand.
    #[serde(default, alias = "stock")]
    pub quantity: i32,
    /// Unit price.
    #[serde(default, alias = "unitPrice", alias = "price")]
    pub unit_price: i64,
    /// Reorder threshold.
    #[serde(default, alias = "reorderLevel")]
    pub reorder_level: i32,
}

impl CatalogRecord for InventoryItem {
    const TABLE: Table = Table::InventoryItems;

    fn id(&self) -> &str {
        &self.id
    }
}
