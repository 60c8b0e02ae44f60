//! Core types for the mystery cafe admin backend.
//!
//! This crate provides the domain model shared by the store and the service:
//!
//! - **Identifiers**: `CustomerId`, `ReservationId`, `StoreId`, `HistoryId`, ...
//! - **Customers**: `Customer`, `CustomerInput`, customer numbering
//! - **Reservations**: `Reservation`, `ReservationOption`, `CreateReservationRequest`
//! - **History**: `ReservationHistory`, `ReservationPatch`, change classification
//! - **Queries**: `ReservationFilters`, `Page`
//! - **Scheduling**: hourly `TimeSlot`s
//! - **Statistics**: `ReservationStats`
//! - **Sync**: `SyncEvent`, `Table`, `SubscriptionState`
//! - **Catalog**: stores, scenarios, staff, inventory records
//!
//! # Money
//!
//! Every amount is an `i64` in the smallest currency unit (yen). There is no
//! floating point anywhere money is stored.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
mod macros;

pub mod catalog;
pub mod customer;
pub mod error;
pub mod history;
pub mod ids;
pub mod query;
pub mod reservation;
pub mod schedule;
pub mod stats;
pub mod sync;

pub use catalog::{CatalogRecord, InventoryItem, Scenario, StaffMember, StoreLocation};
pub use customer::{customer_number, Customer, CustomerInput, CustomerStatus};
pub use error::{CafeError, ErrorKind, Result};
pub use history::{ChangeType, FieldChange, ReservationHistory, ReservationPatch};
pub use ids::{CustomerId, HistoryId, IdError, OptionId, ReservationId, ScenarioId, StaffId, StoreId};
pub use query::{Page, PageRequest, ReservationFilters, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use reservation::{
    final_price, options_total, reservation_number, CreateReservationRequest, OptionInput,
    PaymentStatus, Reservation, ReservationOption, ReservationSource, ReservationStatus,
    DEFAULT_DURATION_MINUTES,
};
pub use schedule::{day_slots, TimeSlot, FIRST_SLOT_HOUR, LAST_SLOT_HOUR, SLOTS_PER_DAY};
pub use stats::{HourCount, ReservationStats, ScenarioCount};
pub use sync::{ChangeKind, ReservationChange, SubscriptionState, SyncEvent, SyncSource, Table};
