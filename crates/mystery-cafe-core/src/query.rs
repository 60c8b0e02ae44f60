//! Reservation listing filters and pagination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PaymentStatus, Reservation, ReservationStatus, ScenarioId, StaffId, StoreId};

/// Default page size for listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Largest page size the listing accepts.
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Predicates for listing reservations. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationFilters {
    /// Only this store.
    pub store_id: Option<StoreId>,
    /// Only this scenario.
    pub scenario_id: Option<ScenarioId>,
    /// Any of these statuses.
    pub statuses: Vec<ReservationStatus>,
    /// Any of these payment statuses.
    pub payment_statuses: Vec<PaymentStatus>,
    /// Requested at or after.
    pub date_from: Option<DateTime<Utc>>,
    /// Requested at or before.
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the reservation number.
    pub reservation_number: Option<String>,
    /// Assigned to this staff member.
    pub assigned_staff: Option<StaffId>,
}

impl ReservationFilters {
    /// Filter for a store and requested-time range, as used by statistics.
    #[must_use]
    pub fn for_range(
        store_id: Option<StoreId>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            store_id,
            date_from,
            date_to,
            ..Self::default()
        }
    }

    /// Evaluate the filter against a reservation in memory.
    #[must_use]
    pub fn matches(&self, r: &Reservation) -> bool {
        if self.store_id.as_ref().is_some_and(|s| *s != r.store_id) {
            return false;
        }
        if self
            .scenario_id
            .as_ref()
            .is_some_and(|s| r.scenario_id.as_ref() != Some(s))
        {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&r.status) {
            return false;
        }
        if !self.payment_statuses.is_empty() && !self.payment_statuses.contains(&r.payment_status)
        {
            return false;
        }
        if self.date_from.is_some_and(|from| r.requested_datetime < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| r.requested_datetime > to) {
            return false;
        }
        if let Some(needle) = &self.reservation_number {
            if !r
                .reservation_number
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(staff) = &self.assigned_staff {
            if !r.assigned_staff.contains(staff) {
                return false;
            }
        }
        true
    }
}

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: u32,
    /// Rows per page.
    pub limit: u32,
}

impl PageRequest {
    /// Normalize a page request: page at least 1, limit capped.
    #[must_use]
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.min(MAX_PAGE_LIMIT),
        }
    }

    /// Rows to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_LIMIT)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// Rows across all pages.
    pub total: u64,
    /// Page number, starting at 1.
    pub page: u32,
    /// Rows per page.
    pub limit: u32,
    /// Number of pages (0 when `limit` is 0).
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Assemble a page, computing `total_pages`.
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let total_pages = if request.limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(request.limit))
        };
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
            total_pages,
        }
    }
}
