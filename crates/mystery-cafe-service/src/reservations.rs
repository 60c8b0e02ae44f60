//! Reservation workflow.
//!
//! Each operation is a short sequence of store calls. There is no
//! transaction around them: if a later step fails, earlier writes stay and
//! the error is returned to the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use mystery_cafe_core::{
    customer_number, day_slots, options_total, CafeError, CreateReservationRequest, Customer,
    CustomerInput, Page, PageRequest, Reservation, ReservationChange, ReservationFilters,
    ReservationHistory, ReservationId, ReservationOption, ReservationPatch, ReservationStats,
    ReservationStatus, Result, ScenarioId, StoreId, TimeSlot,
};
use mystery_cafe_store::Store;

use crate::sync::SyncBridge;

/// A reservation with its option lines and customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDetail {
    /// The reservation row.
    #[serde(flatten)]
    pub reservation: Reservation,
    /// Option lines.
    pub options: Vec<ReservationOption>,
    /// Booking customer, if it still resolves.
    pub customer: Option<Customer>,
}

/// Reservation workflow service.
#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn Store>,
    bridge: Arc<SyncBridge>,
    offset: FixedOffset,
}

impl std::fmt::Debug for ReservationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationService")
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

fn violation(msg: &str) -> CafeError {
    CafeError::ConstraintViolation(msg.to_string())
}

fn snapshot(reservation: &Reservation) -> serde_json::Value {
    serde_json::to_value(reservation).unwrap_or_default()
}

impl ReservationService {
    /// Create the service. `offset` is the cafe's local time zone.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, bridge: Arc<SyncBridge>, offset: FixedOffset) -> Self {
        Self {
            store,
            bridge,
            offset,
        }
    }

    /// Bounds of the business-local day containing `at`, in UTC.
    fn local_day(&self, at: DateTime<Utc>) -> (NaiveDate, DateTime<Utc>, DateTime<Utc>) {
        let date = at.with_timezone(&self.offset).date_naive();
        let start = self
            .offset
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .single()
            .map_or(at, |local| local.with_timezone(&Utc));
        (date, start, start + Duration::days(1))
    }

    /// Create a customer numbered after today's existing customers.
    ///
    /// Count-then-insert: two concurrent creations on the same day can
    /// produce the same number, and the unique index rejects the second.
    async fn create_customer(&self, input: CustomerInput) -> Result<Customer> {
        let (date, start, end) = self.local_day(Utc::now());
        let existing = self
            .store
            .count_customers_created_between(start, end)
            .await?;
        let customer = Customer::new(input, customer_number(date, existing));
        self.store.insert_customer(&customer).await?;
        tracing::info!(
            customer_id = %customer.id,
            customer_number = %customer.customer_number,
            "Customer created"
        );
        Ok(customer)
    }

    /// Resolve the request's customer, creating one if nothing matches.
    async fn resolve_customer(&self, request: &CreateReservationRequest) -> Result<Customer> {
        if let Some(id) = request.customer_id {
            return self
                .store
                .get_customer(&id)
                .await?
                .ok_or_else(|| CafeError::not_found("customer", id));
        }

        let input = request
            .customer
            .clone()
            .ok_or_else(|| violation("either customer_id or customer is required"))?;

        let existing = self
            .store
            .find_customer_by_contact(input.email.as_deref(), input.phone.as_deref())
            .await?;

        match existing {
            Some(mut customer) => {
                let mut changed = false;
                if customer.email.is_none() && input.email.is_some() {
                    customer.email.clone_from(&input.email);
                    changed = true;
                }
                if customer.phone.is_none() && input.phone.is_some() {
                    customer.phone.clone_from(&input.phone);
                    changed = true;
                }
                if changed {
                    customer.updated_at = Utc::now();
                    self.store.update_customer(&customer).await?;
                }
                tracing::debug!(customer_id = %customer.id, "Matched existing customer");
                Ok(customer)
            }
            None => self.create_customer(input).await,
        }
    }

    /// Create a pending reservation.
    ///
    /// Resolves or creates the customer, inserts the reservation, its option
    /// lines and the `null -> pending` history row, then notifies.
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` for invalid requests or blocked customers,
    /// `NotFound` for an unknown `customer_id`, or the backend error of the
    /// failing step.
    pub async fn create_reservation(
        &self,
        request: CreateReservationRequest,
    ) -> Result<ReservationDetail> {
        request.validate()?;

        let customer = self.resolve_customer(&request).await?;
        if !customer.can_reserve() {
            return Err(violation("customer is blocked from reserving"));
        }

        let options_price = options_total(&request.options)
            .ok_or_else(|| violation("price total out of range"))?;
        let reservation = Reservation::from_request(&request, &customer, options_price);
        self.store.insert_reservation(&reservation).await?;

        let options: Vec<_> = request
            .options
            .iter()
            .map(|o| ReservationOption::new(reservation.id, o))
            .collect();
        if let Err(e) = self.store.insert_options(&options).await {
            tracing::error!(
                reservation_id = %reservation.id,
                error = %e,
                "Option insert failed after reservation insert"
            );
            return Err(e.into());
        }

        let created = ReservationHistory::created(reservation.id, request.created_by.clone());
        self.store.insert_history(&[created]).await?;

        tracing::info!(
            reservation_id = %reservation.id,
            reservation_number = %reservation.reservation_number,
            customer_id = %customer.id,
            final_price = reservation.final_price,
            "Reservation created"
        );

        self.bridge.notify_reservation_change(
            ReservationChange::Created,
            reservation.id,
            snapshot(&reservation),
        );

        Ok(ReservationDetail {
            reservation,
            options,
            customer: Some(customer),
        })
    }

    async fn load(&self, id: ReservationId) -> Result<Reservation> {
        self.store
            .get_reservation(&id)
            .await?
            .ok_or_else(|| CafeError::not_found("reservation", id))
    }

    /// Apply a partial update.
    ///
    /// One history row is appended per field whose value changes; fields
    /// equal to the stored value are ignored. A patch that changes nothing
    /// writes nothing and returns the stored row.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id; `ConstraintViolation` when the patched
    /// row is invalid, reopens a cancelled reservation, or cancels without a
    /// reason.
    pub async fn update_reservation(
        &self,
        id: ReservationId,
        patch: ReservationPatch,
        actor: &str,
    ) -> Result<Reservation> {
        let current = self.load(id).await?;
        self.apply_patch(current, patch, actor).await
    }

    async fn apply_patch(
        &self,
        current: Reservation,
        patch: ReservationPatch,
        actor: &str,
    ) -> Result<Reservation> {
        let id = current.id;
        let changes = patch.diff(&current);
        if changes.is_empty() {
            tracing::debug!(reservation_id = %id, "Update changes nothing");
            return Ok(current);
        }

        let mut updated = current.clone();
        patch.apply(&mut updated);
        validate_patched(&current, &updated)?;

        let now = Utc::now();
        let cancelled = current.status != ReservationStatus::Cancelled
            && updated.status == ReservationStatus::Cancelled;
        let completed = current.status != ReservationStatus::Completed
            && updated.status == ReservationStatus::Completed;
        if cancelled {
            updated.cancelled_at = Some(now);
        }

        let rows: Vec<_> = changes
            .iter()
            .map(|change| {
                let reason = if cancelled && change.field == "status" {
                    updated.cancellation_reason.clone()
                } else {
                    None
                };
                ReservationHistory::field_change(id, change, actor, reason)
            })
            .collect();

        self.store.update_reservation(&updated).await?;
        self.store.insert_history(&rows).await?;

        if completed {
            self.record_visit(&updated).await?;
        }

        tracing::info!(
            reservation_id = %id,
            actor = %actor,
            fields = changes.len(),
            status = %updated.status,
            "Reservation updated"
        );

        let change = if cancelled {
            ReservationChange::Cancelled
        } else {
            ReservationChange::Updated
        };
        self.bridge
            .notify_reservation_change(change, id, snapshot(&updated));

        Ok(updated)
    }

    async fn record_visit(&self, reservation: &Reservation) -> Result<()> {
        let Some(mut customer) = self.store.get_customer(&reservation.customer_id).await? else {
            tracing::warn!(
                reservation_id = %reservation.id,
                customer_id = %reservation.customer_id,
                "Completed reservation has no customer"
            );
            return Ok(());
        };
        let visited_at = reservation
            .actual_datetime
            .unwrap_or(reservation.requested_datetime);
        customer.record_visit(reservation.final_price, visited_at);
        self.store.update_customer(&customer).await?;
        Ok(())
    }

    /// Cancel a reservation with a reason.
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` for a blank reason or an already cancelled
    /// reservation; otherwise as [`ReservationService::update_reservation`].
    pub async fn cancel_reservation(
        &self,
        id: ReservationId,
        reason: &str,
        actor: &str,
    ) -> Result<Reservation> {
        if reason.trim().is_empty() {
            return Err(violation("cancellation_reason must not be empty"));
        }
        let patch = ReservationPatch {
            status: Some(ReservationStatus::Cancelled),
            cancellation_reason: Some(reason.to_string()),
            ..ReservationPatch::default()
        };
        let current = self.load(id).await?;
        if current.status == ReservationStatus::Cancelled {
            return Err(violation("reservation is already cancelled"));
        }
        self.apply_patch(current, patch, actor).await
    }

    /// A reservation with its options and customer.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn get_reservation(&self, id: ReservationId) -> Result<ReservationDetail> {
        let reservation = self.load(id).await?;
        let options = self.store.list_options(&id).await?;
        let customer = self.store.get_customer(&reservation.customer_id).await?;
        Ok(ReservationDetail {
            reservation,
            options,
            customer,
        })
    }

    /// Audit trail of a reservation, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn get_reservation_history(
        &self,
        id: ReservationId,
    ) -> Result<Vec<ReservationHistory>> {
        self.load(id).await?;
        Ok(self.store.list_history(&id).await?)
    }

    /// One page of matching reservations, newest requested time first.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn get_reservations(
        &self,
        filters: &ReservationFilters,
        page: PageRequest,
    ) -> Result<Page<Reservation>> {
        let (items, total) = self
            .store
            .query_reservations(filters, page.offset(), page.limit)
            .await?;
        Ok(Page::new(items, total, page))
    }

    /// The 13 hourly slots of `date` at a store, each marked unavailable if
    /// a non-cancelled reservation overlaps it. One overlap query per slot,
    /// in order.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn get_available_time_slots(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
        scenario_id: Option<&ScenarioId>,
    ) -> Result<Vec<TimeSlot>> {
        let mut slots = day_slots(date, self.offset, scenario_id);
        for slot in &mut slots {
            slot.available = !self
                .store
                .has_overlapping_reservation(store_id, slot.start, slot.end)
                .await?;
        }
        Ok(slots)
    }

    /// Counts and revenue over matching reservations.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn get_reservation_stats(
        &self,
        store_id: Option<StoreId>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<ReservationStats> {
        let filters = ReservationFilters::for_range(store_id, date_from, date_to);
        let rows = self.store.list_reservations(&filters).await?;
        Ok(ReservationStats::compute(&rows, self.offset))
    }
}

fn validate_patched(current: &Reservation, updated: &Reservation) -> Result<()> {
    if current.status == ReservationStatus::Cancelled
        && updated.status != ReservationStatus::Cancelled
    {
        return Err(violation("cancelled reservations cannot be reopened"));
    }
    if updated.status == ReservationStatus::Cancelled
        && updated
            .cancellation_reason
            .as_deref()
            .map_or(true, |r| r.trim().is_empty())
    {
        return Err(violation("cancelling requires a cancellation_reason"));
    }
    if updated.title.trim().is_empty() {
        return Err(violation("title must not be empty"));
    }
    if updated.participant_count < 1 {
        return Err(violation("participant_count must be at least 1"));
    }
    if updated.duration_minutes < 1 {
        return Err(violation("duration_minutes must be at least 1"));
    }
    if updated.discount_amount < 0 {
        return Err(violation("discount_amount must not be negative"));
    }
    if updated.final_price < 0 {
        return Err(violation("discount_amount exceeds the total price"));
    }
    Ok(())
}
