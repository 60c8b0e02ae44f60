//! Reservation handlers.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use mystery_cafe_core::{
    CreateReservationRequest, Page, PageRequest, Reservation, ReservationFilters,
    ReservationHistory, ReservationId, ReservationPatch, ReservationStats, ScenarioId, StaffId,
    StoreId, TimeSlot, DEFAULT_PAGE_LIMIT,
};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::reservations::ReservationDetail;
use crate::state::AppState;

fn parse<T>(field: &str, value: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid {field}: {e}")))
}

fn parse_opt<T>(field: &str, value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse(field, v))
        .transpose()
}

/// Comma separated list, e.g. `status=pending,confirmed`.
fn parse_list<T>(field: &str, value: Option<&str>) -> Result<Vec<T>, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| parse(field, v))
        .collect()
}

fn parse_id(id: &str) -> Result<ReservationId, ApiError> {
    parse("reservation id", id)
}

/// Create a reservation.
///
/// `created_by` defaults to the acting admin.
pub async fn create_reservation(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(mut request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationDetail>), ApiError> {
    if request.created_by.is_none() {
        request.created_by = Some(auth.actor);
    }
    let detail = state.reservations.create_reservation(request).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Reservation list query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListReservationsQuery {
    /// Page number (default: 1).
    pub page: Option<u32>,
    /// Rows per page (default: 20).
    pub limit: Option<u32>,
    /// Store filter.
    pub store_id: Option<String>,
    /// Scenario filter.
    pub scenario_id: Option<String>,
    /// Comma separated lifecycle statuses.
    pub status: Option<String>,
    /// Comma separated payment statuses.
    pub payment_status: Option<String>,
    /// Requested at or after (RFC 3339).
    pub date_from: Option<String>,
    /// Requested at or before (RFC 3339).
    pub date_to: Option<String>,
    /// Partial reservation number, case-insensitive.
    pub reservation_number: Option<String>,
    /// Staff member assigned.
    pub assigned_staff: Option<String>,
}

impl ListReservationsQuery {
    fn filters(&self) -> Result<ReservationFilters, ApiError> {
        Ok(ReservationFilters {
            store_id: parse_opt::<StoreId>("store_id", self.store_id.as_deref())?,
            scenario_id: parse_opt::<ScenarioId>("scenario_id", self.scenario_id.as_deref())?,
            statuses: parse_list("status", self.status.as_deref())?,
            payment_statuses: parse_list("payment_status", self.payment_status.as_deref())?,
            date_from: parse_opt::<DateTime<Utc>>("date_from", self.date_from.as_deref())?,
            date_to: parse_opt::<DateTime<Utc>>("date_to", self.date_to.as_deref())?,
            reservation_number: self
                .reservation_number
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string),
            assigned_staff: parse_opt::<StaffId>("assigned_staff", self.assigned_staff.as_deref())?,
        })
    }

    fn page(&self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
    }
}

/// List reservations, newest requested time first.
pub async fn list_reservations(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Query(query): Query<ListReservationsQuery>,
) -> Result<Json<Page<Reservation>>, ApiError> {
    let filters = query.filters()?;
    let page = state
        .reservations
        .get_reservations(&filters, query.page())
        .await?;
    Ok(Json(page))
}

/// Statistics query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// Store filter.
    pub store_id: Option<String>,
    /// Requested at or after (RFC 3339).
    pub date_from: Option<String>,
    /// Requested at or before (RFC 3339).
    pub date_to: Option<String>,
}

/// Reservation statistics.
pub async fn reservation_stats(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ReservationStats>, ApiError> {
    let stats = state
        .reservations
        .get_reservation_stats(
            parse_opt("store_id", query.store_id.as_deref())?,
            parse_opt("date_from", query.date_from.as_deref())?,
            parse_opt("date_to", query.date_to.as_deref())?,
        )
        .await?;
    Ok(Json(stats))
}

/// Get a reservation with its options and customer.
pub async fn get_reservation(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<ReservationDetail>, ApiError> {
    let detail = state.reservations.get_reservation(parse_id(&id)?).await?;
    Ok(Json(detail))
}

/// Apply a partial update.
pub async fn update_reservation(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
    Json(patch): Json<ReservationPatch>,
) -> Result<Json<Reservation>, ApiError> {
    let updated = state
        .reservations
        .update_reservation(parse_id(&id)?, patch, &auth.actor)
        .await?;
    Ok(Json(updated))
}

/// Cancel request body.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Why the reservation is cancelled.
    pub reason: String,
}

/// Cancel a reservation.
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
    Json(body): Json<CancelRequest>,
) -> Result<Json<Reservation>, ApiError> {
    let cancelled = state
        .reservations
        .cancel_reservation(parse_id(&id)?, &body.reason, &auth.actor)
        .await?;
    Ok(Json(cancelled))
}

/// Audit trail of a reservation, oldest first.
pub async fn reservation_history(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<Vec<ReservationHistory>>, ApiError> {
    let history = state
        .reservations
        .get_reservation_history(parse_id(&id)?)
        .await?;
    Ok(Json(history))
}

/// Slot query parameters.
#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    /// Business-local date, `YYYY-MM-DD`.
    pub date: String,
    /// Scenario to label the slots with.
    pub scenario_id: Option<String>,
}

/// Hourly availability of a store on one day.
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(store_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<TimeSlot>>, ApiError> {
    let store_id: StoreId = parse("store_id", &store_id)?;
    let date = NaiveDate::parse_from_str(query.date.trim(), "%Y-%m-%d")
        .map_err(|e| ApiError::BadRequest(format!("invalid date: {e}")))?;
    let scenario_id: Option<ScenarioId> = parse_opt("scenario_id", query.scenario_id.as_deref())?;

    let slots = state
        .reservations
        .get_available_time_slots(&store_id, date, scenario_id.as_ref())
        .await?;
    Ok(Json(slots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mystery_cafe_core::{PaymentStatus, ReservationStatus};

    #[test]
    fn status_lists_are_split_and_trimmed() {
        let statuses: Vec<ReservationStatus> =
            parse_list("status", Some("pending, confirmed,,")).unwrap();
        assert_eq!(
            statuses,
            vec![ReservationStatus::Pending, ReservationStatus::Confirmed]
        );
    }

    #[test]
    fn unknown_status_is_a_bad_request() {
        let err = parse_list::<PaymentStatus>("payment_status", Some("paid,lost")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("payment_status")));
    }

    #[test]
    fn blank_filters_are_ignored() {
        let query = ListReservationsQuery {
            store_id: Some("  ".into()),
            reservation_number: Some(String::new()),
            ..ListReservationsQuery::default()
        };
        let filters = query.filters().unwrap();
        assert!(filters.store_id.is_none());
        assert!(filters.reservation_number.is_none());
    }

    #[test]
    fn page_defaults() {
        let page = ListReservationsQuery::default().page();
        assert_eq!(page, PageRequest::new(1, DEFAULT_PAGE_LIMIT));
    }
}
