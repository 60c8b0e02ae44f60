//! PostgreSQL implementation of [`Store`].
//!
//! Enum columns are stored as their text form and id lists as `TEXT[]`.
//! Change streams rely on the `cafe_notify_change` trigger installed by the
//! migrations, which publishes one JSON payload per row change on the
//! table's channel.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::sync::mpsc;

use mystery_cafe_core::{
    ChangeKind, Customer, CustomerId, HistoryId, OptionId, Reservation, ReservationFilters,
    ReservationHistory, ReservationId, ReservationOption, ScenarioId, StaffId, StoreId, Table,
};

use crate::error::{Result, StoreError};
use crate::feed::{ChangeStream, RowChange};
use crate::schema::{change_channel, recency_column, upsert_columns};
use crate::Store;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const CUSTOMER_COLUMNS: &str = "id, customer_number, name, email, phone, notes, status, \
     total_visits, total_spent, last_visit_at, created_at, updated_at";

const RESERVATION_COLUMNS: &str = "id, reservation_number, title, source, customer_id, \
     customer_name, customer_email, customer_phone, store_id, scenario_id, requested_datetime, \
     actual_datetime, duration_minutes, participant_count, participant_names, assigned_staff, \
     base_price, options_price, discount_amount, final_price, payment_method, payment_status, \
     status, customer_notes, internal_notes, cancellation_reason, cancelled_at, created_by, \
     created_at, updated_at";

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

// =============================================================================
// Row decoding
// =============================================================================

fn decode<T, E: Display>(value: std::result::Result<T, E>) -> Result<T> {
    value.map_err(|e| StoreError::Serialization(e.to_string()))
}

fn text<T: FromStr>(row: &PgRow, column: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    decode(raw.parse())
}

fn staff_ids(raw: Vec<String>) -> Result<Vec<StaffId>> {
    decode(
        raw.into_iter()
            .map(StaffId::new)
            .collect::<std::result::Result<Vec<_>, _>>(),
    )
}

fn customer_from_row(row: &PgRow) -> Result<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get("id")?),
        customer_number: row.try_get("customer_number")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        notes: row.try_get("notes")?,
        status: text(row, "status")?,
        total_visits: row.try_get("total_visits")?,
        total_spent: row.try_get("total_spent")?,
        last_visit_at: row.try_get("last_visit_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation> {
    let scenario_id: Option<String> = row.try_get("scenario_id")?;
    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get("id")?),
        reservation_number: row.try_get("reservation_number")?,
        title: row.try_get("title")?,
        source: text(row, "source")?,
        customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        customer_phone: row.try_get("customer_phone")?,
        store_id: decode(StoreId::new(row.try_get::<String, _>("store_id")?))?,
        scenario_id: decode(scenario_id.map(ScenarioId::new).transpose())?,
        requested_datetime: row.try_get("requested_datetime")?,
        actual_datetime: row.try_get("actual_datetime")?,
        duration_minutes: row.try_get("duration_minutes")?,
        participant_count: row.try_get("participant_count")?,
        participant_names: row.try_get("participant_names")?,
        assigned_staff: staff_ids(row.try_get("assigned_staff")?)?,
        base_price: row.try_get("base_price")?,
        options_price: row.try_get("options_price")?,
        discount_amount: row.try_get("discount_amount")?,
        final_price: row.try_get("final_price")?,
        payment_method: row.try_get("payment_method")?,
        payment_status: text(row, "payment_status")?,
        status: text(row, "status")?,
        customer_notes: row.try_get("customer_notes")?,
        internal_notes: row.try_get("internal_notes")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        cancelled_at: row.try_get("cancelled_at")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn option_from_row(row: &PgRow) -> Result<ReservationOption> {
    Ok(ReservationOption {
        id: OptionId::from_uuid(row.try_get("id")?),
        reservation_id: ReservationId::from_uuid(row.try_get("reservation_id")?),
        option_name: row.try_get("option_name")?,
        price: row.try_get("price")?,
        quantity: row.try_get("quantity")?,
        created_at: row.try_get("created_at")?,
    })
}

fn history_from_row(row: &PgRow) -> Result<ReservationHistory> {
    let old_value: Option<Json<Value>> = row.try_get("old_value")?;
    let new_value: Option<Json<Value>> = row.try_get("new_value")?;
    Ok(ReservationHistory {
        id: text::<HistoryId>(row, "id")?,
        reservation_id: ReservationId::from_uuid(row.try_get("reservation_id")?),
        change_type: text(row, "change_type")?,
        field_name: row.try_get("field_name")?,
        old_value: old_value.map(|v| v.0),
        new_value: new_value.map(|v| v.0),
        changed_by: row.try_get("changed_by")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

// =============================================================================
// Query building
// =============================================================================

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &ReservationFilters) {
    qb.push(" WHERE TRUE");
    if let Some(store_id) = &filters.store_id {
        qb.push(" AND store_id = ").push_bind(store_id.as_str().to_string());
    }
    if let Some(scenario_id) = &filters.scenario_id {
        qb.push(" AND scenario_id = ")
            .push_bind(scenario_id.as_str().to_string());
    }
    if !filters.statuses.is_empty() {
        let statuses: Vec<String> = filters.statuses.iter().map(ToString::to_string).collect();
        qb.push(" AND status = ANY(").push_bind(statuses).push(")");
    }
    if !filters.payment_statuses.is_empty() {
        let statuses: Vec<String> = filters
            .payment_statuses
            .iter()
            .map(ToString::to_string)
            .collect();
        qb.push(" AND payment_status = ANY(").push_bind(statuses).push(")");
    }
    if let Some(from) = filters.date_from {
        qb.push(" AND requested_datetime >= ").push_bind(from);
    }
    if let Some(to) = filters.date_to {
        qb.push(" AND requested_datetime <= ").push_bind(to);
    }
    if let Some(number) = &filters.reservation_number {
        qb.push(" AND reservation_number ILIKE ")
            .push_bind(like_pattern(number));
    }
    if let Some(staff) = &filters.assigned_staff {
        qb.push(" AND ")
            .push_bind(staff.as_str().to_string())
            .push(" = ANY(assigned_staff)");
    }
}

fn select_reservations(filters: &ReservationFilters) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {RESERVATION_COLUMNS} FROM reservations"));
    push_filters(&mut qb, filters);
    qb.push(" ORDER BY requested_datetime DESC, created_at DESC");
    qb
}

fn row_ids(table: Table, rows: &[Value]) -> Result<()> {
    if rows
        .iter()
        .all(|row| row.get("id").and_then(Value::as_str).is_some())
    {
        Ok(())
    } else {
        Err(StoreError::Constraint(format!("{table} row without id")))
    }
}

/// Payload published by the `cafe_notify_change` trigger.
#[derive(Debug, Deserialize)]
struct NotifyPayload {
    op: ChangeKind,
    old: Option<Value>,
    new: Option<Value>,
    at: DateTime<Utc>,
}

fn parse_notification(table: Table, payload: &str) -> Result<RowChange> {
    let payload: NotifyPayload = serde_json::from_str(payload)?;
    Ok(RowChange {
        table,
        kind: payload.op,
        old: payload.old,
        new: payload.new,
        committed_at: payload.at,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn find_customer_by_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Customer>> {
        if email.is_none() && phone.is_none() {
            return Ok(None);
        }
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE ($1::text IS NOT NULL AND email = $1) \
                OR ($2::text IS NOT NULL AND phone = $2) \
             ORDER BY created_at LIMIT 1"
        ))
        .bind(email)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn count_customers_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM customers WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.unsigned_abs())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO customers ({CUSTOMER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(customer.id.as_uuid())
        .bind(&customer.customer_number)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.notes)
        .bind(customer.status.as_str())
        .bind(customer.total_visits)
        .bind(customer.total_spent)
        .bind(customer.last_visit_at)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<()> {
        let result = sqlx::query(
            "UPDATE customers SET name = $2, email = $3, phone = $4, notes = $5, status = $6, \
             total_visits = $7, total_spent = $8, last_visit_at = $9, updated_at = $10 \
             WHERE id = $1",
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.notes)
        .bind(customer.status.as_str())
        .bind(customer.total_visits)
        .bind(customer.total_spent)
        .bind(customer.last_visit_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("customer", customer.id));
        }
        Ok(())
    }

    async fn insert_reservation(&self, r: &Reservation) -> Result<()> {
        let staff: Vec<String> = r.assigned_staff.iter().map(ToString::to_string).collect();
        sqlx::query(&format!(
            "INSERT INTO reservations ({RESERVATION_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
              $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30)"
        ))
        .bind(r.id.as_uuid())
        .bind(&r.reservation_number)
        .bind(&r.title)
        .bind(r.source.as_str())
        .bind(r.customer_id.as_uuid())
        .bind(&r.customer_name)
        .bind(&r.customer_email)
        .bind(&r.customer_phone)
        .bind(r.store_id.as_str())
        .bind(r.scenario_id.as_ref().map(ScenarioId::as_str))
        .bind(r.requested_datetime)
        .bind(r.actual_datetime)
        .bind(r.duration_minutes)
        .bind(r.participant_count)
        .bind(&r.participant_names)
        .bind(&staff)
        .bind(r.base_price)
        .bind(r.options_price)
        .bind(r.discount_amount)
        .bind(r.final_price)
        .bind(&r.payment_method)
        .bind(r.payment_status.as_str())
        .bind(r.status.as_str())
        .bind(&r.customer_notes)
        .bind(&r.internal_notes)
        .bind(&r.cancellation_reason)
        .bind(r.cancelled_at)
        .bind(&r.created_by)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn update_reservation(&self, r: &Reservation) -> Result<()> {
        let staff: Vec<String> = r.assigned_staff.iter().map(ToString::to_string).collect();
        let result = sqlx::query(
            "UPDATE reservations SET title = $2, scenario_id = $3, requested_datetime = $4, \
             actual_datetime = $5, duration_minutes = $6, participant_count = $7, \
             participant_names = $8, assigned_staff = $9, options_price = $10, \
             discount_amount = $11, final_price = $12, payment_method = $13, \
             payment_status = $14, status = $15, customer_notes = $16, internal_notes = $17, \
             cancellation_reason = $18, cancelled_at = $19, updated_at = $20 \
             WHERE id = $1",
        )
        .bind(r.id.as_uuid())
        .bind(&r.title)
        .bind(r.scenario_id.as_ref().map(ScenarioId::as_str))
        .bind(r.requested_datetime)
        .bind(r.actual_datetime)
        .bind(r.duration_minutes)
        .bind(r.participant_count)
        .bind(&r.participant_names)
        .bind(&staff)
        .bind(r.options_price)
        .bind(r.discount_amount)
        .bind(r.final_price)
        .bind(&r.payment_method)
        .bind(r.payment_status.as_str())
        .bind(r.status.as_str())
        .bind(&r.customer_notes)
        .bind(&r.internal_notes)
        .bind(&r.cancellation_reason)
        .bind(r.cancelled_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("reservation", r.id));
        }
        Ok(())
    }

    async fn query_reservations(
        &self,
        filters: &ReservationFilters,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<Reservation>, u64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM reservations");
        push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = select_reservations(filters);
        select
            .push(" LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(reservation_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total.unsigned_abs()))
    }

    async fn list_reservations(&self, filters: &ReservationFilters) -> Result<Vec<Reservation>> {
        let rows = select_reservations(filters)
            .build()
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(reservation_from_row).collect()
    }

    async fn has_overlapping_reservation(
        &self,
        store_id: &StoreId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reservations \
             WHERE store_id = $1 AND status <> 'cancelled' \
               AND requested_datetime < $3 \
               AND requested_datetime + make_interval(mins => duration_minutes) > $2)",
        )
        .bind(store_id.as_str())
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_options(&self, options: &[ReservationOption]) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO reservation_options \
             (id, reservation_id, option_name, price, quantity, created_at) ",
        );
        qb.push_values(options, |mut b, o| {
            b.push_bind(*o.id.as_uuid())
                .push_bind(*o.reservation_id.as_uuid())
                .push_bind(o.option_name.clone())
                .push_bind(o.price)
                .push_bind(o.quantity)
                .push_bind(o.created_at);
        });
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn list_options(&self, reservation_id: &ReservationId) -> Result<Vec<ReservationOption>> {
        let rows = sqlx::query(
            "SELECT id, reservation_id, option_name, price, quantity, created_at \
             FROM reservation_options WHERE reservation_id = $1 ORDER BY created_at",
        )
        .bind(reservation_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(option_from_row).collect()
    }

    async fn insert_history(&self, rows: &[ReservationHistory]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO reservation_history (id, reservation_id, change_type, field_name, \
             old_value, new_value, changed_by, reason, created_at) ",
        );
        qb.push_values(rows, |mut b, h| {
            b.push_bind(h.id.to_string())
                .push_bind(*h.reservation_id.as_uuid())
                .push_bind(h.change_type.as_str())
                .push_bind(h.field_name.clone())
                .push_bind(h.old_value.clone().map(Json))
                .push_bind(h.new_value.clone().map(Json))
                .push_bind(h.changed_by.clone())
                .push_bind(h.reason.clone())
                .push_bind(h.created_at);
        });
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn list_history(
        &self,
        reservation_id: &ReservationId,
    ) -> Result<Vec<ReservationHistory>> {
        let rows = sqlx::query(
            "SELECT id, reservation_id, change_type, field_name, old_value, new_value, \
             changed_by, reason, created_at \
             FROM reservation_history WHERE reservation_id = $1 ORDER BY id",
        )
        .bind(reservation_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }

    async fn upsert_rows(&self, table: Table, rows: &[Value]) -> Result<u64> {
        let columns = upsert_columns(table).ok_or_else(|| {
            StoreError::Constraint(format!("{table} does not accept generic upserts"))
        })?;
        if rows.is_empty() {
            return Ok(0);
        }
        row_ids(table, rows)?;

        let list = columns.join(", ");
        let updates = columns
            .iter()
            .filter(|c| **c != "id")
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({list}) \
             SELECT {list} FROM jsonb_populate_recordset(NULL::{table}, $1) \
             ON CONFLICT (id) DO UPDATE SET {updates}, updated_at = now()"
        );
        let result = sqlx::query(&sql)
            .bind(Json(rows))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_rows(&self, table: Table) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.unsigned_abs())
    }

    async fn latest_updated_row(&self, table: Table) -> Result<Option<Value>> {
        let row: Option<Json<Value>> = sqlx::query_scalar(&format!(
            "SELECT to_jsonb(t) FROM {table} t ORDER BY {} DESC LIMIT 1",
            recency_column(table)
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|v| v.0))
    }

    async fn subscribe(&self, table: Table) -> Result<ChangeStream> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&change_channel(table)).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(async move {
            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        match parse_notification(table, notification.payload()) {
                            Ok(change) => {
                                if tx.send(change).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(%table, error = %e, "Ignoring malformed change notification");
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::warn!(%table, "Change listener connection lost");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(%table, error = %e, "Change listener failed");
                        break;
                    }
                }
            }
        });
        Ok(ChangeStream::with_pump(table, rx, pump))
    }
}
