//! In-memory storage implementation.
//!
//! Behaves like the PostgreSQL store for everything the service relies on,
//! including the unique customer and reservation numbers and change
//! notifications: every write is pushed to the open subscriptions of its
//! table. Failures can be injected per table.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use mystery_cafe_core::{
    ChangeKind, Customer, CustomerId, Reservation, ReservationFilters, ReservationHistory,
    ReservationId, ReservationOption, StoreId, Table,
};

use crate::error::{Result, StoreError};
use crate::feed::{ChangeStream, RowChange};
use crate::schema::upsert_columns;
use crate::Store;

#[derive(Default)]
struct Tables {
    customers: HashMap<CustomerId, Customer>,
    reservations: HashMap<ReservationId, Reservation>,
    options: Vec<ReservationOption>,
    history: Vec<ReservationHistory>,
    rows: HashMap<Table, BTreeMap<String, Value>>,
}

/// In-memory implementation of [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    subscribers: Mutex<Vec<(Table, mpsc::UnboundedSender<RowChange>)>>,
    failing: Mutex<HashSet<Table>>,
    calls: Mutex<HashMap<Table, usize>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn newest_first(a: &Reservation, b: &Reservation) -> std::cmp::Ordering {
    b.requested_datetime
        .cmp(&a.requested_datetime)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation touching `table` fail until restored.
    pub fn fail_table(&self, table: Table) {
        self.failing.lock().insert(table);
    }

    /// Undo [`MemoryStore::fail_table`].
    pub fn restore_table(&self, table: Table) {
        self.failing.lock().remove(&table);
    }

    /// Number of operations that have touched `table`, failed ones included.
    #[must_use]
    pub fn call_count(&self, table: Table) -> usize {
        self.calls.lock().get(&table).copied().unwrap_or(0)
    }

    /// Close every open subscription on `table`, as if the channel dropped.
    pub fn close_subscriptions(&self, table: Table) {
        self.subscribers.lock().retain(|(t, _)| *t != table);
    }

    /// Number of open subscriptions on `table`.
    #[must_use]
    pub fn subscription_count(&self, table: Table) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers.iter().filter(|(t, _)| *t == table).count()
    }

    fn check(&self, table: Table) -> Result<()> {
        *self.calls.lock().entry(table).or_default() += 1;
        if self.failing.lock().contains(&table) {
            return Err(StoreError::Database(format!(
                "injected failure on {table}"
            )));
        }
        Ok(())
    }

    fn publish(&self, table: Table, kind: ChangeKind, old: Option<Value>, new: Option<Value>) {
        let change = RowChange {
            table,
            kind,
            old,
            new,
            committed_at: Utc::now(),
        };
        self.subscribers.lock().retain(|(t, tx)| {
            if *t == table {
                tx.send(change.clone()).is_ok()
            } else {
                !tx.is_closed()
            }
        });
    }

    fn matching(&self, filters: &ReservationFilters) -> Vec<Reservation> {
        let tables = self.tables.read();
        let mut rows: Vec<_> = tables
            .reservations
            .values()
            .filter(|r| filters.matches(r))
            .cloned()
            .collect();
        rows.sort_by(newest_first);
        rows
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>> {
        self.check(Table::Customers)?;
        Ok(self.tables.read().customers.get(id).cloned())
    }

    async fn find_customer_by_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Customer>> {
        if email.is_none() && phone.is_none() {
            return Ok(None);
        }
        self.check(Table::Customers)?;
        let tables = self.tables.read();
        Ok(tables
            .customers
            .values()
            .filter(|c| {
                email.is_some_and(|e| c.email.as_deref() == Some(e))
                    || phone.is_some_and(|p| c.phone.as_deref() == Some(p))
            })
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn count_customers_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        self.check(Table::Customers)?;
        let tables = self.tables.read();
        Ok(tables
            .customers
            .values()
            .filter(|c| c.created_at >= from && c.created_at < to)
            .count() as u64)
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        self.check(Table::Customers)?;
        {
            let mut tables = self.tables.write();
            if tables.customers.contains_key(&customer.id) {
                return Err(StoreError::Constraint(format!(
                    "duplicate customer id {}",
                    customer.id
                )));
            }
            if tables
                .customers
                .values()
                .any(|c| c.customer_number == customer.customer_number)
            {
                return Err(StoreError::Constraint(format!(
                    "duplicate customer_number {}",
                    customer.customer_number
                )));
            }
            tables.customers.insert(customer.id, customer.clone());
        }
        self.publish(Table::Customers, ChangeKind::Insert, None, Some(to_json(customer)?));
        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<()> {
        self.check(Table::Customers)?;
        let old = {
            let mut tables = self.tables.write();
            let slot = tables
                .customers
                .get_mut(&customer.id)
                .ok_or_else(|| StoreError::not_found("customer", customer.id))?;
            std::mem::replace(slot, customer.clone())
        };
        self.publish(
            Table::Customers,
            ChangeKind::Update,
            Some(to_json(&old)?),
            Some(to_json(customer)?),
        );
        Ok(())
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        self.check(Table::Reservations)?;
        {
            let mut tables = self.tables.write();
            if !tables.customers.contains_key(&reservation.customer_id) {
                return Err(StoreError::Constraint(format!(
                    "customer {} does not exist",
                    reservation.customer_id
                )));
            }
            if tables.reservations.contains_key(&reservation.id) {
                return Err(StoreError::Constraint(format!(
                    "duplicate reservation id {}",
                    reservation.id
                )));
            }
            if tables
                .reservations
                .values()
                .any(|r| r.reservation_number == reservation.reservation_number)
            {
                return Err(StoreError::Constraint(format!(
                    "duplicate reservation_number {}",
                    reservation.reservation_number
                )));
            }
            tables.reservations.insert(reservation.id, reservation.clone());
        }
        self.publish(
            Table::Reservations,
            ChangeKind::Insert,
            None,
            Some(to_json(reservation)?),
        );
        Ok(())
    }

    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        self.check(Table::Reservations)?;
        Ok(self.tables.read().reservations.get(id).cloned())
    }

    async fn update_reservation(&self, reservation: &Reservation) -> Result<()> {
        self.check(Table::Reservations)?;
        let old = {
            let mut tables = self.tables.write();
            let slot = tables
                .reservations
                .get_mut(&reservation.id)
                .ok_or_else(|| StoreError::not_found("reservation", reservation.id))?;
            std::mem::replace(slot, reservation.clone())
        };
        self.publish(
            Table::Reservations,
            ChangeKind::Update,
            Some(to_json(&old)?),
            Some(to_json(reservation)?),
        );
        Ok(())
    }

    async fn query_reservations(
        &self,
        filters: &ReservationFilters,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<Reservation>, u64)> {
        self.check(Table::Reservations)?;
        let rows = self.matching(filters);
        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_reservations(&self, filters: &ReservationFilters) -> Result<Vec<Reservation>> {
        self.check(Table::Reservations)?;
        Ok(self.matching(filters))
    }

    async fn has_overlapping_reservation(
        &self,
        store_id: &StoreId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool> {
        self.check(Table::Reservations)?;
        let tables = self.tables.read();
        Ok(tables
            .reservations
            .values()
            .any(|r| r.store_id == *store_id && r.is_active() && r.overlaps(start, end)))
    }

    async fn insert_options(&self, options: &[ReservationOption]) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }
        self.check(Table::ReservationOptions)?;
        let mut payloads = Vec::with_capacity(options.len());
        {
            let mut tables = self.tables.write();
            for option in options {
                if !tables.reservations.contains_key(&option.reservation_id) {
                    return Err(StoreError::Constraint(format!(
                        "reservation {} does not exist",
                        option.reservation_id
                    )));
                }
            }
            tables.options.extend_from_slice(options);
        }
        for option in options {
            payloads.push(to_json(option)?);
        }
        for payload in payloads {
            self.publish(Table::ReservationOptions, ChangeKind::Insert, None, Some(payload));
        }
        Ok(())
    }

    async fn list_options(&self, reservation_id: &ReservationId) -> Result<Vec<ReservationOption>> {
        self.check(Table::ReservationOptions)?;
        let tables = self.tables.read();
        Ok(tables
            .options
            .iter()
            .filter(|o| o.reservation_id == *reservation_id)
            .cloned()
            .collect())
    }

    async fn insert_history(&self, rows: &[ReservationHistory]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.check(Table::ReservationHistory)?;
        self.tables.write().history.extend_from_slice(rows);
        for row in rows {
            self.publish(
                Table::ReservationHistory,
                ChangeKind::Insert,
                None,
                Some(to_json(row)?),
            );
        }
        Ok(())
    }

    async fn list_history(
        &self,
        reservation_id: &ReservationId,
    ) -> Result<Vec<ReservationHistory>> {
        self.check(Table::ReservationHistory)?;
        let tables = self.tables.read();
        let mut rows: Vec<_> = tables
            .history
            .iter()
            .filter(|h| h.reservation_id == *reservation_id)
            .cloned()
            .collect();
        rows.sort_by_key(|h| h.id);
        Ok(rows)
    }

    async fn upsert_rows(&self, table: Table, rows: &[Value]) -> Result<u64> {
        let columns = upsert_columns(table).ok_or_else(|| {
            StoreError::Constraint(format!("{table} does not accept generic upserts"))
        })?;
        self.check(table)?;

        let now = to_json(&Utc::now())?;
        let mut changes = Vec::with_capacity(rows.len());
        {
            let mut tables = self.tables.write();
            let stored = tables.rows.entry(table).or_default();
            for row in rows {
                let id = row
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| StoreError::Constraint(format!("{table} row without id")))?
                    .to_string();

                let mut record: Map<String, Value> = columns
                    .iter()
                    .map(|c| ((*c).to_string(), row.get(*c).cloned().unwrap_or(Value::Null)))
                    .collect();
                record.insert("updated_at".into(), now.clone());

                let old = stored.get(&id).cloned();
                let created_at = old
                    .as_ref()
                    .and_then(|o| o.get("created_at").cloned())
                    .unwrap_or_else(|| now.clone());
                record.insert("created_at".into(), created_at);

                let new = Value::Object(record);
                stored.insert(id, new.clone());
                let kind = if old.is_some() {
                    ChangeKind::Update
                } else {
                    ChangeKind::Insert
                };
                changes.push((kind, old, new));
            }
        }

        let written = changes.len() as u64;
        for (kind, old, new) in changes {
            self.publish(table, kind, old, Some(new));
        }
        Ok(written)
    }

    async fn count_rows(&self, table: Table) -> Result<u64> {
        self.check(table)?;
        let tables = self.tables.read();
        let count = match table {
            Table::Customers => tables.customers.len(),
            Table::Reservations => tables.reservations.len(),
            Table::ReservationOptions => tables.options.len(),
            Table::ReservationHistory => tables.history.len(),
            other => tables.rows.get(&other).map_or(0, BTreeMap::len),
        };
        Ok(count as u64)
    }

    async fn latest_updated_row(&self, table: Table) -> Result<Option<Value>> {
        self.check(table)?;
        let tables = self.tables.read();
        match table {
            Table::Customers => tables
                .customers
                .values()
                .max_by_key(|c| c.updated_at)
                .map(to_json)
                .transpose(),
            Table::Reservations => tables
                .reservations
                .values()
                .max_by_key(|r| r.updated_at)
                .map(to_json)
                .transpose(),
            Table::ReservationOptions => tables
                .options
                .iter()
                .max_by_key(|o| o.created_at)
                .map(to_json)
                .transpose(),
            Table::ReservationHistory => tables
                .history
                .iter()
                .max_by_key(|h| h.id)
                .map(to_json)
                .transpose(),
            other => Ok(tables.rows.get(&other).and_then(|rows| {
                rows.values()
                    .max_by_key(|row| {
                        row.get("updated_at")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    })
                    .cloned()
            })),
        }
    }

    async fn subscribe(&self, table: Table) -> Result<ChangeStream> {
        self.check(table)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push((table, tx));
        Ok(ChangeStream::new(table, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mystery_cafe_core::{CreateReservationRequest, CustomerInput, ReservationStatus};
    use serde_json::json;

    fn customer() -> Customer {
        Customer::new(CustomerInput::named("Taro"), "C202503010001".into())
    }

    fn reservation(customer: &Customer, at: &str) -> Reservation {
        let req = CreateReservationRequest::new(
            "Session",
            "S1".parse().unwrap(),
            at.parse().unwrap(),
            4,
            CustomerInput::named("Taro"),
            12_000,
        );
        Reservation::from_request(&req, customer, 0)
    }

    #[tokio::test]
    async fn reservation_requires_existing_customer() {
        let store = MemoryStore::new();
        let c = customer();
        let r = reservation(&c, "2025-03-01T10:00:00Z");
        assert!(matches!(
            store.insert_reservation(&r).await,
            Err(StoreError::Constraint(_))
        ));
        store.insert_customer(&c).await.unwrap();
        store.insert_reservation(&r).await.unwrap();
        assert_eq!(store.get_reservation(&r.id).await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn numbers_are_unique() {
        let store = MemoryStore::new();
        let c = customer();
        store.insert_customer(&c).await.unwrap();

        let twin = customer();
        assert_ne!(twin.id, c.id);
        let err = store.insert_customer(&twin).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(ref msg) if msg.contains("customer_number")));
        assert!(store.get_customer(&twin.id).await.unwrap().is_none());

        let r = reservation(&c, "2025-03-01T10:00:00Z");
        store.insert_reservation(&r).await.unwrap();
        let mut clash = reservation(&c, "2025-03-02T10:00:00Z");
        clash.reservation_number.clone_from(&r.reservation_number);
        let err = store.insert_reservation(&clash).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(ref msg) if msg.contains("reservation_number")));
        assert!(store.get_reservation(&clash.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_orders_newest_first_and_counts() {
        let store = MemoryStore::new();
        let c = customer();
        store.insert_customer(&c).await.unwrap();
        for at in [
            "2025-03-01T10:00:00Z",
            "2025-03-03T10:00:00Z",
            "2025-03-02T10:00:00Z",
        ] {
            store.insert_reservation(&reservation(&c, at)).await.unwrap();
        }

        let (page, total) = store
            .query_reservations(&ReservationFilters::default(), 0, 2)
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert!(page[0].requested_datetime > page[1].requested_datetime);
    }

    #[tokio::test]
    async fn overlap_ignores_cancelled() {
        let store = MemoryStore::new();
        let c = customer();
        store.insert_customer(&c).await.unwrap();
        let mut r = reservation(&c, "2025-03-01T10:00:00Z");
        store.insert_reservation(&r).await.unwrap();

        let start = "2025-03-01T10:00:00Z".parse().unwrap();
        let end = "2025-03-01T11:00:00Z".parse().unwrap();
        let store_id: StoreId = "S1".parse().unwrap();
        assert!(store.has_overlapping_reservation(&store_id, start, end).await.unwrap());

        r.status = ReservationStatus::Cancelled;
        store.update_reservation(&r).await.unwrap();
        assert!(!store.has_overlapping_reservation(&store_id, start, end).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_id() {
        let store = MemoryStore::new();
        let rows = vec![
            json!({"id": "staff-1", "name": "Aoi", "role": "gm"}),
            json!({"id": "staff-2", "name": "Ren", "role": "staff"}),
        ];
        assert_eq!(store.upsert_rows(Table::Staff, &rows).await.unwrap(), 2);
        assert_eq!(store.upsert_rows(Table::Staff, &rows[..1]).await.unwrap(), 1);
        assert_eq!(store.count_rows(Table::Staff).await.unwrap(), 2);

        let err = store
            .upsert_rows(Table::Reservations, &rows)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn subscriptions_receive_writes_for_their_table() {
        let store = MemoryStore::new();
        let mut staff = store.subscribe(Table::Staff).await.unwrap();
        let mut customers = store.subscribe(Table::Customers).await.unwrap();

        store
            .upsert_rows(Table::Staff, &[json!({"id": "staff-1", "name": "Aoi"})])
            .await
            .unwrap();

        let change = staff.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.new.unwrap()["name"], "Aoi");
        let quiet =
            tokio::time::timeout(std::time::Duration::from_millis(20), customers.recv()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn injected_failures_apply_per_table() {
        let store = MemoryStore::new();
        store.fail_table(Table::Customers);
        assert!(store.insert_customer(&customer()).await.is_err());
        assert!(store.subscribe(Table::Customers).await.is_err());
        assert!(store.count_rows(Table::Staff).await.is_ok());
        store.restore_table(Table::Customers);
        assert!(store.insert_customer(&customer()).await.is_ok());
        assert_eq!(store.call_count(Table::Customers), 3);
        assert_eq!(store.call_count(Table::Staff), 1);
    }
}
