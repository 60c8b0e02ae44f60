//! Store used while no backend is available.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use mystery_cafe_core::{
    Customer, CustomerId, Reservation, ReservationFilters, ReservationHistory, ReservationId,
    ReservationOption, StoreId, Table,
};

use crate::error::{Result, StoreError};
use crate::feed::ChangeStream;
use crate::Store;

/// Fails every operation with the error it was created with.
#[derive(Debug, Clone)]
pub struct DisconnectedStore {
    error: StoreError,
}

impl DisconnectedStore {
    /// Create a store that always fails with `error`.
    #[must_use]
    pub const fn new(error: StoreError) -> Self {
        Self { error }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(self.error.clone())
    }
}

#[async_trait]
impl Store for DisconnectedStore {
    async fn get_customer(&self, _id: &CustomerId) -> Result<Option<Customer>> {
        self.fail()
    }

    async fn find_customer_by_contact(
        &self,
        _email: Option<&str>,
        _phone: Option<&str>,
    ) -> Result<Option<Customer>> {
        self.fail()
    }

    async fn count_customers_created_between(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<u64> {
        self.fail()
    }

    async fn insert_customer(&self, _customer: &Customer) -> Result<()> {
        self.fail()
    }

    async fn update_customer(&self, _customer: &Customer) -> Result<()> {
        self.fail()
    }

    async fn insert_reservation(&self, _reservation: &Reservation) -> Result<()> {
        self.fail()
    }

    async fn get_reservation(&self, _id: &ReservationId) -> Result<Option<Reservation>> {
        self.fail()
    }

    async fn update_reservation(&self, _reservation: &Reservation) -> Result<()> {
        self.fail()
    }

    async fn query_reservations(
        &self,
        _filters: &ReservationFilters,
        _offset: u64,
        _limit: u32,
    ) -> Result<(Vec<Reservation>, u64)> {
        self.fail()
    }

    async fn list_reservations(&self, _filters: &ReservationFilters) -> Result<Vec<Reservation>> {
        self.fail()
    }

    async fn has_overlapping_reservation(
        &self,
        _store_id: &StoreId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<bool> {
        self.fail()
    }

    async fn insert_options(&self, _options: &[ReservationOption]) -> Result<()> {
        self.fail()
    }

    async fn list_options(&self, _id: &ReservationId) -> Result<Vec<ReservationOption>> {
        self.fail()
    }

    async fn insert_history(&self, _rows: &[ReservationHistory]) -> Result<()> {
        self.fail()
    }

    async fn list_history(&self, _id: &ReservationId) -> Result<Vec<ReservationHistory>> {
        self.fail()
    }

    async fn upsert_rows(&self, _table: Table, _rows: &[Value]) -> Result<u64> {
        self.fail()
    }

    async fn count_rows(&self, _table: Table) -> Result<u64> {
        self.fail()
    }

    async fn latest_updated_row(&self, _table: Table) -> Result<Option<Value>> {
        self.fail()
    }

    async fn subscribe(&self, _table: Table) -> Result<ChangeStream> {
        self.fail()
    }
}
