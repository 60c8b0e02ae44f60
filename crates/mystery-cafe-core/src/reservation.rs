//! Reservation records and the request that creates them.
//!
//! All money is `i64` in the smallest currency unit. At creation
//! `final_price == base_price + options_price - discount_amount`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CafeError, Customer, CustomerId, CustomerInput, OptionId, ReservationId, ScenarioId, StaffId,
    StoreId,
};

/// Default session length when the request does not give one.
pub const DEFAULT_DURATION_MINUTES: i32 = 60;

/// A booked session tying a customer to a store, scenario and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Row identifier.
    pub id: ReservationId,
    /// Human-facing number, see [`reservation_number`].
    pub reservation_number: String,
    /// Session title shown on the admin board.
    pub title: String,
    /// Channel the reservation came in through.
    pub source: ReservationSource,

    /// Booking customer.
    pub customer_id: CustomerId,
    /// Customer name at booking time.
    pub customer_name: String,
    /// Customer email at booking time.
    pub customer_email: Option<String>,
    /// Customer phone at booking time.
    pub customer_phone: Option<String>,

    /// Store the session runs at.
    pub store_id: StoreId,
    /// Scenario played, if chosen.
    pub scenario_id: Option<ScenarioId>,

    /// Requested start.
    pub requested_datetime: DateTime<Utc>,
    /// Actual start, once known.
    pub actual_datetime: Option<DateTime<Utc>>,
    /// Session length.
    pub duration_minutes: i32,

    /// Headcount.
    pub participant_count: i32,
    /// Optional participant names.
    pub participant_names: Vec<String>,
    /// Staff assigned to run the session.
    pub assigned_staff: Vec<StaffId>,

    /// Base price.
    pub base_price: i64,
    /// Sum of option line totals.
    pub options_price: i64,
    /// Discount applied.
    pub discount_amount: i64,
    /// Amount due.
    pub final_price: i64,
    /// Payment method label (`cash`, `card`, ...).
    pub payment_method: Option<String>,
    /// Payment state.
    pub payment_status: PaymentStatus,

    /// Lifecycle state.
    pub status: ReservationStatus,
    /// Notes from the customer.
    pub customer_notes: Option<String>,
    /// Notes for staff only.
    pub internal_notes: Option<String>,
    /// Set whenever the reservation is cancelled.
    pub cancellation_reason: Option<String>,
    /// Set whenever the reservation is cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Actor that created the row.
    pub created_by: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Build a pending reservation from a validated request.
    ///
    /// `options_price` must be the total of the request's option lines.
    /// [`CreateReservationRequest::validate`] guarantees the price fits.
    #[must_use]
    pub fn from_request(
        request: &CreateReservationRequest,
        customer: &Customer,
        options_price: i64,
    ) -> Self {
        let now = Utc::now();
        let id = ReservationId::generate();
        Self {
            id,
            reservation_number: reservation_number(id, now),
            title: request.title.clone(),
            source: request.source,
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            customer_phone: customer.phone.clone(),
            store_id: request.store_id.clone(),
            scenario_id: request.scenario_id.clone(),
            requested_datetime: request.requested_datetime,
            actual_datetime: None,
            duration_minutes: request.duration_minutes,
            participant_count: request.participant_count,
            participant_names: request.participant_names.clone(),
            assigned_staff: request.assigned_staff.clone(),
            base_price: request.base_price,
            options_price,
            discount_amount: request.discount_amount,
            final_price: saturating_price(
                request.base_price,
                options_price,
                request.discount_amount,
            ),
            payment_method: request.payment_method.clone(),
            payment_status: PaymentStatus::Pending,
            status: ReservationStatus::Pending,
            customer_notes: request.customer_notes.clone(),
            internal_notes: request.internal_notes.clone(),
            cancellation_reason: None,
            cancelled_at: None,
            created_by: request.created_by.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The half-open interval the session occupies.
    #[must_use]
    pub fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.requested_datetime;
        (
            start,
            start + Duration::minutes(i64::from(self.duration_minutes)),
        )
    }

    /// Whether the session overlaps `[start, end)`.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let (own_start, own_end) = self.time_range();
        own_start < end && own_end > start
    }

    /// Whether the reservation still holds its slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }

    /// Recompute `final_price` from the stored components.
    ///
    /// Saturates at the `i64` bounds; a discount larger than the total
    /// leaves a negative price for validation to reject.
    pub fn reprice(&mut self) {
        self.final_price =
            saturating_price(self.base_price, self.options_price, self.discount_amount);
    }
}

/// Format a reservation number from the id and creation time.
#[must_use]
pub fn reservation_number(id: ReservationId, created_at: DateTime<Utc>) -> String {
    let simple = id.as_uuid().simple().to_string();
    format!(
        "R{}-{}",
        created_at.format("%y%m%d"),
        simple[..6].to_uppercase()
    )
}

/// `base + options - discount`, or `None` if it overflows.
#[must_use]
pub fn final_price(base_price: i64, options_price: i64, discount_amount: i64) -> Option<i64> {
    base_price
        .checked_add(options_price)?
        .checked_sub(discount_amount)
}

const fn saturating_price(base_price: i64, options_price: i64, discount_amount: i64) -> i64 {
    base_price
        .saturating_add(options_price)
        .saturating_sub(discount_amount)
}

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Awaiting confirmation.
    Pending,
    /// Confirmed by staff.
    Confirmed,
    /// Cancelled; terminal.
    Cancelled,
    /// Session took place.
    Completed,
    /// Customer did not show up.
    NoShow,
}

text_enum!(ReservationStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    Completed => "completed",
    NoShow => "no_show",
});

/// Payment state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Not yet paid.
    Pending,
    /// Paid in full.
    Paid,
    /// Refunded.
    Refunded,
    /// Payment voided.
    Cancelled,
}

text_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Refunded => "refunded",
    Cancelled => "cancelled",
});

/// Channel a reservation came in through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationSource {
    /// Entered on the admin screens.
    #[default]
    Admin,
    /// Public reservation site.
    Web,
    /// Taken over the phone.
    Phone,
    /// Walk-in customer.
    WalkIn,
}

text_enum!(ReservationSource {
    Admin => "admin",
    Web => "web",
    Phone => "phone",
    WalkIn => "walk_in",
});

/// An additional priced line item on a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationOption {
    /// Row identifier.
    pub id: OptionId,
    /// Owning reservation.
    pub reservation_id: ReservationId,
    /// Line label.
    pub option_name: String,
    /// Unit price.
    pub price: i64,
    /// Units.
    pub quantity: i32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ReservationOption {
    /// Materialize an option line for `reservation_id`.
    #[must_use]
    pub fn new(reservation_id: ReservationId, input: &OptionInput) -> Self {
        Self {
            id: OptionId::generate(),
            reservation_id,
            option_name: input.option_name.clone(),
            price: input.price,
            quantity: input.quantity,
            created_at: Utc::now(),
        }
    }
}

/// An option line as supplied in a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionInput {
    /// Line label.
    #[serde(alias = "name")]
    pub option_name: String,
    /// Unit price.
    pub price: i64,
    /// Units (default 1).
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

impl OptionInput {
    /// `price * quantity`, or `None` if it overflows.
    #[must_use]
    pub fn line_total(&self) -> Option<i64> {
        self.price.checked_mul(i64::from(self.quantity))
    }
}

const fn default_quantity() -> i32 {
    1
}

const fn default_duration() -> i32 {
    DEFAULT_DURATION_MINUTES
}

/// Sum of option line totals, or `None` if any step overflows.
#[must_use]
pub fn options_total(options: &[OptionInput]) -> Option<i64> {
    options
        .iter()
        .try_fold(0_i64, |total, option| total.checked_add(option.line_total()?))
}

/// Input to the reservation creation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReservationRequest {
    /// Session title.
    pub title: String,
    /// Store the session runs at.
    pub store_id: StoreId,
    /// Scenario, if chosen.
    #[serde(default)]
    pub scenario_id: Option<ScenarioId>,
    /// Requested start.
    pub requested_datetime: DateTime<Utc>,
    /// Session length.
    #[serde(default = "default_duration")]
    pub duration_minutes: i32,
    /// Headcount.
    pub participant_count: i32,
    /// Optional participant names.
    #[serde(default)]
    pub participant_names: Vec<String>,
    /// Staff to assign up front.
    #[serde(default)]
    pub assigned_staff: Vec<StaffId>,
    /// Existing customer to book for.
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    /// Details for a new (or matched) customer.
    #[serde(default)]
    pub customer: Option<CustomerInput>,
    /// Base price.
    pub base_price: i64,
    /// Discount.
    #[serde(default)]
    pub discount_amount: i64,
    /// Option lines.
    #[serde(default)]
    pub options: Vec<OptionInput>,
    /// Payment method label.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Booking channel.
    #[serde(default)]
    pub source: ReservationSource,
    /// Notes from the customer.
    #[serde(default)]
    pub customer_notes: Option<String>,
    /// Notes for staff only.
    #[serde(default)]
    pub internal_notes: Option<String>,
    /// Actor creating the reservation.
    #[serde(default)]
    pub created_by: Option<String>,
}

impl CreateReservationRequest {
    /// Minimal request for a new customer.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        store_id: StoreId,
        requested_datetime: DateTime<Utc>,
        participant_count: i32,
        customer: CustomerInput,
        base_price: i64,
    ) -> Self {
        Self {
            title: title.into(),
            store_id,
            scenario_id: None,
            requested_datetime,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            participant_count,
            participant_names: Vec::new(),
            assigned_staff: Vec::new(),
            customer_id: None,
            customer: Some(customer),
            base_price,
            discount_amount: 0,
            options: Vec::new(),
            payment_method: None,
            source: ReservationSource::Admin,
            customer_notes: None,
            internal_notes: None,
            created_by: None,
        }
    }

    /// Check the request before any remote call is made.
    ///
    /// # Errors
    ///
    /// Returns `CafeError::ConstraintViolation` describing the first problem.
    pub fn validate(&self) -> Result<(), CafeError> {
        let fail = |msg: &str| Err(CafeError::ConstraintViolation(msg.to_string()));

        if self.title.trim().is_empty() {
            return fail("title must not be empty");
        }
        if self.participant_count < 1 {
            return fail("participant_count must be at least 1");
        }
        if self.duration_minutes < 1 {
            return fail("duration_minutes must be at least 1");
        }
        if self.base_price < 0 {
            return fail("base_price must not be negative");
        }
        if self.discount_amount < 0 {
            return fail("discount_amount must not be negative");
        }
        if self
            .options
            .iter()
            .any(|o| o.price < 0 || o.quantity < 1 || o.option_name.trim().is_empty())
        {
            return fail("options need a name, a non-negative price and a positive quantity");
        }
        let total = options_total(&self.options)
            .and_then(|options| final_price(self.base_price, options, self.discount_amount));
        match total {
            None => return fail("price total out of range"),
            Some(total) if total < 0 => return fail("discount_amount exceeds the total price"),
            Some(_) => {}
        }
        match (&self.customer_id, &self.customer) {
            (None, None) => fail("either customer_id or customer is required"),
            (None, Some(input)) if input.name.trim().is_empty() => {
                fail("customer name must not be empty")
            }
            _ => Ok(()),
        }
    }
}
