//! Reservation audit trail and partial updates.
//!
//! Every persisted field mutation on a reservation produces exactly one
//! [`ReservationHistory`] row. [`ReservationPatch::diff`] is the single place
//! that decides what counts as a mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    HistoryId, PaymentStatus, Reservation, ReservationId, ReservationStatus, StaffId,
};

/// An append-only audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationHistory {
    /// Row identifier (time-ordered).
    pub id: HistoryId,
    /// Reservation the change applies to.
    pub reservation_id: ReservationId,
    /// Classified change.
    pub change_type: ChangeType,
    /// Field that changed.
    pub field_name: Option<String>,
    /// Value before the change.
    pub old_value: Option<Value>,
    /// Value after the change.
    pub new_value: Option<Value>,
    /// Actor responsible.
    pub changed_by: Option<String>,
    /// Free-form reason.
    pub reason: Option<String>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl ReservationHistory {
    /// The `null -> pending` row written when a reservation is created.
    #[must_use]
    pub fn created(reservation_id: ReservationId, actor: Option<String>) -> Self {
        Self {
            id: HistoryId::generate(),
            reservation_id,
            change_type: ChangeType::StatusChange,
            field_name: Some("status".to_string()),
            old_value: Some(Value::Null),
            new_value: Some(Value::String(ReservationStatus::Pending.as_str().to_string())),
            changed_by: actor,
            reason: Some("reservation created".to_string()),
            created_at: Utc::now(),
        }
    }

    /// A row recording one field change.
    #[must_use]
    pub fn field_change(
        reservation_id: ReservationId,
        change: &FieldChange,
        actor: &str,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: HistoryId::generate(),
            reservation_id,
            change_type: ChangeType::classify(change.field),
            field_name: Some(change.field.to_string()),
            old_value: Some(change.old.clone()),
            new_value: Some(change.new.clone()),
            changed_by: Some(actor.to_string()),
            reason,
            created_at: Utc::now(),
        }
    }
}

/// Kind of change recorded in a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Lifecycle status changed.
    StatusChange,
    /// Requested or actual time changed.
    DatetimeChange,
    /// Staff assignment changed.
    StaffChange,
    /// Payment state or price component changed.
    PaymentChange,
    /// Anything else.
    FieldUpdate,
}

text_enum!(ChangeType {
    StatusChange => "status_change",
    DatetimeChange => "datetime_change",
    StaffChange => "staff_change",
    PaymentChange => "payment_change",
    FieldUpdate => "field_update",
});

impl ChangeType {
    /// Classify a change by its field name.
    #[must_use]
    pub fn classify(field: &str) -> Self {
        let is_payment = field.contains("payment")
            || field.contains("price")
            || field.contains("discount");
        if field.contains("status") && !is_payment {
            Self::StatusChange
        } else if field.contains("datetime") {
            Self::DatetimeChange
        } else if field.contains("staff") {
            Self::StaffChange
        } else if is_payment {
            Self::PaymentChange
        } else {
            Self::FieldUpdate
        }
    }
}

/// One field whose patched value differs from the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// Column name.
    pub field: &'static str,
    /// Stored value.
    pub old: Value,
    /// Patched value.
    pub new: Value,
}

/// A partial update to a reservation. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationPatch {
    /// New title.
    pub title: Option<String>,
    /// New requested start.
    pub requested_datetime: Option<DateTime<Utc>>,
    /// Actual start.
    pub actual_datetime: Option<DateTime<Utc>>,
    /// New session length.
    pub duration_minutes: Option<i32>,
    /// New headcount.
    pub participant_count: Option<i32>,
    /// New participant names.
    pub participant_names: Option<Vec<String>>,
    /// New staff assignment.
    pub assigned_staff: Option<Vec<StaffId>>,
    /// New lifecycle status.
    pub status: Option<ReservationStatus>,
    /// New payment status.
    pub payment_status: Option<PaymentStatus>,
    /// New payment method.
    pub payment_method: Option<String>,
    /// New discount; `final_price` is recomputed.
    pub discount_amount: Option<i64>,
    /// New customer notes.
    pub customer_notes: Option<String>,
    /// New internal notes.
    pub internal_notes: Option<String>,
    /// Cancellation reason.
    pub cancellation_reason: Option<String>,
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Push a change when a patched plain field differs from the stored value.
macro_rules! diff_plain {
    ($changes:ident, $patch:ident, $current:ident, $($field:ident),+) => {
        $(
            if let Some(new) = &$patch.$field {
                if *new != $current.$field {
                    $changes.push(FieldChange {
                        field: stringify!($field),
                        old: to_json(&$current.$field),
                        new: to_json(new),
                    });
                }
            }
        )+
    };
}

/// Push a change when a patched value differs from an optional stored value.
macro_rules! diff_optional {
    ($changes:ident, $patch:ident, $current:ident, $($field:ident),+) => {
        $(
            if let Some(new) = &$patch.$field {
                if $current.$field.as_ref() != Some(new) {
                    $changes.push(FieldChange {
                        field: stringify!($field),
                        old: to_json(&$current.$field),
                        new: to_json(new),
                    });
                }
            }
        )+
    };
}

impl ReservationPatch {
    /// Whether the patch names no field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fields present in the patch whose values differ from `current`.
    #[must_use]
    pub fn diff(&self, current: &Reservation) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        let patch = self;
        diff_plain!(
            changes,
            patch,
            current,
            title,
            requested_datetime,
            duration_minutes,
            participant_count,
            participant_names,
            assigned_staff,
            status,
            payment_status,
            discount_amount
        );
        diff_optional!(
            changes,
            patch,
            current,
            actual_datetime,
            payment_method,
            customer_notes,
            internal_notes,
            cancellation_reason
        );
        changes
    }

    /// Write every present field into `target` and bump `updated_at`.
    pub fn apply(&self, target: &mut Reservation) {
        let patch = self.clone();
        if let Some(v) = patch.title {
            target.title = v;
        }
        if let Some(v) = patch.requested_datetime {
            target.requested_datetime = v;
        }
        if let Some(v) = patch.actual_datetime {
            target.actual_datetime = Some(v);
        }
        if let Some(v) = patch.duration_minutes {
            target.duration_minutes = v;
        }
        if let Some(v) = patch.participant_count {
            target.participant_count = v;
        }
        if let Some(v) = patch.participant_names {
            target.participant_names = v;
        }
        if let Some(v) = patch.assigned_staff {
            target.assigned_staff = v;
        }
        if let Some(v) = patch.status {
            target.status = v;
        }
        if let Some(v) = patch.payment_status {
            target.payment_status = v;
        }
        if let Some(v) = patch.payment_method {
            target.payment_method = Some(v);
        }
        if let Some(v) = patch.discount_amount {
            target.discount_amount = v;
            target.reprice();
        }
        if let Some(v) = patch.customer_notes {
            target.customer_notes = Some(v);
        }
        if let Some(v) = patch.internal_notes {
            target.internal_notes = Some(v);
        }
        if let Some(v) = patch.cancellation_reason {
            target.cancellation_reason = Some(v);
        }
        target.updated_at = Utc::now();
    }
}
