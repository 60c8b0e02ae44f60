//! Hourly scheduling slots.
//!
//! A slot is one hour at one store. Capacity is a single session: a slot is
//! unavailable as soon as any non-cancelled reservation at the store overlaps
//! it.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::ScenarioId;

/// Local hour of the first slot.
pub const FIRST_SLOT_HOUR: u32 = 9;

/// Local hour of the last slot (inclusive).
pub const LAST_SLOT_HOUR: u32 = 21;

/// Slots per store and day.
pub const SLOTS_PER_DAY: usize = (LAST_SLOT_HOUR - FIRST_SLOT_HOUR + 1) as usize;

/// One hourly slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Slot start.
    pub start: DateTime<Utc>,
    /// Slot end (exclusive).
    pub end: DateTime<Utc>,
    /// Local start time as `HH:MM`.
    pub label: String,
    /// Whether the slot can still be booked.
    pub available: bool,
    /// Scenario the availability was asked for.
    pub scenario_id: Option<ScenarioId>,
}

/// Generate the day's slots for `date` in the business time zone, all marked available.
#[must_use]
pub fn day_slots(
    date: NaiveDate,
    offset: FixedOffset,
    scenario_id: Option<&ScenarioId>,
) -> Vec<TimeSlot> {
    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .filter_map(|hour| {
            let local = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0)?);
            let start = offset
                .from_local_datetime(&local)
                .single()?
                .with_timezone(&Utc);
            Some(TimeSlot {
                start,
                end: start + Duration::hours(1),
                label: format!("{hour:02}:00"),
                available: true,
                scenario_id: scenario_id.cloned(),
            })
        })
        .collect()
}
