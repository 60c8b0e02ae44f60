//! Reservation statistics, computed in memory from loaded rows.

use std::collections::HashMap;

use chrono::{FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

use crate::{Reservation, ReservationStatus, ScenarioId};

/// Entries kept in the popularity rankings.
pub const RANKING_SIZE: usize = 5;

/// Counts and revenue over a set of reservations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationStats {
    /// All reservations considered.
    pub total: u64,
    /// Pending reservations.
    pub pending: u64,
    /// Confirmed reservations.
    pub confirmed: u64,
    /// Cancelled reservations.
    pub cancelled: u64,
    /// Completed reservations.
    pub completed: u64,
    /// No-shows.
    pub no_show: u64,
    /// Sum of `final_price` over confirmed and completed reservations.
    pub total_revenue: i64,
    /// `total_revenue` per revenue-bearing reservation.
    pub average_revenue: f64,
    /// Mean headcount over all reservations.
    pub average_participants: f64,
    /// Percentage of reservations cancelled.
    pub cancellation_rate: f64,
    /// Percentage of reservations that were no-shows.
    pub no_show_rate: f64,
    /// Most booked scenarios, descending.
    pub popular_scenarios: Vec<ScenarioCount>,
    /// Busiest local start hours, descending.
    pub busy_time_slots: Vec<HourCount>,
}

/// Bookings per scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioCount {
    /// Scenario.
    pub scenario_id: ScenarioId,
    /// Non-cancelled reservations.
    pub count: u64,
}

/// Bookings per local start hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourCount {
    /// Local hour, 0..24.
    pub hour: u32,
    /// Non-cancelled reservations.
    pub count: u64,
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

impl ReservationStats {
    /// Compute statistics over `rows`; hours are bucketed in `offset`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(rows: &[Reservation], offset: FixedOffset) -> Self {
        let mut stats = Self {
            total: rows.len() as u64,
            ..Self::default()
        };
        let mut revenue_rows = 0u64;
        let mut participants = 0i64;
        let mut by_scenario: HashMap<&ScenarioId, u64> = HashMap::new();
        let mut by_hour: HashMap<u32, u64> = HashMap::new();

        for r in rows {
            match r.status {
                ReservationStatus::Pending => stats.pending += 1,
                ReservationStatus::Confirmed => stats.confirmed += 1,
                ReservationStatus::Cancelled => stats.cancelled += 1,
                ReservationStatus::Completed => stats.completed += 1,
                ReservationStatus::NoShow => stats.no_show += 1,
            }
            if matches!(
                r.status,
                ReservationStatus::Confirmed | ReservationStatus::Completed
            ) {
                stats.total_revenue += r.final_price;
                revenue_rows += 1;
            }
            participants += i64::from(r.participant_count);

            if r.is_active() {
                if let Some(scenario) = &r.scenario_id {
                    *by_scenario.entry(scenario).or_default() += 1;
                }
                let hour = r.requested_datetime.with_timezone(&offset).hour();
                *by_hour.entry(hour).or_default() += 1;
            }
        }

        stats.average_revenue = ratio(stats.total_revenue as f64, revenue_rows);
        stats.average_participants = ratio(participants as f64, stats.total);
        stats.cancellation_rate = ratio(stats.cancelled as f64 * 100.0, stats.total);
        stats.no_show_rate = ratio(stats.no_show as f64 * 100.0, stats.total);

        let mut scenarios: Vec<_> = by_scenario
            .into_iter()
            .map(|(scenario_id, count)| ScenarioCount {
                scenario_id: scenario_id.clone(),
                count,
            })
            .collect();
        scenarios.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.scenario_id.cmp(&b.scenario_id))
        });
        scenarios.truncate(RANKING_SIZE);
        stats.popular_scenarios = scenarios;

        let mut hours: Vec<_> = by_hour
            .into_iter()
            .map(|(hour, count)| HourCount { hour, count })
            .collect();
        hours.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.hour.cmp(&b.hour)));
        hours.truncate(RANKING_SIZE);
        stats.busy_time_slots = hours;

        stats
    }
}
