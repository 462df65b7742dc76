//! Demand series: required item throughput per day and slot.
//!
//! Demand comes from the forecasting service as hourly records keyed by
//! organization, date and hour. `DemandSeries::from_hourly` maps them onto the
//! horizon's slots by proportional overlap.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::Horizon;

/// One forecast record from the demand feed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HourlyDemand {
    pub organization: String,
    pub date: NaiveDate,
    /// Hour of day, 0..24
    pub hour: u32,
    /// Items required during this hour
    pub items: f64,
    /// Orders behind the item count (informational)
    #[serde(default)]
    pub orders: u32,
}

/// Per-date demand multipliers from campaigns or discounts
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignContext {
    pub multipliers: HashMap<NaiveDate, f64>,
}

impl CampaignContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uplift(mut self, date: NaiveDate, multiplier: f64) -> Self {
        self.multipliers.insert(date, multiplier);
        self
    }

    pub fn multiplier(&self, date: NaiveDate) -> f64 {
        self.multipliers.get(&date).copied().unwrap_or(1.0)
    }
}

/// Read-only demand grid, `slots[day][slot]` items
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DemandSeries {
    pub slots: Vec<Vec<f64>>,
}

impl DemandSeries {
    pub fn from_slots(slots: Vec<Vec<f64>>) -> Self {
        Self { slots }
    }

    pub fn zeros(days: usize, slots_per_day: usize) -> Self {
        Self {
            slots: vec![vec![0.0; slots_per_day]; days],
        }
    }

    /// Build the series from hourly forecast records.
    ///
    /// Each slot receives the share of every hour it overlaps. Records for a
    /// different organization or outside the horizon are skipped.
    pub fn from_hourly(
        organization: &str,
        records: &[HourlyDemand],
        horizon: &Horizon,
        slot_hours: f64,
    ) -> Self {
        let mut series = Self::zeros(horizon.days, horizon.slots_per_day);
        let open = hours_of(horizon.open);

        for record in records {
            if record.organization != organization {
                debug!(organization = %record.organization, "skipping demand for other organization");
                continue;
            }
            let offset = (record.date - horizon.start).num_days();
            if offset < 0 || offset as usize >= horizon.days || record.hour >= 24 {
                debug!(date = %record.date, hour = record.hour, "skipping demand outside horizon");
                continue;
            }
            let day = offset as usize;
            let hour_start = record.hour as f64;
            let hour_end = hour_start + 1.0;

            for slot in 0..horizon.slots_per_day {
                let slot_start = open + slot as f64 * slot_hours;
                let slot_end = slot_start + slot_hours;
                let overlap = slot_end.min(hour_end) - slot_start.max(hour_start);
                if overlap > 0.0 {
                    series.slots[day][slot] += record.items * overlap;
                }
            }
        }
        series
    }

    /// Scale each day by its campaign multiplier
    pub fn with_campaign(mut self, horizon: &Horizon, campaign: &CampaignContext) -> Self {
        for (day, row) in self.slots.iter_mut().enumerate() {
            let factor = campaign.multiplier(horizon.date(day));
            for value in row.iter_mut() {
                *value *= factor;
            }
        }
        self
    }

    pub fn get(&self, day: usize, slot: usize) -> f64 {
        self.slots
            .get(day)
            .and_then(|row| row.get(slot))
            .copied()
            .unwrap_or(0.0)
    }

    /// Demand over a span of slots in hundredths of an item, rounded up
    pub fn hundredths(&self, day: usize, first_slot: usize, slots: usize) -> i64 {
        let total: f64 = (first_slot..first_slot + slots)
            .map(|slot| self.get(day, slot))
            .sum();
        (total * 100.0 - crate::HOURS_EPSILON * 100.0).ceil().max(0.0) as i64
    }

    pub fn total(&self) -> f64 {
        self.slots.iter().flatten().sum()
    }

    /// (days, slots) or `usize::MAX` slots when rows are ragged
    pub fn shape(&self) -> (usize, usize) {
        let width = self.slots.first().map(Vec::len).unwrap_or(0);
        if self.slots.iter().any(|row| row.len() != width) {
            return (self.slots.len(), usize::MAX);
        }
        (self.slots.len(), width)
    }

    pub(crate) fn first_invalid(&self) -> Option<(usize, usize)> {
        for (day, row) in self.slots.iter().enumerate() {
            for (slot, value) in row.iter().enumerate() {
                if !value.is_finite() || *value < 0.0 {
                    return Some((day, slot));
                }
            }
        }
        None
    }
}

fn hours_of(time: NaiveTime) -> f64 {
    time.hour() as f64 + time.minute() as f64 / 60.0
}
