//! Planning parameters derived from a snapshot.
//!
//! Both the model builder and the decoder work from the same `Plan`, so the
//! decoder's independent re-checks use exactly the integer quantities the
//! model was built with (capacity and demand per period, slot caps).
//!
//! Supply and demand are counted in hundredths of an item. Rounding happens
//! once per period total, so fractional rates and sub-item demand survive.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use staffplan_core::{Employee, Period, RulesError, SchedulingMode, Snapshot};

/// A schedulable period on the global timeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodSpec {
    pub day: usize,
    pub period: Period,
    /// First slot of the period within its day
    pub first_slot: usize,
    pub slots: usize,
}

impl PeriodSpec {
    /// First slot on the global (day-major) timeline
    pub fn global_start(&self, slots_per_day: usize) -> usize {
        self.day * slots_per_day + self.first_slot
    }

    /// One past the last slot on the global timeline
    pub fn global_end(&self, slots_per_day: usize) -> usize {
        self.global_start(slots_per_day) + self.slots
    }
}

/// Validated snapshot plus the integer parameters of the model
#[derive(Debug)]
pub struct Plan<'a> {
    pub snapshot: &'a Snapshot,
    pub mode: SchedulingMode,
    /// Periods in timeline order: day-major, then period index
    pub periods: Vec<PeriodSpec>,
    pub periods_per_day: usize,
    /// Required supply per period, in hundredths of an item
    pub demand: Vec<i64>,
    /// Chain contribution factor in hundredths
    pub contribution_pct: Vec<i64>,
    /// Role indexes of each chain's stages
    pub chain_stages: Vec<Vec<usize>>,
    /// Eligible role indexes per employee
    pub eligible: Vec<Vec<usize>>,
    /// Weekly slot cap per employee
    pub weekly_max_slots: Vec<usize>,
    pub weekly_min_slots: usize,
    /// Preferred slots over the whole horizon per employee
    pub preferred_slots: Vec<i64>,
    /// Wage cost of one slot, in cents
    pub wage_cents_per_slot: Vec<i64>,
    pub min_shift_slots: usize,
    /// Consecutive-slot cap per employee
    pub max_consecutive: Vec<usize>,
    pub min_rest_slots: usize,
    /// Day ranges of each 7-day block
    pub weeks: Vec<std::ops::Range<usize>>,
}

impl<'a> Plan<'a> {
    /// Validate the snapshot and derive the model parameters
    pub fn derive(snapshot: &'a Snapshot, mode: &SchedulingMode) -> Result<Self, RulesError> {
        snapshot.validate(mode)?;

        let rules = &snapshot.rules;
        let horizon = &snapshot.horizon;

        let periods: Vec<PeriodSpec> = match mode {
            SchedulingMode::SlotBased => (0..horizon.days)
                .flat_map(|day| {
                    (0..horizon.slots_per_day).map(move |slot| PeriodSpec {
                        day,
                        period: Period::Slot(slot),
                        first_slot: slot,
                        slots: 1,
                    })
                })
                .collect(),
            SchedulingMode::FixedShift { .. } => {
                let templates = mode.shift_templates(rules, horizon.slots_per_day)?;
                (0..horizon.days)
                    .flat_map(|day| {
                        templates
                            .iter()
                            .enumerate()
                            .map(move |(index, t)| PeriodSpec {
                                day,
                                period: Period::Shift(index),
                                first_slot: t.start_slot,
                                slots: t.length_slots,
                            })
                    })
                    .collect()
            }
        };
        let periods_per_day = periods.len() / horizon.days;

        let demand = periods
            .iter()
            .map(|p| snapshot.demand.hundredths(p.day, p.first_slot, p.slots))
            .collect();

        let chain_stages = snapshot
            .chains
            .iter()
            .map(|c| {
                c.stages
                    .iter()
                    .filter_map(|s| snapshot.role_index(s))
                    .collect()
            })
            .collect();

        let eligible = snapshot
            .employees
            .iter()
            .map(|e| {
                let mut roles: Vec<usize> =
                    e.roles.iter().filter_map(|r| snapshot.role_index(r)).collect();
                roles.sort_unstable();
                roles.dedup();
                roles
            })
            .collect();

        let weekly_max_slots = snapshot
            .employees
            .iter()
            .map(|e| rules.slots_floor(e.max_hours_week.min(rules.weekly_max_hours)))
            .collect();

        let horizon_weeks = horizon.days as f64 / 7.0;
        let preferred_slots = snapshot
            .employees
            .iter()
            .map(|e| (e.preferred_hours_week * horizon_weeks / rules.slot_hours).round() as i64)
            .collect();

        let wage_cents_per_slot = snapshot
            .employees
            .iter()
            .map(|e| wage_cents(e, rules.slot_hours))
            .collect();

        let max_consecutive = snapshot
            .employees
            .iter()
            .map(|e| {
                let cap = rules.max_shift_slots();
                e.max_consecutive_slots.map_or(cap, |own| own.min(cap))
            })
            .collect();

        let weeks = (0..horizon.days)
            .step_by(7)
            .map(|start| start..(start + 7).min(horizon.days))
            .collect();

        Ok(Self {
            snapshot,
            mode: mode.clone(),
            periods,
            periods_per_day,
            demand,
            contribution_pct: snapshot.chains.iter().map(|c| c.contribution_pct()).collect(),
            chain_stages,
            eligible,
            weekly_max_slots,
            weekly_min_slots: rules.slots_ceil(rules.weekly_min_hours),
            preferred_slots,
            wage_cents_per_slot,
            min_shift_slots: rules.min_shift_slots(),
            max_consecutive,
            min_rest_slots: rules.min_rest_slots,
            weeks,
        })
    }

    pub fn is_slot_based(&self) -> bool {
        matches!(self.mode, SchedulingMode::SlotBased)
    }

    pub fn slots_per_day(&self) -> usize {
        self.snapshot.horizon.slots_per_day
    }

    pub fn slot_hours(&self) -> f64 {
        self.snapshot.rules.slot_hours
    }

    pub fn employee_count(&self) -> usize {
        self.snapshot.employees.len()
    }

    /// Index of `(day, period)` in `periods`
    pub fn period_index(&self, day: usize, period: Period) -> usize {
        day * self.periods_per_day + period.index()
    }

    pub fn is_available(&self, employee: usize, period: usize) -> bool {
        let spec = &self.periods[period];
        self.snapshot.employees[employee]
            .availability
            .get(spec.day, spec.period.index())
    }

    pub fn prefers(&self, employee: usize, period: usize) -> bool {
        let spec = &self.periods[period];
        self.snapshot.employees[employee].prefers(spec.day, spec.period.index())
    }

    /// Hundredths of an item one employee in `role` produces over `period`
    pub fn capacity(&self, role: usize, period: usize) -> i64 {
        let hours = self.slot_hours() * self.periods[period].slots as f64;
        self.snapshot.roles[role].capacity_hundredths(hours)
    }

    /// Periods belonging to the days of `week`
    pub fn periods_in_week(&self, week: usize) -> std::ops::Range<usize> {
        let days = &self.weeks[week];
        days.start * self.periods_per_day..days.end * self.periods_per_day
    }

    /// Roles contributing to supply directly
    pub fn independent_roles(&self) -> Vec<usize> {
        self.snapshot
            .roles
            .iter()
            .enumerate()
            .filter(|(_, r)| r.independent)
            .map(|(i, _)| i)
            .collect()
    }
}

fn wage_cents(employee: &Employee, slot_hours: f64) -> i64 {
    let hours = Decimal::from_f64_retain(slot_hours).unwrap_or_default();
    (employee.hourly_wage * hours * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use staffplan_core::{Availability, DemandSeries, Horizon, Role, Rules};

    fn snapshot(mode_rules: Rules, grid: Availability) -> Snapshot {
        Snapshot::new("cafe", Horizon::days(2, 4))
            .rules(mode_rules)
            .role(Role::new("barista").producing(10.0))
            .employee(
                Employee::new("alice")
                    .role("barista")
                    .wage(dec!(15.50))
                    .preferred_hours(14.0)
                    .availability(grid),
            )
            .demand(DemandSeries::from_slots(vec![
                vec![1.0, 2.0, 3.0, 4.5],
                vec![0.0; 4],
            ]))
    }

    #[test]
    fn slot_mode_has_one_period_per_slot() {
        let snapshot = snapshot(Rules::default(), Availability::Slots(vec![vec![true; 4]; 2]));
        let plan = Plan::derive(&snapshot, &SchedulingMode::SlotBased).unwrap();
        assert_eq!(plan.periods.len(), 8);
        assert_eq!(plan.demand[3], 450);
        assert_eq!(plan.wage_cents_per_slot, vec![1550]);
        assert_eq!(plan.preferred_slots, vec![4]);
        assert_eq!(plan.period_index(1, Period::Slot(2)), 6);
    }

    #[test]
    fn shift_mode_aggregates_demand_per_shift() {
        let rules = Rules {
            fixed_shifts: true,
            shifts_per_day: Some(2),
            ..Rules::default()
        };
        let mode = SchedulingMode::from_rules(&rules).unwrap();
        let snapshot = snapshot(rules, Availability::Shifts(vec![vec![true; 2]; 2]));
        let plan = Plan::derive(&snapshot, &mode).unwrap();
        assert_eq!(plan.periods.len(), 4);
        assert_eq!(plan.periods[1].first_slot, 2);
        assert_eq!(plan.demand[0], 300);
        assert_eq!(plan.demand[1], 750);
        assert_eq!(plan.capacity(0, 1), 2000);
    }

    #[test]
    fn fractional_rates_round_once_per_period() {
        let rules = Rules {
            slot_hours: 0.25,
            ..Rules::default()
        };
        let snapshot = Snapshot::new("bakery", Horizon::days(1, 8))
            .rules(rules)
            .role(Role::new("baker").producing(1.0))
            .employee(Employee::new("bea").role("baker").available_everywhere(1, 8))
            .demand(DemandSeries::from_slots(vec![vec![0.25; 8]]));
        let plan = Plan::derive(&snapshot, &SchedulingMode::SlotBased).unwrap();
        assert_eq!(plan.capacity(0, 0), 25);
        assert_eq!(plan.demand, vec![25; 8]);
    }
}
