//! Schedule Decoder
//!
//! Turns raw variable values into `Assignment` records and recomputes every
//! realized quantity (supply, chain output, unmet demand, hours, cost) from
//! the assignments alone. The recomputation doubles as an independent audit:
//! any hard rule the assignments break, or any place the solver's own
//! bookkeeping claims more than the assignments deliver, is reported as an
//! `Inconsistency` instead of being passed on.
//!
//! Decoding is a pure function of `(plan, layout, values)`.

use rust_decimal::Decimal;
use tracing::error;

use staffplan_core::{
    Assignment, ChainOutput, ConstraintGroup, EmployeeHours, Inconsistency, ScheduleMetrics,
    UnmetDemand,
};

use crate::builder::{conflicting_shift_pairs, Layout};
use crate::plan::Plan;

/// Assignments plus the metrics realized by them
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    /// Ordered by employee, day, period
    pub assignments: Vec<Assignment>,
    pub metrics: ScheduleMetrics,
}

/// Role worked by each employee in each period, `None` when idle
pub(crate) type Roster = Vec<Vec<Option<usize>>>;

/// Decode and audit a solution
pub fn decode(plan: &Plan, layout: &Layout, values: &[i64]) -> Result<Decoded, Inconsistency> {
    let roster = read_roster(plan, layout, values)?;

    if let Some(violation) = audit(plan, &roster).into_iter().next() {
        error!(%violation, "decoded schedule breaks a hard constraint");
        return Err(violation);
    }

    let realized = Realized::compute(plan, &roster);
    if let Err(violation) = check_bookkeeping(plan, layout, values, &realized) {
        error!(%violation, "solver bookkeeping disagrees with the assignments");
        return Err(violation);
    }

    Ok(Decoded {
        assignments: assignments(plan, &roster),
        metrics: realized.metrics(plan, &roster),
    })
}

/// Read `x`/`y` into a roster, checking that a working employee performs
/// exactly one role
pub(crate) fn read_roster(
    plan: &Plan,
    layout: &Layout,
    values: &[i64],
) -> Result<Roster, Inconsistency> {
    let mut roster = vec![vec![None; plan.periods.len()]; plan.employee_count()];
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for (p, spec) in plan.periods.iter().enumerate() {
            let works = values[layout.work[e][p].index()] > 0;
            let roles: Vec<usize> = plan.eligible[e]
                .iter()
                .copied()
                .filter(|&r| {
                    layout
                        .performs
                        .get(&(e, r, p))
                        .is_some_and(|var| values[var.index()] > 0)
                })
                .collect();
            match (works, roles.as_slice()) {
                (false, []) => {}
                (true, [role]) => roster[e][p] = Some(*role),
                _ => {
                    return Err(Inconsistency {
                        group: ConstraintGroup::RoleEligibility,
                        entity: employee.id.clone(),
                        detail: format!(
                            "day {} {}: works = {works} but performs {} roles",
                            spec.day,
                            spec.period,
                            roles.len()
                        ),
                    })
                }
            }
        }
    }
    Ok(roster)
}

pub(crate) fn assignments(plan: &Plan, roster: &Roster) -> Vec<Assignment> {
    let snapshot = plan.snapshot;
    let slot_hours = plan.slot_hours();
    let mut out: Vec<Assignment> = roster
        .iter()
        .enumerate()
        .flat_map(|(e, row)| {
            row.iter().enumerate().filter_map(move |(p, role)| {
                let role = (*role)?;
                let spec = &plan.periods[p];
                let horizon = &snapshot.horizon;
                Some(Assignment {
                    employee: snapshot.employees[e].id.clone(),
                    role: snapshot.roles[role].id.clone(),
                    day: spec.day,
                    period: spec.period,
                    start: horizon.slot_start(spec.day, spec.first_slot, slot_hours),
                    end: horizon.slot_start(spec.day, spec.first_slot + spec.slots, slot_hours),
                })
            })
        })
        .collect();
    out.sort_by(|a, b| {
        (&a.employee, a.day, a.period, &a.role).cmp(&(&b.employee, b.day, b.period, &b.role))
    });
    out
}

// ============================================================================
// Audit
// ============================================================================

fn violation(group: ConstraintGroup, entity: impl Into<String>, detail: String) -> Inconsistency {
    Inconsistency {
        group,
        entity: entity.into(),
        detail,
    }
}

/// Every hard rule the roster breaks, in constraint order
pub(crate) fn audit(plan: &Plan, roster: &Roster) -> Vec<Inconsistency> {
    let mut found = Vec::new();
    audit_availability(plan, roster, &mut found);
    audit_pins(plan, roster, &mut found);
    audit_staffing(plan, roster, &mut found);
    audit_weekly(plan, roster, &mut found);
    if plan.is_slot_based() {
        audit_runs(plan, roster, &mut found);
    } else {
        audit_shifts(plan, roster, &mut found);
    }
    found
}

fn audit_availability(plan: &Plan, roster: &Roster, found: &mut Vec<Inconsistency>) {
    let group = if plan.is_slot_based() {
        ConstraintGroup::Availability
    } else {
        ConstraintGroup::ShiftAvailability
    };
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for (p, role) in roster[e].iter().enumerate() {
            let Some(role) = *role else { continue };
            let spec = &plan.periods[p];
            if !plan.is_available(e, p) {
                found.push(violation(
                    group,
                    &employee.id,
                    format!("assigned while unavailable on day {} {}", spec.day, spec.period),
                ));
            }
            if !plan.eligible[e].contains(&role) {
                found.push(violation(
                    ConstraintGroup::RoleEligibility,
                    &employee.id,
                    format!("not eligible for '{}'", plan.snapshot.roles[role].id),
                ));
            }
        }
    }
}

fn audit_pins(plan: &Plan, roster: &Roster, found: &mut Vec<Inconsistency>) {
    let snapshot = plan.snapshot;
    for pin in &snapshot.pinned {
        let Some(e) = snapshot.employee_index(&pin.employee) else {
            continue;
        };
        let p = plan.period_index(pin.day, pin.period);
        let worked = roster[e][p];
        let honoured = match pin.role.as_deref() {
            Some(role) => worked.is_some_and(|r| snapshot.roles[r].id == role),
            None => worked.is_some(),
        };
        if !honoured {
            found.push(violation(
                ConstraintGroup::Pinned,
                &pin.employee,
                format!("pinned to day {} {} but not assigned", pin.day, pin.period),
            ));
        }
    }
}

fn audit_staffing(plan: &Plan, roster: &Roster, found: &mut Vec<Inconsistency>) {
    for (r, role) in plan.snapshot.roles.iter().enumerate() {
        if role.min_present == 0 {
            continue;
        }
        for (p, spec) in plan.periods.iter().enumerate() {
            let present = role_count(roster, r, p);
            if present < role.min_present as usize {
                found.push(violation(
                    ConstraintGroup::MinimumStaffing,
                    &role.id,
                    format!(
                        "{present} present on day {} {}, minimum {}",
                        spec.day, spec.period, role.min_present
                    ),
                ));
            }
        }
    }
}

fn audit_weekly(plan: &Plan, roster: &Roster, found: &mut Vec<Inconsistency>) {
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for (w, days) in plan.weeks.iter().enumerate() {
            let slots: usize = plan
                .periods_in_week(w)
                .filter(|&p| roster[e][p].is_some())
                .map(|p| plan.periods[p].slots)
                .sum();
            if slots > plan.weekly_max_slots[e] {
                found.push(violation(
                    ConstraintGroup::WeeklyHours,
                    &employee.id,
                    format!(
                        "week {w}: {slots} slots exceed the cap of {}",
                        plan.weekly_max_slots[e]
                    ),
                ));
            }
            if days.len() == 7 && slots < plan.weekly_min_slots {
                found.push(violation(
                    ConstraintGroup::WeeklyHours,
                    &employee.id,
                    format!(
                        "week {w}: {slots} slots below the minimum of {}",
                        plan.weekly_min_slots
                    ),
                ));
            }
        }
    }
}

/// Maximal runs of worked slots on the global timeline, as `start..end`.
/// A run never continues past the end of its day.
fn runs(row: &[Option<usize>], per_day: usize) -> Vec<std::ops::Range<usize>> {
    let mut out = Vec::new();
    let mut start = None;
    for (t, cell) in row.iter().enumerate() {
        if t % per_day == 0 {
            if let Some(s) = start.take() {
                out.push(s..t);
            }
        }
        match (cell.is_some(), start) {
            (true, None) => start = Some(t),
            (false, Some(s)) => {
                out.push(s..t);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push(s..row.len());
    }
    out
}

fn audit_runs(plan: &Plan, roster: &Roster, found: &mut Vec<Inconsistency>) {
    let per_day = plan.periods_per_day;
    let rest = plan.min_rest_slots;
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        let runs = runs(&roster[e], per_day);
        for run in &runs {
            let max = plan.max_consecutive[e];
            if run.len() > max {
                found.push(violation(
                    ConstraintGroup::ConsecutiveSlots,
                    &employee.id,
                    format!("{} consecutive slots from t{}, maximum {max}", run.len(), run.start),
                ));
            }
            let day_end = (run.start / per_day + 1) * per_day;
            let required = plan.min_shift_slots.min(day_end - run.start);
            if run.len() < required {
                found.push(violation(
                    ConstraintGroup::ConsecutiveSlots,
                    &employee.id,
                    format!(
                        "shift of {} slots from t{}, minimum {}",
                        run.len(),
                        run.start,
                        plan.min_shift_slots
                    ),
                ));
            }
        }
        for pair in runs.windows(2) {
            let gap = pair[1].start - pair[0].end;
            if gap < rest {
                found.push(violation(
                    ConstraintGroup::MinimumRest,
                    &employee.id,
                    format!("{gap} idle slots before t{}, minimum {rest}", pair[1].start),
                ));
            }
        }
    }
}

fn audit_shifts(plan: &Plan, roster: &Roster, found: &mut Vec<Inconsistency>) {
    let per_day = plan.periods_per_day;
    let conflicts = if plan.min_rest_slots > 0 {
        conflicting_shift_pairs(plan)
    } else {
        Vec::new()
    };
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        let row = &roster[e];
        for (p, spec) in plan.periods.iter().enumerate() {
            if row[p].is_some() && spec.slots > plan.max_consecutive[e] {
                found.push(violation(
                    ConstraintGroup::ConsecutiveSlots,
                    &employee.id,
                    format!(
                        "{} slots on day {} {}, maximum {}",
                        spec.slots, spec.day, spec.period, plan.max_consecutive[e]
                    ),
                ));
            }
        }
        for day in 0..plan.snapshot.horizon.days {
            let shifts = row[day * per_day..(day + 1) * per_day]
                .iter()
                .filter(|r| r.is_some())
                .count();
            if shifts > 1 {
                found.push(violation(
                    ConstraintGroup::OneShiftPerDay,
                    &employee.id,
                    format!("{shifts} shifts on day {day}"),
                ));
            }
        }
        for &(p, q) in &conflicts {
            if row[p].is_some() && row[q].is_some() {
                let (a, b) = (&plan.periods[p], &plan.periods[q]);
                found.push(violation(
                    ConstraintGroup::MinimumRest,
                    &employee.id,
                    format!(
                        "day {} {} and day {} {} leave less than {} slots of rest",
                        a.day, a.period, b.day, b.period, plan.min_rest_slots
                    ),
                ));
            }
        }
    }
}

fn role_count(roster: &Roster, role: usize, period: usize) -> usize {
    roster.iter().filter(|row| row[period] == Some(role)).count()
}

// ============================================================================
// Realized quantities
// ============================================================================

/// Supply and chain output recomputed from the roster
pub(crate) struct Realized {
    /// Supply per period in ten-thousandths of an item: hundredths, scaled
    /// once more by the chain contribution percentage
    pub supply: Vec<i64>,
    /// Unmet demand per period in hundredths, rounded up
    pub unmet: Vec<i64>,
    /// `chain_output[chain][period]` in hundredths, with its bottleneck role
    pub chain_output: Vec<Vec<(i64, usize)>>,
    /// Worked slots per employee
    pub slots: Vec<usize>,
}

impl Realized {
    pub(crate) fn compute(plan: &Plan, roster: &Roster) -> Self {
        let periods = plan.periods.len();
        let independent = plan.independent_roles();

        let chain_output: Vec<Vec<(i64, usize)>> = plan
            .chain_stages
            .iter()
            .map(|stages| {
                (0..periods)
                    .map(|p| {
                        stages
                            .iter()
                            .map(|&r| (role_count(roster, r, p) as i64 * plan.capacity(r, p), r))
                            // earliest stage wins ties
                            .min_by_key(|&(capacity, _)| capacity)
                            .unwrap_or((0, 0))
                    })
                    .collect()
            })
            .collect();

        let supply: Vec<i64> = (0..periods)
            .map(|p| {
                let direct: i64 = independent
                    .iter()
                    .map(|&r| role_count(roster, r, p) as i64 * plan.capacity(r, p))
                    .sum();
                let chained: i64 = plan
                    .contribution_pct
                    .iter()
                    .zip(&chain_output)
                    .map(|(pct, row)| pct * row[p].0)
                    .sum();
                100 * direct + chained
            })
            .collect();

        let unmet = supply
            .iter()
            .zip(&plan.demand)
            .map(|(&supply, &demand)| {
                let short = (100 * demand - supply).max(0);
                (short + 99) / 100
            })
            .collect();

        let slots = roster
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&plan.periods)
                    .filter(|(cell, _)| cell.is_some())
                    .map(|(_, spec)| spec.slots)
                    .sum()
            })
            .collect();

        Self {
            supply,
            unmet,
            chain_output,
            slots,
        }
    }

    fn metrics(&self, plan: &Plan, roster: &Roster) -> ScheduleMetrics {
        let snapshot = plan.snapshot;
        let slot_hours = plan.slot_hours();
        let weeks = snapshot.horizon.days as f64 / 7.0;

        let periods: Vec<UnmetDemand> = plan
            .periods
            .iter()
            .enumerate()
            .map(|(p, spec)| UnmetDemand {
                day: spec.day,
                period: spec.period,
                demand: items(plan.demand[p]),
                supply: self.supply[p] as f64 / 10_000.0,
                unmet: items(self.unmet[p]),
            })
            .collect();

        let employees: Vec<EmployeeHours> = snapshot
            .employees
            .iter()
            .enumerate()
            .map(|(e, employee)| {
                let slots = self.slots[e];
                let cents = plan.wage_cents_per_slot[e] * slots as i64;
                EmployeeHours {
                    employee: employee.id.clone(),
                    hours: slots as f64 * slot_hours,
                    preferred_hours: employee.preferred_hours_week * weeks,
                    cost: Decimal::new(cents, 2),
                    preferred_periods_worked: (0..plan.periods.len())
                        .filter(|&p| roster[e][p].is_some() && plan.prefers(e, p))
                        .count(),
                }
            })
            .collect();

        let mut chains = Vec::new();
        for (k, chain) in snapshot.chains.iter().enumerate() {
            for (p, spec) in plan.periods.iter().enumerate() {
                let staffed = plan.chain_stages[k]
                    .iter()
                    .any(|&r| role_count(roster, r, p) > 0);
                if !staffed {
                    continue;
                }
                let (output, bottleneck) = self.chain_output[k][p];
                chains.push(ChainOutput {
                    chain: chain.id.clone(),
                    day: spec.day,
                    period: spec.period,
                    output: items(output),
                    bottleneck: snapshot.roles[bottleneck].id.clone(),
                });
            }
        }

        let count = employees.len().max(1) as f64;
        let average_hours = employees.iter().map(|h| h.hours).sum::<f64>() / count;
        let fairness_spread_hours = employees
            .iter()
            .map(|h| (h.hours - average_hours).abs())
            .fold(0.0, f64::max);

        ScheduleMetrics {
            total_demand: items(plan.demand.iter().sum()),
            total_unmet: items(self.unmet.iter().sum()),
            total_cost: employees.iter().map(|h| h.cost).sum(),
            average_hours,
            fairness_spread_hours,
            periods,
            employees,
            chains,
        }
    }
}

/// Hundredths of an item as items
fn items(hundredths: i64) -> f64 {
    hundredths as f64 / 100.0
}

/// Compare the solver's auxiliary variables against the realized figures
fn check_bookkeeping(
    plan: &Plan,
    layout: &Layout,
    values: &[i64],
    realized: &Realized,
) -> Result<(), Inconsistency> {
    for (p, spec) in plan.periods.iter().enumerate() {
        let claimed = values[layout.unmet[p].index()];
        if realized.unmet[p] > claimed {
            return Err(violation(
                ConstraintGroup::Capacity,
                format!("day {} {}", spec.day, spec.period),
                format!(
                    "realized unmet demand of {} hundredths exceeds the solver's {claimed}",
                    realized.unmet[p]
                ),
            ));
        }
    }

    for (k, chain) in plan.snapshot.chains.iter().enumerate() {
        for (p, spec) in plan.periods.iter().enumerate() {
            let claimed = values[layout.chain_output[k][p].index()];
            let (bound, bottleneck) = realized.chain_output[k][p];
            if claimed > bound {
                return Err(violation(
                    ConstraintGroup::Capacity,
                    &chain.id,
                    format!(
                        "output {claimed} on day {} {} exceeds stage '{}' capacity {bound}",
                        spec.day, spec.period, plan.snapshot.roles[bottleneck].id
                    ),
                ));
            }
        }
    }

    for (e, &var) in layout.hours.iter().enumerate() {
        let claimed = values[var.index()];
        if claimed != realized.slots[e] as i64 {
            return Err(violation(
                ConstraintGroup::Linearization,
                &plan.snapshot.employees[e].id,
                format!("solver counts {claimed} slots, assignments give {}", realized.slots[e]),
            ));
        }
    }
    Ok(())
}
