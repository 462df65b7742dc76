//! Model Builder
//!
//! Translates a validated `Plan` into binary decision variables and grouped
//! linear constraints. Both scheduling modes share one entry point: the
//! variables are declared over the plan's periods (slots or shifts), the
//! common constraint families are emitted once, and only the sequencing
//! constraints differ per mode.
//!
//! # Variables
//!
//! - `x[e,p]` employee works period `p`
//! - `y[e,r,p]` employee performs role `r` in `p` (eligible roles only)
//! - `v[p]` unmet demand, `0..=demand`
//! - `c[k,p]` output of chain `k`
//! - `s[e,p]` shift-start indicator (slot mode only)
//!
//! Demand, capacity, `v` and `c` are all counted in hundredths of an item.
//!
//! # Constraint order
//!
//! 1. Availability
//! 2. Role eligibility and at most one role
//! 3. Minimum staffing
//! 4. Capacity, chain bottleneck and demand satisfaction
//! 5. Weekly hours
//! 6. Shift start and minimum shift length (slot mode)
//! 7. Maximum consecutive slots (slot mode)
//! 8. Minimum rest (both modes), one shift per day and shift length caps
//!    (fixed-shift mode)

use std::collections::BTreeMap;
use tracing::debug;

use staffplan_core::ConstraintGroup;

use crate::model::{Model, Sense, VarId};
use crate::plan::Plan;

/// Where each decision variable lives in the model
#[derive(Clone, Debug, Default)]
pub struct Layout {
    /// `work[employee][period]`
    pub work: Vec<Vec<VarId>>,
    /// `(employee, role, period)` for eligible roles only
    pub performs: BTreeMap<(usize, usize, usize), VarId>,
    /// `unmet[period]`
    pub unmet: Vec<VarId>,
    /// `chain_output[chain][period]`
    pub chain_output: Vec<Vec<VarId>>,
    /// `starts[employee][period]`, empty in fixed-shift mode
    pub starts: Vec<Vec<VarId>>,
    /// Worked slots per employee, present once the objective models hours
    pub hours: Vec<VarId>,
}

/// The model together with its variable layout
#[derive(Clone, Debug)]
pub struct ScheduleModel {
    pub model: Model,
    pub layout: Layout,
}

/// Build the scheduling model for a validated plan.
///
/// Rules were already checked by `Plan::derive`, so this never fails.
pub fn build(plan: &Plan) -> ScheduleModel {
    let mut model = Model::new();
    let layout = declare_variables(plan, &mut model);

    add_availability(plan, &layout, &mut model);
    add_role_assignment(plan, &layout, &mut model);
    add_pinned(plan, &layout, &mut model);
    add_minimum_staffing(plan, &layout, &mut model);
    add_capacity(plan, &layout, &mut model);
    add_weekly_hours(plan, &layout, &mut model);

    if plan.is_slot_based() {
        add_shift_starts(plan, &layout, &mut model);
        add_max_consecutive(plan, &layout, &mut model);
        add_slot_rest(plan, &layout, &mut model);
    } else {
        add_one_shift_per_day(plan, &layout, &mut model);
        add_shift_length_caps(plan, &layout, &mut model);
        add_shift_rest(plan, &layout, &mut model);
    }

    let stats = model.stats();
    debug!(
        mode = plan.mode.name(),
        variables = stats.variables,
        constraints = stats.constraints,
        "built scheduling model"
    );

    ScheduleModel { model, layout }
}

fn declare_variables(plan: &Plan, model: &mut Model) -> Layout {
    let snapshot = plan.snapshot;
    let mut layout = Layout::default();

    for (e, employee) in snapshot.employees.iter().enumerate() {
        let row = plan
            .periods
            .iter()
            .map(|p| model.add_binary(format!("x[{},d{},{}]", employee.id, p.day, p.period)))
            .collect();
        layout.work.push(row);

        for &r in &plan.eligible[e] {
            let role = &snapshot.roles[r].id;
            for (p, spec) in plan.periods.iter().enumerate() {
                let var = model.add_binary(format!(
                    "y[{},{role},d{},{}]",
                    employee.id, spec.day, spec.period
                ));
                layout.performs.insert((e, r, p), var);
            }
        }
    }

    layout.unmet = plan
        .periods
        .iter()
        .enumerate()
        .map(|(p, spec)| model.add_var(format!("v[d{},{}]", spec.day, spec.period), 0, plan.demand[p]))
        .collect();

    for (k, chain) in snapshot.chains.iter().enumerate() {
        let row = (0..plan.periods.len())
            .map(|p| {
                let upper = plan.chain_stages[k]
                    .iter()
                    .map(|&r| role_capacity_upper(plan, r, p))
                    .min()
                    .unwrap_or(0);
                let spec = &plan.periods[p];
                model.add_var(format!("c[{},d{},{}]", chain.id, spec.day, spec.period), 0, upper)
            })
            .collect();
        layout.chain_output.push(row);
    }

    if plan.is_slot_based() {
        layout.starts = snapshot
            .employees
            .iter()
            .map(|employee| {
                plan.periods
                    .iter()
                    .map(|p| model.add_binary(format!("s[{},d{},{}]", employee.id, p.day, p.period)))
                    .collect()
            })
            .collect();
    }

    layout
}

/// Largest capacity a role can reach in a period if every eligible employee works it
fn role_capacity_upper(plan: &Plan, role: usize, period: usize) -> i64 {
    let staff = plan.eligible.iter().filter(|roles| roles.contains(&role)).count() as i64;
    staff * plan.capacity(role, period)
}

fn role_terms<'a>(
    plan: &'a Plan,
    layout: &'a Layout,
    role: usize,
    period: usize,
) -> impl Iterator<Item = VarId> + 'a {
    (0..plan.employee_count())
        .filter_map(move |e| layout.performs.get(&(e, role, period)).copied())
}

// ============================================================================
// 1. Availability
// ============================================================================

fn add_availability(plan: &Plan, layout: &Layout, model: &mut Model) {
    let group = if plan.is_slot_based() {
        ConstraintGroup::Availability
    } else {
        ConstraintGroup::ShiftAvailability
    };
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for (p, spec) in plan.periods.iter().enumerate() {
            if !plan.is_available(e, p) {
                model.add_constraint(
                    group,
                    format!("avail[{},d{},{}]", employee.id, spec.day, spec.period),
                    [(layout.work[e][p], 1)],
                    Sense::Le,
                    0,
                );
            }
        }
    }
}

// ============================================================================
// 2. Role eligibility and at most one role
// ============================================================================

/// `sum_r y[e,r,p] == x[e,p]`: a working employee performs exactly one
/// eligible role; ineligible roles have no variable at all.
fn add_role_assignment(plan: &Plan, layout: &Layout, model: &mut Model) {
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for (p, spec) in plan.periods.iter().enumerate() {
            let roles = plan.eligible[e]
                .iter()
                .filter_map(|&r| layout.performs.get(&(e, r, p)))
                .map(|&var| (var, 1));
            model.add_constraint(
                ConstraintGroup::RoleEligibility,
                format!("one_role[{},d{},{}]", employee.id, spec.day, spec.period),
                roles.chain([(layout.work[e][p], -1)]),
                Sense::Eq,
                0,
            );
        }
    }
}

fn add_pinned(plan: &Plan, layout: &Layout, model: &mut Model) {
    let snapshot = plan.snapshot;
    for pin in &snapshot.pinned {
        let Some(e) = snapshot.employee_index(&pin.employee) else {
            continue;
        };
        let p = plan.period_index(pin.day, pin.period);
        let label = format!("pin[{},d{},{}]", pin.employee, pin.day, pin.period);
        let var = match pin.role.as_deref().and_then(|r| snapshot.role_index(r)) {
            Some(r) => layout.performs.get(&(e, r, p)).copied(),
            None => Some(layout.work[e][p]),
        };
        match var {
            Some(var) => model.add_constraint(ConstraintGroup::Pinned, label, [(var, 1)], Sense::Eq, 1),
            // Pinned to a role the employee cannot perform
            None => model.add_constraint(
                ConstraintGroup::Pinned,
                label,
                Vec::<(VarId, i64)>::new(),
                Sense::Eq,
                1,
            ),
        }
    }
}

// ============================================================================
// 3. Minimum staffing
// ============================================================================

fn add_minimum_staffing(plan: &Plan, layout: &Layout, model: &mut Model) {
    for (r, role) in plan.snapshot.roles.iter().enumerate() {
        if role.min_present == 0 {
            continue;
        }
        for (p, spec) in plan.periods.iter().enumerate() {
            model.add_constraint(
                ConstraintGroup::MinimumStaffing,
                format!("staff[{},d{},{}]", role.id, spec.day, spec.period),
                role_terms(plan, layout, r, p).map(|var| (var, 1)),
                Sense::Ge,
                i64::from(role.min_present),
            );
        }
    }
}

// ============================================================================
// 4. Capacity and demand satisfaction
// ============================================================================

/// Every quantity is in hundredths of an item; the extra factor of 100
/// keeps fractional chain contribution factors integral:
///
/// `100 * independent + sum_k pct_k * c[k,p] + 100 * v[p] >= 100 * demand[p]`
///
/// with `c[k,p] <= capacity(stage, p)` for every stage of chain `k`.
fn add_capacity(plan: &Plan, layout: &Layout, model: &mut Model) {
    let snapshot = plan.snapshot;

    for (k, chain) in snapshot.chains.iter().enumerate() {
        for (p, spec) in plan.periods.iter().enumerate() {
            for &r in &plan.chain_stages[k] {
                let capacity = plan.capacity(r, p);
                let stage = role_terms(plan, layout, r, p).map(|var| (var, -capacity));
                model.add_constraint(
                    ConstraintGroup::Capacity,
                    format!(
                        "bottleneck[{},{},d{},{}]",
                        chain.id, snapshot.roles[r].id, spec.day, spec.period
                    ),
                    stage.chain([(layout.chain_output[k][p], 1)]),
                    Sense::Le,
                    0,
                );
            }
        }
    }

    for (p, spec) in plan.periods.iter().enumerate() {
        let demand = plan.demand[p];
        if demand == 0 {
            continue;
        }
        let mut terms: Vec<(VarId, i64)> = Vec::new();
        for r in plan.independent_roles() {
            let capacity = plan.capacity(r, p);
            if capacity > 0 {
                terms.extend(role_terms(plan, layout, r, p).map(|var| (var, 100 * capacity)));
            }
        }
        for (k, pct) in plan.contribution_pct.iter().enumerate() {
            if *pct > 0 {
                terms.push((layout.chain_output[k][p], *pct));
            }
        }
        terms.push((layout.unmet[p], 100));
        model.add_constraint(
            ConstraintGroup::Capacity,
            format!("demand[d{},{}]", spec.day, spec.period),
            terms,
            Sense::Ge,
            100 * demand,
        );

        if snapshot.rules.meet_all_demand {
            model.add_constraint(
                ConstraintGroup::DemandCoverage,
                format!("cover[d{},{}]", spec.day, spec.period),
                [(layout.unmet[p], 1)],
                Sense::Le,
                0,
            );
        }
    }
}

// ============================================================================
// 5. Weekly hours
// ============================================================================

/// Weekly caps apply to every 7-day block; the weekly minimum only to
/// complete weeks.
fn add_weekly_hours(plan: &Plan, layout: &Layout, model: &mut Model) {
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for (w, days) in plan.weeks.iter().enumerate() {
            let terms: Vec<(VarId, i64)> = plan
                .periods_in_week(w)
                .map(|p| (layout.work[e][p], plan.periods[p].slots as i64))
                .collect();
            model.add_constraint(
                ConstraintGroup::WeeklyHours,
                format!("weekly_max[{},w{w}]", employee.id),
                terms.clone(),
                Sense::Le,
                plan.weekly_max_slots[e] as i64,
            );
            if plan.weekly_min_slots > 0 && days.len() == 7 {
                model.add_constraint(
                    ConstraintGroup::WeeklyHours,
                    format!("weekly_min[{},w{w}]", employee.id),
                    terms,
                    Sense::Ge,
                    plan.weekly_min_slots as i64,
                );
            }
        }
    }
}

// ============================================================================
// 6-8. Slot sequencing
// ============================================================================

/// Start indicator and minimum shift length.
///
/// `s[t] = 1` exactly when `x[t] = 1` and `t` opens a day or `x[t-1] = 0`;
/// the overnight closure always ends a run. A started shift must cover `L`
/// slots: `sum(x[t..t+L]) >= L * s[t]`, with the window truncated at the end
/// of the day.
fn add_shift_starts(plan: &Plan, layout: &Layout, model: &mut Model) {
    let total = plan.periods.len();
    let per_day = plan.periods_per_day;
    let length = plan.min_shift_slots;

    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        let x = &layout.work[e];
        let s = &layout.starts[e];
        for t in 0..total {
            let label = |kind: &str| format!("{kind}[{},t{t}]", employee.id);
            if t % per_day == 0 {
                model.add_constraint(
                    ConstraintGroup::ShiftStart,
                    label("start_open"),
                    [(s[t], 1), (x[t], -1)],
                    Sense::Eq,
                    0,
                );
            } else {
                model.add_constraint(
                    ConstraintGroup::ShiftStart,
                    label("start_lb"),
                    [(s[t], 1), (x[t], -1), (x[t - 1], 1)],
                    Sense::Ge,
                    0,
                );
                model.add_constraint(
                    ConstraintGroup::ShiftStart,
                    label("start_on"),
                    [(s[t], 1), (x[t], -1)],
                    Sense::Le,
                    0,
                );
                model.add_constraint(
                    ConstraintGroup::ShiftStart,
                    label("start_idle"),
                    [(s[t], 1), (x[t - 1], 1)],
                    Sense::Le,
                    1,
                );
            }

            if length > 1 {
                let day_end = (t / per_day + 1) * per_day;
                let end = (t + length).min(day_end);
                let window = (t..end).map(|i| (x[i], 1));
                model.add_constraint(
                    ConstraintGroup::ConsecutiveSlots,
                    label("min_shift"),
                    window.chain([(s[t], -((end - t) as i64))]),
                    Sense::Ge,
                    0,
                );
            }
        }
    }
}

/// Any window of `max + 1` slots within one day holds at most `max` worked slots
fn add_max_consecutive(plan: &Plan, layout: &Layout, model: &mut Model) {
    let per_day = plan.periods_per_day;
    if per_day == 0 {
        return;
    }
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        let max = plan.max_consecutive[e];
        if max + 1 > per_day {
            continue;
        }
        for day_start in (0..plan.periods.len()).step_by(per_day) {
            for t in day_start..=(day_start + per_day - max - 1) {
                model.add_constraint(
                    ConstraintGroup::ConsecutiveSlots,
                    format!("max_consec[{},t{t}]", employee.id),
                    (t..=t + max).map(|i| (layout.work[e][i], 1)),
                    Sense::Le,
                    max as i64,
                );
            }
        }
    }
}

/// A shift starting at `t` needs the `R` preceding slots idle:
/// `R * s[t] + sum(x[t-R..t]) <= R`. Unlike run length, rest looks back
/// over the day boundary: the last slot of one day and the first slot of the
/// next count as adjacent.
fn add_slot_rest(plan: &Plan, layout: &Layout, model: &mut Model) {
    let rest = plan.min_rest_slots;
    if rest == 0 {
        return;
    }
    let total = plan.periods.len();
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for t in 1..total {
            let lookback = rest.min(t);
            let previous = (1..=lookback).map(|k| (layout.work[e][t - k], 1));
            model.add_constraint(
                ConstraintGroup::MinimumRest,
                format!("rest[{},t{t}]", employee.id),
                previous.chain([(layout.starts[e][t], rest as i64)]),
                Sense::Le,
                rest as i64,
            );
        }
    }
}

// ============================================================================
// Fixed-shift sequencing
// ============================================================================

fn add_one_shift_per_day(plan: &Plan, layout: &Layout, model: &mut Model) {
    let per_day = plan.periods_per_day;
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for day in 0..plan.snapshot.horizon.days {
            model.add_constraint(
                ConstraintGroup::OneShiftPerDay,
                format!("one_shift[{},d{day}]", employee.id),
                (day * per_day..(day + 1) * per_day).map(|p| (layout.work[e][p], 1)),
                Sense::Le,
                1,
            );
        }
    }
}

/// A whole shift is one run, so it may not exceed the employee's own cap
fn add_shift_length_caps(plan: &Plan, layout: &Layout, model: &mut Model) {
    for (e, employee) in plan.snapshot.employees.iter().enumerate() {
        for (p, spec) in plan.periods.iter().enumerate() {
            if spec.slots > plan.max_consecutive[e] {
                model.add_constraint(
                    ConstraintGroup::ConsecutiveSlots,
                    format!("shift_length[{},d{},{}]", employee.id, spec.day, spec.period),
                    [(layout.work[e][p], 1)],
                    Sense::Le,
                    0,
                );
            }
        }
    }
}

/// Shifts on different days closer than the rest requirement exclude each other
fn add_shift_rest(plan: &Plan, layout: &Layout, model: &mut Model) {
    let rest = plan.min_rest_slots;
    if rest == 0 {
        return;
    }
    for (p, q) in conflicting_shift_pairs(plan) {
        for (e, employee) in plan.snapshot.employees.iter().enumerate() {
            model.add_constraint(
                ConstraintGroup::MinimumRest,
                format!("shift_rest[{},p{p},p{q}]", employee.id),
                [(layout.work[e][p], 1), (layout.work[e][q], 1)],
                Sense::Le,
                1,
            );
        }
    }
}

/// Pairs of shifts on different days separated by fewer than the rest slots
pub(crate) fn conflicting_shift_pairs(plan: &Plan) -> Vec<(usize, usize)> {
    let per_day = plan.slots_per_day();
    let rest = plan.min_rest_slots;
    let mut pairs = Vec::new();
    for (p, first) in plan.periods.iter().enumerate() {
        for (q, second) in plan.periods.iter().enumerate().skip(p + 1) {
            if second.day == first.day {
                continue;
            }
            let end = first.global_end(per_day);
            let start = second.global_start(per_day);
            if start < end + rest {
                pairs.push((p, q));
            }
        }
    }
    pairs
}
