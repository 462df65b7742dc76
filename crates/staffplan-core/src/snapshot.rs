//! Input snapshot: the immutable view of one organization's planning horizon.
//!
//! A `Snapshot` is captured once per solve. Nothing in the engine re-reads the
//! underlying data while a solve is running, so it is safe to share a snapshot
//! between threads behind an `Arc`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{
    ChainId, DemandSeries, EmployeeId, Period, RoleId, RulesError, SchedulingMode, HOURS_EPSILON,
};

// ============================================================================
// Availability
// ============================================================================

/// Shape of a per-day availability or preference grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridForm {
    /// One entry per slot of the day
    Slots,
    /// One entry per fixed shift of the day
    Shifts,
}

impl std::fmt::Display for GridForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slots => f.write_str("slot-level"),
            Self::Shifts => f.write_str("shift-level"),
        }
    }
}

/// Per-day boolean grid, either slot-level or shift-level.
///
/// The form must match the scheduling mode: slot-based scheduling needs
/// `Slots`, fixed-shift scheduling needs `Shifts`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", content = "grid", rename_all = "snake_case")]
pub enum Availability {
    Slots(Vec<Vec<bool>>),
    Shifts(Vec<Vec<bool>>),
}

impl Availability {
    pub fn form(&self) -> GridForm {
        match self {
            Self::Slots(_) => GridForm::Slots,
            Self::Shifts(_) => GridForm::Shifts,
        }
    }

    pub fn grid(&self) -> &[Vec<bool>] {
        match self {
            Self::Slots(grid) | Self::Shifts(grid) => grid,
        }
    }

    /// Bit for `(day, index)`; out-of-range entries read as unavailable
    pub fn get(&self, day: usize, index: usize) -> bool {
        self.grid()
            .get(day)
            .and_then(|row| row.get(index))
            .copied()
            .unwrap_or(false)
    }

    fn shape(&self) -> (usize, usize) {
        let grid = self.grid();
        let width = grid.first().map(Vec::len).unwrap_or(0);
        if grid.iter().any(|row| row.len() != width) {
            return (grid.len(), usize::MAX);
        }
        (grid.len(), width)
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::Slots(Vec::new())
    }
}

// ============================================================================
// Employee
// ============================================================================

/// A schedulable employee. Immutable for the duration of one solve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    /// Display name (defaults to the id)
    #[serde(default)]
    pub name: String,
    /// Roles this employee may perform
    pub roles: Vec<RoleId>,
    pub availability: Availability,
    /// Preferred periods; same form as availability
    #[serde(default)]
    pub preferences: Option<Availability>,
    pub max_hours_week: f64,
    /// Personal cap on consecutive slots, tighter than the organization rule
    #[serde(default)]
    pub max_consecutive_slots: Option<usize>,
    pub hourly_wage: Decimal,
    #[serde(default)]
    pub preferred_hours_week: f64,
}

impl Employee {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            roles: Vec::new(),
            availability: Availability::default(),
            preferences: None,
            max_hours_week: 40.0,
            max_consecutive_slots: None,
            hourly_wage: Decimal::ZERO,
            preferred_hours_week: 0.0,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Slot-level availability for every slot of the horizon
    pub fn available_everywhere(mut self, days: usize, slots_per_day: usize) -> Self {
        self.availability = Availability::Slots(vec![vec![true; slots_per_day]; days]);
        self
    }

    pub fn preferences(mut self, preferences: Availability) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn max_hours(mut self, hours: f64) -> Self {
        self.max_hours_week = hours;
        self
    }

    pub fn max_consecutive(mut self, slots: usize) -> Self {
        self.max_consecutive_slots = Some(slots);
        self
    }

    pub fn wage(mut self, hourly: Decimal) -> Self {
        self.hourly_wage = hourly;
        self
    }

    pub fn preferred_hours(mut self, hours: f64) -> Self {
        self.preferred_hours_week = hours;
        self
    }

    pub fn is_eligible(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn prefers(&self, day: usize, index: usize) -> bool {
        self.preferences
            .as_ref()
            .map(|p| p.get(day, index))
            .unwrap_or(false)
    }
}

// ============================================================================
// Roles and Production Chains
// ============================================================================

/// A role employees can perform
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    /// Whether the role produces items at all
    #[serde(default)]
    pub producing: bool,
    /// Items produced per hour by one employee (producing roles only)
    #[serde(default)]
    pub items_per_hour: f64,
    /// Minimum employees in this role during every period
    #[serde(default)]
    pub min_present: u32,
    /// Independent roles add to supply directly; chained roles only through their chain
    #[serde(default = "default_true")]
    pub independent: bool,
}

fn default_true() -> bool {
    true
}

impl Role {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            producing: false,
            items_per_hour: 0.0,
            min_present: 0,
            independent: true,
        }
    }

    pub fn producing(mut self, items_per_hour: f64) -> Self {
        self.producing = true;
        self.items_per_hour = items_per_hour;
        self
    }

    pub fn min_present(mut self, count: u32) -> Self {
        self.min_present = count;
        self
    }

    /// Mark the role as a production-chain stage rather than an independent producer
    pub fn chained(mut self) -> Self {
        self.independent = false;
        self
    }

    /// Items one employee produces over `hours`, in hundredths of an item
    pub fn capacity_hundredths(&self, hours: f64) -> i64 {
        if self.producing {
            (self.items_per_hour * hours * 100.0).round() as i64
        } else {
            0
        }
    }
}

/// Ordered list of roles whose throughput is bounded by the slowest stage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductionChain {
    pub id: ChainId,
    pub stages: Vec<RoleId>,
    /// Items of supply contributed per unit of chain output
    #[serde(default = "default_contribution")]
    pub contribution: f64,
}

fn default_contribution() -> f64 {
    1.0
}

impl ProductionChain {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stages: Vec::new(),
            contribution: 1.0,
        }
    }

    pub fn stage(mut self, role: impl Into<String>) -> Self {
        self.stages.push(role.into());
        self
    }

    pub fn contribution(mut self, factor: f64) -> Self {
        self.contribution = factor;
        self
    }

    /// Contribution expressed in hundredths, the unit the model works in
    pub fn contribution_pct(&self) -> i64 {
        (self.contribution * 100.0).round() as i64
    }
}

// ============================================================================
// Organization Rules
// ============================================================================

/// Organization-wide labor rules
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Length of one slot in hours
    pub slot_hours: f64,
    pub shift_min_hours: f64,
    pub shift_max_hours: f64,
    pub weekly_min_hours: f64,
    pub weekly_max_hours: f64,
    /// Idle slots required between two working periods
    pub min_rest_slots: usize,
    pub min_consecutive_slots: usize,
    pub max_consecutive_slots: usize,
    pub fixed_shifts: bool,
    pub shifts_per_day: Option<usize>,
    /// Treat demand as a hard requirement instead of a penalized shortfall
    pub meet_all_demand: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            slot_hours: 1.0,
            shift_min_hours: 1.0,
            shift_max_hours: 8.0,
            weekly_min_hours: 0.0,
            weekly_max_hours: 40.0,
            min_rest_slots: 0,
            min_consecutive_slots: 1,
            max_consecutive_slots: 8,
            fixed_shifts: false,
            shifts_per_day: None,
            meet_all_demand: false,
        }
    }
}

impl Rules {
    /// Whole slots covered by `hours`, rounding down
    pub fn slots_floor(&self, hours: f64) -> usize {
        ((hours / self.slot_hours) + HOURS_EPSILON).floor().max(0.0) as usize
    }

    /// Whole slots covering `hours`, rounding up
    pub fn slots_ceil(&self, hours: f64) -> usize {
        ((hours / self.slot_hours) - HOURS_EPSILON).ceil().max(0.0) as usize
    }

    /// Minimum length of a working period in slots
    pub fn min_shift_slots(&self) -> usize {
        self.min_consecutive_slots
            .max(self.slots_ceil(self.shift_min_hours))
            .max(1)
    }

    /// Maximum length of a working period in slots, before personal caps
    pub fn max_shift_slots(&self) -> usize {
        self.max_consecutive_slots
            .min(self.slots_floor(self.shift_max_hours))
    }

    /// Check the rules for internal contradictions
    pub fn validate(&self) -> Result<(), RulesError> {
        if !(self.slot_hours > 0.0) || !self.slot_hours.is_finite() {
            return Err(RulesError::NonPositiveSlotLength(self.slot_hours));
        }
        if self.shift_min_hours > self.shift_max_hours {
            return Err(RulesError::ShiftBounds {
                min: self.shift_min_hours,
                max: self.shift_max_hours,
            });
        }
        if self.slots_floor(self.shift_max_hours) == 0 {
            return Err(RulesError::ShiftShorterThanSlot {
                max_hours: self.shift_max_hours,
                slot_hours: self.slot_hours,
            });
        }
        if self.weekly_min_hours > self.weekly_max_hours {
            return Err(RulesError::WeeklyBounds {
                min: self.weekly_min_hours,
                max: self.weekly_max_hours,
            });
        }
        if self.min_shift_slots() > self.max_shift_slots() {
            return Err(RulesError::ConsecutiveBounds {
                min: self.min_shift_slots(),
                max: self.max_shift_slots(),
            });
        }
        if self.fixed_shifts && !matches!(self.shifts_per_day, Some(n) if n > 0) {
            return Err(RulesError::MissingShiftCount);
        }
        Ok(())
    }
}

// ============================================================================
// Horizon
// ============================================================================

/// The planning horizon: consecutive days, each with the same operating window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: NaiveDate,
    pub days: usize,
    /// Opening time of each day; slot 0 starts here
    pub open: NaiveTime,
    pub slots_per_day: usize,
}

impl Horizon {
    pub fn new(start: NaiveDate, days: usize, open: NaiveTime, slots_per_day: usize) -> Self {
        Self {
            start,
            days,
            open,
            slots_per_day,
        }
    }

    /// One day opening at midnight, starting 2025-01-06
    pub fn single_day(slots_per_day: usize) -> Self {
        Self::days(1, slots_per_day)
    }

    /// `days` days opening at midnight, starting 2025-01-06 (a Monday)
    pub fn days(days: usize, slots_per_day: usize) -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap_or_default(),
            days,
            open: NaiveTime::MIN,
            slots_per_day,
        }
    }

    pub fn total_slots(&self) -> usize {
        self.days * self.slots_per_day
    }

    pub fn date(&self, day: usize) -> NaiveDate {
        self.start + chrono::Duration::days(day as i64)
    }

    /// Start of `slot` on `day`, for slots of `slot_hours` hours
    pub fn slot_start(&self, day: usize, slot: usize, slot_hours: f64) -> NaiveDateTime {
        let minutes = (slot as f64 * slot_hours * 60.0).round() as i64;
        self.date(day).and_time(self.open) + chrono::Duration::minutes(minutes)
    }
}

// ============================================================================
// Pinned Assignments
// ============================================================================

/// A manager-locked decision the solver must honour
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedAssignment {
    pub employee: EmployeeId,
    pub day: usize,
    pub period: Period,
    #[serde(default)]
    pub role: Option<RoleId>,
}

impl PinnedAssignment {
    pub fn slot(employee: impl Into<String>, day: usize, slot: usize) -> Self {
        Self {
            employee: employee.into(),
            day,
            period: Period::Slot(slot),
            role: None,
        }
    }

    pub fn shift(employee: impl Into<String>, day: usize, shift: usize) -> Self {
        Self {
            employee: employee.into(),
            day,
            period: Period::Shift(shift),
            role: None,
        }
    }

    pub fn as_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable, consistent input for one organization and planning horizon
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub organization: String,
    pub horizon: Horizon,
    #[serde(default)]
    pub rules: Rules,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub chains: Vec<ProductionChain>,
    pub employees: Vec<Employee>,
    pub demand: DemandSeries,
    #[serde(default)]
    pub pinned: Vec<PinnedAssignment>,
}

impl Snapshot {
    pub fn new(organization: impl Into<String>, horizon: Horizon) -> Self {
        let demand = DemandSeries::zeros(horizon.days, horizon.slots_per_day);
        Self {
            organization: organization.into(),
            horizon,
            rules: Rules::default(),
            roles: Vec::new(),
            chains: Vec::new(),
            employees: Vec::new(),
            demand,
            pinned: Vec::new(),
        }
    }

    pub fn rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn chain(mut self, chain: ProductionChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn employee(mut self, employee: Employee) -> Self {
        self.employees.push(employee);
        self
    }

    pub fn demand(mut self, demand: DemandSeries) -> Self {
        self.demand = demand;
        self
    }

    pub fn pin(mut self, pin: PinnedAssignment) -> Self {
        self.pinned.push(pin);
        self
    }

    pub fn get_role(&self, id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    pub fn role_index(&self, id: &str) -> Option<usize> {
        self.roles.iter().position(|r| r.id == id)
    }

    pub fn employee_index(&self, id: &str) -> Option<usize> {
        self.employees.iter().position(|e| e.id == id)
    }

    /// Validate the snapshot against the scheduling mode.
    ///
    /// Runs before any model is built; every contradiction is reported as a
    /// `RulesError` instead of surfacing later as solver infeasibility.
    pub fn validate(&self, mode: &SchedulingMode) -> Result<(), RulesError> {
        self.rules.validate()?;
        mode.check_rules(&self.rules)?;

        let horizon = &self.horizon;
        if horizon.days == 0 || horizon.slots_per_day == 0 {
            return Err(RulesError::EmptyHorizon);
        }

        let periods_per_day = match mode {
            SchedulingMode::SlotBased => horizon.slots_per_day,
            SchedulingMode::FixedShift { .. } => mode
                .shift_templates(&self.rules, horizon.slots_per_day)?
                .len(),
        };
        let expected_form = mode.grid_form();

        check_unique("role", self.roles.iter().map(|r| r.id.as_str()))?;
        check_unique("chain", self.chains.iter().map(|c| c.id.as_str()))?;
        check_unique("employee", self.employees.iter().map(|e| e.id.as_str()))?;

        for role in &self.roles {
            if role.producing && !(role.items_per_hour > 0.0 && role.items_per_hour.is_finite()) {
                return Err(RulesError::NonPositiveRate {
                    role: role.id.clone(),
                    rate: role.items_per_hour,
                });
            }
        }

        for chain in &self.chains {
            if chain.stages.is_empty() {
                return Err(RulesError::EmptyChain(chain.id.clone()));
            }
            if !(chain.contribution >= 0.0) || !chain.contribution.is_finite() {
                return Err(RulesError::InvalidContribution {
                    chain: chain.id.clone(),
                    factor: chain.contribution,
                });
            }
            for stage in &chain.stages {
                let role = self.get_role(stage).ok_or_else(|| RulesError::UnknownRole {
                    owner: chain.id.clone(),
                    role: stage.clone(),
                })?;
                if role.independent {
                    return Err(RulesError::IndependentRoleInChain {
                        role: role.id.clone(),
                        chain: chain.id.clone(),
                    });
                }
            }
        }

        for employee in &self.employees {
            for role in &employee.roles {
                if self.get_role(role).is_none() {
                    return Err(RulesError::UnknownRole {
                        owner: employee.id.clone(),
                        role: role.clone(),
                    });
                }
            }
            if !(employee.max_hours_week >= 0.0) || !(employee.preferred_hours_week >= 0.0) {
                return Err(RulesError::EmployeeSettings {
                    employee: employee.id.clone(),
                    reason: "hours must be non-negative".into(),
                });
            }
            if employee.hourly_wage.is_sign_negative() {
                return Err(RulesError::EmployeeSettings {
                    employee: employee.id.clone(),
                    reason: "hourly wage must be non-negative".into(),
                });
            }
            check_grid(
                &employee.id,
                "availability",
                &employee.availability,
                expected_form,
                (horizon.days, periods_per_day),
            )?;
            if let Some(preferences) = &employee.preferences {
                check_grid(
                    &employee.id,
                    "preferences",
                    preferences,
                    expected_form,
                    (horizon.days, periods_per_day),
                )?;
            }
        }

        let found = self.demand.shape();
        let expected = (horizon.days, horizon.slots_per_day);
        if found != expected {
            return Err(RulesError::DemandShape { expected, found });
        }
        if let Some((day, slot)) = self.demand.first_invalid() {
            return Err(RulesError::InvalidDemand { day, slot });
        }

        for pin in &self.pinned {
            let Some(index) = self.employee_index(&pin.employee) else {
                return Err(RulesError::UnknownEmployee(pin.employee.clone()));
            };
            if pin.period.form() != expected_form {
                return Err(RulesError::PinForm {
                    employee: pin.employee.clone(),
                    expected: expected_form,
                    found: pin.period.form(),
                });
            }
            if pin.day >= horizon.days || pin.period.index() >= periods_per_day {
                return Err(RulesError::PinOutOfHorizon {
                    employee: pin.employee.clone(),
                    day: pin.day,
                    period: pin.period,
                });
            }
            if let Some(role) = &pin.role {
                if !self.employees[index].is_eligible(role) {
                    return Err(RulesError::UnknownRole {
                        owner: format!("pin for {}", pin.employee),
                        role: role.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn check_unique<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), RulesError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(RulesError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

fn check_grid(
    employee: &str,
    grid: &'static str,
    availability: &Availability,
    expected_form: GridForm,
    expected: (usize, usize),
) -> Result<(), RulesError> {
    if availability.form() != expected_form {
        return Err(RulesError::GridFormMismatch {
            employee: employee.to_string(),
            grid,
            expected: expected_form,
            found: availability.form(),
        });
    }
    let found = availability.shape();
    if found != expected {
        return Err(RulesError::GridShape {
            employee: employee.to_string(),
            grid,
            expected,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn cafe() -> Snapshot {
        Snapshot::new("cafe", Horizon::single_day(4))
            .role(Role::new("barista").producing(10.0))
            .employee(
                Employee::new("alice")
                    .role("barista")
                    .wage(dec!(15))
                    .available_everywhere(1, 4),
            )
    }

    #[test]
    fn default_snapshot_is_valid() {
        assert_eq!(cafe().validate(&SchedulingMode::SlotBased), Ok(()));
    }

    #[test]
    fn shift_min_above_max_is_rejected() {
        let mut snapshot = cafe();
        snapshot.rules.shift_min_hours = 9.0;
        snapshot.rules.shift_max_hours = 4.0;
        assert_eq!(
            snapshot.validate(&SchedulingMode::SlotBased),
            Err(RulesError::ShiftBounds { min: 9.0, max: 4.0 })
        );
    }

    #[test]
    fn fixed_shifts_without_count_is_rejected() {
        let rules = Rules {
            fixed_shifts: true,
            shifts_per_day: Some(0),
            ..Rules::default()
        };
        assert_eq!(rules.validate(), Err(RulesError::MissingShiftCount));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let snapshot = cafe().employee(
            Employee::new("bob")
                .role("baker")
                .available_everywhere(1, 4),
        );
        assert!(matches!(
            snapshot.validate(&SchedulingMode::SlotBased),
            Err(RulesError::UnknownRole { .. })
        ));
    }

    #[test]
    fn independent_role_cannot_be_a_chain_stage() {
        let snapshot = cafe().chain(ProductionChain::new("line").stage("barista"));
        assert!(matches!(
            snapshot.validate(&SchedulingMode::SlotBased),
            Err(RulesError::IndependentRoleInChain { .. })
        ));
    }

    #[test]
    fn ragged_availability_grid_is_rejected() {
        let snapshot = cafe().employee(
            Employee::new("bob")
                .role("barista")
                .availability(Availability::Slots(vec![vec![true, true]])),
        );
        assert!(matches!(
            snapshot.validate(&SchedulingMode::SlotBased),
            Err(RulesError::GridShape { .. })
        ));
    }

    #[test]
    fn pins_outside_horizon_are_rejected() {
        let snapshot = cafe().pin(PinnedAssignment::slot("alice", 0, 9));
        assert!(matches!(
            snapshot.validate(&SchedulingMode::SlotBased),
            Err(RulesError::PinOutOfHorizon { .. })
        ));
    }

    #[test]
    fn slot_rounding_uses_rule_slot_length() {
        let rules = Rules {
            slot_hours: 0.5,
            shift_min_hours: 1.25,
            ..Rules::default()
        };
        assert_eq!(rules.slots_ceil(1.25), 3);
        assert_eq!(rules.slots_floor(1.25), 2);
        assert_eq!(rules.min_shift_slots(), 3);
    }

    #[test]
    fn slot_start_times_follow_opening_time() {
        let horizon = Horizon::new(
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            2,
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            8,
        );
        let start = horizon.slot_start(1, 3, 0.5);
        assert_eq!(start.to_string(), "2025-03-04 09:30:00");
    }
}
