//! # staffplan-core
//!
//! Core domain model for the staffplan schedule optimization engine.
//!
//! This crate provides:
//! - Input snapshot types: `Employee`, `Role`, `ProductionChain`, `Rules`, `Horizon`
//! - The scheduling mode sum type: `SchedulingMode`
//! - Output types: `Schedule`, `Assignment`, metrics, insights and `Diagnosis`
//! - Engine configuration: `ObjectiveWeights`, `EngineConfig`
//! - Error types
//!
//! ## Example
//!
//! ```rust
//! use staffplan_core::{Employee, Horizon, Role, Rules, Snapshot, DemandSeries};
//!
//! let horizon = Horizon::single_day(3);
//! let snapshot = Snapshot::new("cafe", horizon)
//!     .rules(Rules::default())
//!     .role(Role::new("barista").producing(10.0))
//!     .employee(Employee::new("alice").role("barista").available_everywhere(1, 3))
//!     .demand(DemandSeries::from_slots(vec![vec![0.0, 15.0, 0.0]]));
//! assert!(snapshot.validate(&staffplan_core::SchedulingMode::SlotBased).is_ok());
//! ```

pub mod config;
pub mod demand;
pub mod mode;
pub mod schedule;
pub mod snapshot;

pub use config::{ConfigError, EngineConfig, InsightThresholds, ObjectiveWeights};
pub use demand::{CampaignContext, DemandSeries, HourlyDemand};
pub use mode::{SchedulingMode, ShiftTemplate};
pub use schedule::{
    Assignment, AvailabilityOutreach, ChainOutput, Diagnosis, EmployeeHours, HiringRecommendation,
    Insights, Period, RelaxationStep, RoleRebalancing, Schedule, ScheduleMetrics, SolveStatus,
    UnmetDemand,
};
pub use snapshot::{
    Availability, Employee, GridForm, Horizon, PinnedAssignment, ProductionChain, Role, Rules,
    Snapshot,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for an employee
pub type EmployeeId = String;

/// Unique identifier for a role
pub type RoleId = String;

/// Unique identifier for a production chain
pub type ChainId = String;

/// Tolerance used when converting hour quantities into whole slots
pub const HOURS_EPSILON: f64 = 1e-9;

// ============================================================================
// Constraint Groups
// ============================================================================

/// Named family of model constraints.
///
/// Every constraint the model builder emits is tagged with exactly one group,
/// so diagnostics can relax a family at a time and the decoder can report
/// which family a bad solution broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintGroup {
    /// Employee may only work slots they are available for
    Availability,
    /// Employee may only work shifts they are available for (fixed-shift mode)
    ShiftAvailability,
    /// Role performed must be eligible, at most one role per period
    RoleEligibility,
    /// Manager-locked assignments
    Pinned,
    /// Minimum employees present per role per period
    MinimumStaffing,
    /// Role capacity, chain bottleneck and demand satisfaction
    Capacity,
    /// Hard demand coverage when the organization requires meeting all demand
    DemandCoverage,
    /// Weekly minimum and maximum hours
    WeeklyHours,
    /// Shift-start indicator definition
    ShiftStart,
    /// Minimum shift length and maximum consecutive slots
    ConsecutiveSlots,
    /// Minimum rest between working periods
    MinimumRest,
    /// At most one shift per employee per day (fixed-shift mode)
    OneShiftPerDay,
    /// Auxiliary constraints linearizing objective terms
    Linearization,
}

impl ConstraintGroup {
    /// Human-readable name used in diagnoses and reports
    pub fn label(self) -> &'static str {
        match self {
            Self::Availability => "availability",
            Self::ShiftAvailability => "shift availability",
            Self::RoleEligibility => "role eligibility",
            Self::Pinned => "pinned assignments",
            Self::MinimumStaffing => "minimum staffing",
            Self::Capacity => "capacity",
            Self::DemandCoverage => "demand coverage",
            Self::WeeklyHours => "weekly hours",
            Self::ShiftStart => "shift start",
            Self::ConsecutiveSlots => "consecutive-slot bounds",
            Self::MinimumRest => "rest constraint",
            Self::OneShiftPerDay => "one shift per day",
            Self::Linearization => "objective linearization",
        }
    }
}

impl std::fmt::Display for ConstraintGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Contradictory or malformed configuration, detected before model construction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RulesError {
    #[error("Planning horizon is empty (days and slots per day must be positive)")]
    EmptyHorizon,

    #[error("Slot length must be positive, got {0} hours")]
    NonPositiveSlotLength(f64),

    #[error("Shift minimum ({min}h) exceeds shift maximum ({max}h)")]
    ShiftBounds { min: f64, max: f64 },

    #[error("Shift maximum ({max_hours}h) is shorter than one slot ({slot_hours}h)")]
    ShiftShorterThanSlot { max_hours: f64, slot_hours: f64 },

    #[error("Weekly minimum ({min}h) exceeds weekly maximum ({max}h)")]
    WeeklyBounds { min: f64, max: f64 },

    #[error("Minimum consecutive slots ({min}) exceed maximum consecutive slots ({max})")]
    ConsecutiveBounds { min: usize, max: usize },

    #[error("Fixed-shift mode requires a positive number of shifts per day")]
    MissingShiftCount,

    #[error("{shifts} shifts per day cannot be carved out of {slots} slots per day")]
    TooManyShifts { shifts: usize, slots: usize },

    #[error("Shift template {index} is invalid: {reason}")]
    ShiftTemplate { index: usize, reason: String },

    #[error("Scheduling mode '{mode}' contradicts rules (fixed_shifts = {rules_fixed})")]
    ModeMismatch { mode: &'static str, rules_fixed: bool },

    #[error("Employee '{employee}' supplies {found} {grid} but the mode expects {expected}")]
    GridFormMismatch {
        employee: EmployeeId,
        grid: &'static str,
        expected: GridForm,
        found: GridForm,
    },

    #[error("Employee '{employee}' {grid} is {found:?} (days x periods), expected {expected:?}")]
    GridShape {
        employee: EmployeeId,
        grid: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Demand series is {found:?} (days x slots), expected {expected:?}")]
    DemandShape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Demand at day {day} slot {slot} is negative or not finite")]
    InvalidDemand { day: usize, slot: usize },

    #[error("Duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("'{owner}' references unknown role '{role}'")]
    UnknownRole { owner: String, role: RoleId },

    #[error("Role '{role}' is marked independent but is a stage of chain '{chain}'")]
    IndependentRoleInChain { role: RoleId, chain: ChainId },

    #[error("Production chain '{0}' has no stages")]
    EmptyChain(ChainId),

    #[error("Production chain '{chain}' has invalid contribution factor {factor}")]
    InvalidContribution { chain: ChainId, factor: f64 },

    #[error("Producing role '{role}' must have a positive rate, got {rate} items/hour")]
    NonPositiveRate { role: RoleId, rate: f64 },

    #[error("Employee '{employee}' has invalid hours or wage settings: {reason}")]
    EmployeeSettings { employee: EmployeeId, reason: String },

    #[error("Pinned assignment references unknown employee '{0}'")]
    UnknownEmployee(EmployeeId),

    #[error("Pinned assignment for '{employee}' at day {day} {period} lies outside the horizon")]
    PinOutOfHorizon {
        employee: EmployeeId,
        day: usize,
        period: Period,
    },

    #[error("Pinned assignment for '{employee}' uses a {found} period in {expected} mode")]
    PinForm {
        employee: EmployeeId,
        expected: GridForm,
        found: GridForm,
    },

    #[error("Objective weight '{tier}' must be non-negative, got {value}")]
    InvalidWeight { tier: &'static str, value: i64 },
}

/// A decoded solution that breaks a constraint the decoder re-checks independently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    /// Constraint family that was violated
    pub group: ConstraintGroup,
    /// Entity involved (employee, role, chain or period)
    pub entity: String,
    /// What exactly went wrong
    pub detail: String,
}

impl std::fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} violated for {}: {}", self.group, self.entity, self.detail)
    }
}

/// Scheduling error
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid rules: {0}")]
    InvalidRules(#[from] RulesError),

    #[error("Infeasible schedule: {}", .diagnosis.explanation)]
    Infeasible { diagnosis: Box<Diagnosis> },

    #[error("Solver budget exhausted ({})", describe_timeout(.best.is_some(), .gap))]
    SolverTimeout {
        /// Best incumbent schedule found within the budget, if any
        best: Option<Box<Schedule>>,
        /// Relative optimality gap of the incumbent
        gap: Option<f64>,
    },

    #[error("Decoding inconsistency: {0}")]
    DecodingInconsistency(Inconsistency),

    #[error("Solver error: {0}")]
    Solver(String),
}

fn describe_timeout(has_incumbent: bool, gap: &Option<f64>) -> String {
    match (has_incumbent, gap) {
        (true, Some(gap)) => format!("incumbent available, gap {:.1}%", gap * 100.0),
        (true, None) => "incumbent available".into(),
        (false, _) => "no feasible schedule found".into(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_mentions_gap() {
        let err = ScheduleError::SolverTimeout {
            best: None,
            gap: None,
        };
        assert!(err.to_string().contains("no feasible schedule"));
    }

    #[test]
    fn rules_error_converts_into_schedule_error() {
        let err: ScheduleError = RulesError::MissingShiftCount.into();
        assert!(matches!(
            err,
            ScheduleError::InvalidRules(RulesError::MissingShiftCount)
        ));
    }

    #[test]
    fn constraint_group_labels_are_readable() {
        assert_eq!(ConstraintGroup::MinimumRest.to_string(), "rest constraint");
        assert_eq!(
            ConstraintGroup::ConsecutiveSlots.label(),
            "consecutive-slot bounds"
        );
    }
}
