//! Engine output: schedules, metrics, insights and feasibility diagnoses.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ChainId, ConstraintGroup, EmployeeId, GridForm, RoleId};

// ============================================================================
// Periods and Assignments
// ============================================================================

/// A schedulable unit within a day
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Period {
    Slot(usize),
    Shift(usize),
}

impl Period {
    pub fn index(self) -> usize {
        match self {
            Self::Slot(i) | Self::Shift(i) => i,
        }
    }

    pub fn form(self) -> GridForm {
        match self {
            Self::Slot(_) => GridForm::Slots,
            Self::Shift(_) => GridForm::Shifts,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slot(i) => write!(f, "slot {i}"),
            Self::Shift(i) => write!(f, "shift {i}"),
        }
    }
}

/// One employee performing one role during one period.
///
/// Only the decoder creates assignments; a new solve produces a new schedule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub employee: EmployeeId,
    pub role: RoleId,
    pub day: usize,
    pub period: Period,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

// ============================================================================
// Solve Status
// ============================================================================

/// Outcome class reported by a solver backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    /// Certified optimal
    Optimal,
    /// Feasible, optimality not proven
    Feasible,
    /// Proven that no solution exists
    Infeasible,
    /// Budget exhausted or cancelled; an incumbent may still exist
    Timeout,
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Optimal => "OPTIMAL",
            Self::Feasible => "FEASIBLE",
            Self::Infeasible => "INFEASIBLE",
            Self::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Demand versus realized supply for one period
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnmetDemand {
    pub day: usize,
    pub period: Period,
    /// Required items, rounded up to the hundredth
    pub demand: f64,
    /// Realized supply in items
    pub supply: f64,
    /// Shortfall in items, rounded up to the hundredth and never negative
    pub unmet: f64,
}

/// Realized hours and cost of one employee
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmployeeHours {
    pub employee: EmployeeId,
    pub hours: f64,
    pub preferred_hours: f64,
    pub cost: Decimal,
    /// Assigned periods that were marked as preferred
    pub preferred_periods_worked: usize,
}

/// Realized output of a production chain in one period
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainOutput {
    pub chain: ChainId,
    pub day: usize,
    pub period: Period,
    /// Items produced: the minimum stage capacity
    pub output: f64,
    /// Stage with the lowest capacity (earliest stage on ties)
    pub bottleneck: RoleId,
}

/// Aggregate figures for a schedule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    pub total_demand: f64,
    pub total_unmet: f64,
    pub total_cost: Decimal,
    pub average_hours: f64,
    /// Largest absolute deviation of any employee's hours from the average
    pub fairness_spread_hours: f64,
    /// One entry per period, in timeline order
    pub periods: Vec<UnmetDemand>,
    pub employees: Vec<EmployeeHours>,
    pub chains: Vec<ChainOutput>,
}

// ============================================================================
// Insights
// ============================================================================

/// Slot of the day with unmet demand on several days
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HiringRecommendation {
    pub period: Period,
    pub days_short: usize,
    pub total_unmet: f64,
    pub peak_unmet: f64,
    /// Extra staff needed to cover the peak, using the best per-employee rate
    pub suggested_headcount: u32,
}

/// Employee scheduled well below their preferred hours
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityOutreach {
    pub employee: EmployeeId,
    pub scheduled_hours: f64,
    pub preferred_hours: f64,
}

/// Chain whose bottleneck stage keeps recurring
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleRebalancing {
    pub chain: ChainId,
    pub role: RoleId,
    /// Active periods where this role was the bottleneck
    pub periods_bottlenecked: usize,
    pub active_periods: usize,
}

/// Operator-facing recommendations derived from a schedule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub hiring: Vec<HiringRecommendation>,
    pub outreach: Vec<AvailabilityOutreach>,
    pub rebalancing: Vec<RoleRebalancing>,
}

impl Insights {
    pub fn is_empty(&self) -> bool {
        self.hiring.is_empty() && self.outreach.is_empty() && self.rebalancing.is_empty()
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// The result of one solve
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub organization: String,
    /// `slot_based` or `fixed_shift`
    pub mode: String,
    pub status: SolveStatus,
    pub objective_value: Option<i64>,
    /// Relative optimality gap; zero when optimal
    pub gap: Option<f64>,
    /// Ordered by employee, day, period
    pub assignments: Vec<Assignment>,
    pub metrics: ScheduleMetrics,
    pub insights: Insights,
}

impl Schedule {
    pub fn assignments_for<'a>(&'a self, employee: &'a str) -> impl Iterator<Item = &'a Assignment> {
        self.assignments.iter().filter(move |a| a.employee == employee)
    }

    pub fn unmet_at(&self, day: usize, period: Period) -> f64 {
        self.metrics
            .periods
            .iter()
            .find(|p| p.day == day && p.period == period)
            .map(|p| p.unmet)
            .unwrap_or(0.0)
    }
}

// ============================================================================
// Diagnosis
// ============================================================================

/// One step of the relaxation search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelaxationStep {
    pub group: ConstraintGroup,
    /// Status of the re-solve with this group (and all earlier ones) relaxed
    pub status: SolveStatus,
}

/// Structured explanation of an infeasible problem
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// First group whose relaxation restored feasibility
    pub binding_group: Option<ConstraintGroup>,
    pub steps: Vec<RelaxationStep>,
    /// Entities whose constraints in the binding group had to give way
    pub entities: Vec<String>,
    pub explanation: String,
    pub suggestions: Vec<String>,
}
