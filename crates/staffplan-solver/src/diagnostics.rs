//! Feasibility Diagnostics
//!
//! Runs only after the backend proved a model infeasible. Constraint groups
//! are relaxed cumulatively in a fixed order and the model is re-solved as a
//! pure feasibility problem under a short budget after each step. The first
//! group whose relaxation yields a solution is the binding group; the
//! entities whose constraints in that group the relaxed solution breaks are
//! reported alongside it.
//!
//! Hard rules that are never relaxed (availability, eligibility, pinned
//! assignments, capacity) make the diagnosis unresolved when nothing else
//! restores feasibility. A step that runs out of budget ends the search
//! unresolved as well: later groups are not tried.

use std::collections::BTreeSet;

use tracing::{debug, info};

use staffplan_core::{ConstraintGroup, Diagnosis, RelaxationStep, SolveStatus};

use crate::adapter::{BackendError, SolveBudget, SolverBackend};
use crate::builder::ScheduleModel;
use crate::decoder::{audit, read_roster};
use crate::objective::Objective;
use crate::plan::Plan;

/// Groups in the order they are relaxed
pub const RELAXATION_ORDER: [ConstraintGroup; 5] = [
    ConstraintGroup::MinimumRest,
    ConstraintGroup::ConsecutiveSlots,
    ConstraintGroup::MinimumStaffing,
    ConstraintGroup::WeeklyHours,
    ConstraintGroup::DemandCoverage,
];

pub fn diagnose<B: SolverBackend + ?Sized>(
    backend: &B,
    plan: &Plan,
    built: &ScheduleModel,
    budget: &SolveBudget,
) -> Result<Diagnosis, BackendError> {
    let feasibility = Objective::feasibility();
    let mut relaxed = Vec::new();
    let mut steps = Vec::new();

    for group in RELAXATION_ORDER {
        if !built.model.has_group(group) {
            continue;
        }
        if budget.cancel.is_cancelled() {
            debug!("diagnostics cancelled");
            break;
        }
        relaxed.push(group);
        let model = built.model.relaxed(&relaxed);
        let raw = backend.solve(&model, &feasibility, budget)?;
        info!(%group, status = %raw.status, "relaxation step");
        steps.push(RelaxationStep {
            group,
            status: raw.status,
        });

        if let Some(values) = raw.values {
            let entities = affected_entities(plan, built, &values, group);
            return Ok(Diagnosis {
                binding_group: Some(group),
                explanation: explain(Some(group), &entities),
                suggestions: suggestions(Some(group)),
                steps,
                entities,
            });
        }
        if raw.status == SolveStatus::Timeout {
            info!(%group, "relaxation step ran out of budget");
            return Ok(Diagnosis {
                binding_group: None,
                explanation: format!(
                    "Diagnostics ran out of budget while relaxing the {group}; \
                     no binding group could be established"
                ),
                suggestions: vec![
                    "Raise the diagnostics budget and run the diagnosis again".to_string(),
                ],
                steps,
                entities: Vec::new(),
            });
        }
    }

    Ok(Diagnosis {
        binding_group: None,
        explanation: explain(None, &[]),
        suggestions: suggestions(None),
        steps,
        entities: Vec::new(),
    })
}

/// Entities whose constraints in `group` the relaxed solution breaks
fn affected_entities(
    plan: &Plan,
    built: &ScheduleModel,
    values: &[i64],
    group: ConstraintGroup,
) -> Vec<String> {
    if group == ConstraintGroup::DemandCoverage {
        return plan
            .periods
            .iter()
            .enumerate()
            .filter(|(p, _)| values[built.layout.unmet[*p].index()] > 0)
            .map(|(_, spec)| format!("day {} {}", spec.day, spec.period))
            .collect();
    }
    let Ok(roster) = read_roster(plan, &built.layout, values) else {
        return Vec::new();
    };
    audit(plan, &roster)
        .into_iter()
        .filter(|v| v.group == group)
        .map(|v| v.entity)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn explain(group: Option<ConstraintGroup>, entities: &[String]) -> String {
    match group {
        Some(group) if entities.is_empty() => {
            format!("The {group} is binding: relaxing it restores a feasible schedule")
        }
        Some(group) => format!(
            "The {group} is binding: relaxing it restores a feasible schedule (affected: {})",
            entities.join(", ")
        ),
        None => format!(
            "No relaxation of {} restores feasibility; the conflict lies in availability, \
             role eligibility or pinned assignments",
            RELAXATION_ORDER.map(ConstraintGroup::label).join(", ")
        ),
    }
}

fn suggestions(group: Option<ConstraintGroup>) -> Vec<String> {
    let lines: &[&str] = match group {
        Some(ConstraintGroup::MinimumRest) => &[
            "Reduce the minimum rest between working periods",
            "Remove pinned assignments that leave too little rest",
        ],
        Some(ConstraintGroup::ConsecutiveSlots) => &[
            "Shorten the minimum shift length",
            "Raise the maximum consecutive slots",
        ],
        Some(ConstraintGroup::MinimumStaffing) => &[
            "Lower the minimum staffing of the affected roles",
            "Make more employees eligible or available for those roles",
        ],
        Some(ConstraintGroup::WeeklyHours) => &[
            "Lower the weekly minimum hours",
            "Raise the weekly maximum hours of the affected employees",
        ],
        Some(ConstraintGroup::DemandCoverage) => &[
            "Allow unmet demand instead of requiring all demand to be met",
            "Add staff or availability in the affected periods",
        ],
        _ => &["Check availability, role eligibility and pinned assignments for contradictions"],
    };
    lines.iter().map(|s| (*s).to_string()).collect()
}
