//! Plain-text rendering of schedules, diagnoses and model summaries

use staffplan_core::{Diagnosis, Schedule, SchedulingMode, Snapshot};
use staffplan_solver::ModelStats;

pub fn render_check(snapshot: &Snapshot, mode: &SchedulingMode, stats: &ModelStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("Snapshot: {}\n", snapshot.organization));
    out.push_str(&format!(
        "Horizon: {} day(s) from {}, {} slot(s) per day\n",
        snapshot.horizon.days, snapshot.horizon.start, snapshot.horizon.slots_per_day
    ));
    out.push_str(&format!("Mode: {}\n", mode.name()));
    out.push_str(&format!(
        "Employees: {}, roles: {}, chains: {}, pinned: {}\n",
        snapshot.employees.len(),
        snapshot.roles.len(),
        snapshot.chains.len(),
        snapshot.pinned.len()
    ));
    out.push_str(&format!(
        "Model: {} variables, {} constraints\n",
        stats.variables, stats.constraints
    ));
    for (group, count) in &stats.per_group {
        out.push_str(&format!("  {:<26} {}\n", group.label(), count));
    }
    out.push_str("OK\n");
    out
}

pub fn render_schedule(schedule: &Schedule) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Schedule: {} ({})\n",
        schedule.organization, schedule.mode
    ));
    out.push_str(&format!("Status: {}", schedule.status));
    if let Some(gap) = schedule.gap {
        out.push_str(&format!(" (gap {:.1}%)", gap * 100.0));
    }
    out.push('\n');
    if let Some(value) = schedule.objective_value {
        out.push_str(&format!("Objective: {value}\n"));
    }

    out.push_str("\nAssignments:\n");
    if schedule.assignments.is_empty() {
        out.push_str("  (none)\n");
    }
    for a in &schedule.assignments {
        out.push_str(&format!(
            "  {:<12} {:<12} {} - {}  (day {}, {})\n",
            a.employee,
            a.role,
            a.start.format("%Y-%m-%d %H:%M"),
            a.end.format("%H:%M"),
            a.day,
            a.period
        ));
    }

    let m = &schedule.metrics;
    out.push_str("\nMetrics:\n");
    out.push_str(&format!("  Demand:        {:.2}\n", m.total_demand));
    out.push_str(&format!("  Unmet:         {:.2}\n", m.total_unmet));
    out.push_str(&format!("  Labor cost:    {}\n", m.total_cost));
    out.push_str(&format!("  Average hours: {:.1}\n", m.average_hours));
    out.push_str(&format!("  Hours spread:  {:.1}\n", m.fairness_spread_hours));

    let short: Vec<_> = m.periods.iter().filter(|p| p.unmet > 0.0).collect();
    if !short.is_empty() {
        out.push_str("\nShort periods:\n");
        for p in short {
            out.push_str(&format!(
                "  day {} {:<8} demand {:>7.2}  supply {:>7.2}  unmet {:>7.2}\n",
                p.day, p.period, p.demand, p.supply, p.unmet
            ));
        }
    }

    if !m.employees.is_empty() {
        out.push_str("\nEmployees:\n");
        for e in &m.employees {
            out.push_str(&format!(
                "  {:<12} {:>5.1}h (preferred {:>4.1}h)  cost {}\n",
                e.employee, e.hours, e.preferred_hours, e.cost
            ));
        }
    }

    if !m.chains.is_empty() {
        out.push_str("\nChains:\n");
        for c in &m.chains {
            out.push_str(&format!(
                "  {:<12} day {} {:<8} output {:>7.2}  bottleneck {}\n",
                c.chain, c.day, c.period, c.output, c.bottleneck
            ));
        }
    }

    let insights = &schedule.insights;
    if !insights.is_empty() {
        out.push_str("\nInsights:\n");
        for h in &insights.hiring {
            out.push_str(&format!(
                "  hire: {} short on {} day(s), peak unmet {:.2}; consider {} more\n",
                h.period, h.days_short, h.peak_unmet, h.suggested_headcount
            ));
        }
        for o in &insights.outreach {
            out.push_str(&format!(
                "  outreach: {} scheduled {:.1}h of a preferred {:.1}h\n",
                o.employee, o.scheduled_hours, o.preferred_hours
            ));
        }
        for r in &insights.rebalancing {
            out.push_str(&format!(
                "  rebalance: {} limits {} in {} of {} periods\n",
                r.role, r.chain, r.periods_bottlenecked, r.active_periods
            ));
        }
    }
    out
}

pub fn render_diagnosis(diagnosis: &Diagnosis) -> String {
    let mut out = String::new();
    out.push_str("Infeasible\n");
    out.push_str(&format!("{}\n", diagnosis.explanation));

    if !diagnosis.steps.is_empty() {
        out.push_str("\nRelaxation steps:\n");
        for step in &diagnosis.steps {
            out.push_str(&format!("  {:<26} {}\n", step.group.label(), step.status));
        }
    }
    if !diagnosis.suggestions.is_empty() {
        out.push_str("\nSuggestions:\n");
        for s in &diagnosis.suggestions {
            out.push_str(&format!("  - {s}\n"));
        }
    }
    out
}

/// Timeout report; the incumbent, when there is one, follows the header
pub fn render_timeout(best: Option<&Schedule>, gap: Option<f64>) -> String {
    let mut out = String::from("Budget exhausted before optimality was proven\n");
    match (best, gap) {
        (Some(best), Some(gap)) => {
            out.push_str(&format!("Best schedule found (gap {:.1}%):\n\n", gap * 100.0));
            out.push_str(&render_schedule(best));
        }
        (Some(best), None) => {
            out.push_str("Best schedule found:\n\n");
            out.push_str(&render_schedule(best));
        }
        (None, _) => out.push_str("No feasible schedule was found within the budget\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffplan_core::{ConstraintGroup, RelaxationStep, SolveStatus};

    fn diagnosis() -> Diagnosis {
        Diagnosis {
            binding_group: Some(ConstraintGroup::MinimumRest),
            steps: vec![RelaxationStep {
                group: ConstraintGroup::MinimumRest,
                status: SolveStatus::Optimal,
            }],
            entities: vec!["alice".into()],
            explanation: "The rest constraint is binding".into(),
            suggestions: vec!["Shorten the minimum rest".into()],
        }
    }

    #[test]
    fn diagnosis_lists_steps_and_suggestions() {
        let text = render_diagnosis(&diagnosis());
        assert!(text.starts_with("Infeasible\n"));
        assert!(text.contains("rest constraint"));
        assert!(text.contains("OPTIMAL"));
        assert!(text.contains("- Shorten the minimum rest"));
    }

    #[test]
    fn timeout_without_incumbent_says_so() {
        let text = render_timeout(None, None);
        assert!(text.contains("No feasible schedule"));
    }
}
