//! Objective Composer
//!
//! Builds one scalar minimization objective as a weighted sum of five tiers,
//! heaviest first:
//!
//! 1. unmet demand
//! 2. wage cost
//! 3. deviation from preferred hours
//! 4. fairness spread
//! 5. preference reward (negative, a tie-breaker)
//!
//! Absolute values are linearized the same way for every term: an auxiliary
//! non-negative variable bounded below by both signed differences.

use tracing::{debug, warn};

use staffplan_core::{ConstraintGroup, ObjectiveWeights};

use crate::builder::ScheduleModel;
use crate::model::{Model, Sense, VarId};
use crate::plan::Plan;

/// Objective tier a term belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    UnmetDemand,
    WageCost,
    HoursDeviation,
    Fairness,
    PreferenceReward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectiveTerm {
    pub tier: Tier,
    pub var: VarId,
    pub coeff: i64,
}

/// Linear objective, always minimized
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Objective {
    pub terms: Vec<ObjectiveTerm>,
}

impl Objective {
    /// Constant-zero objective, for pure feasibility checks
    pub fn feasibility() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, values: &[i64]) -> i64 {
        self.terms.iter().map(|t| t.coeff * values[t.var.index()]).sum()
    }

    pub fn tier_value(&self, tier: Tier, values: &[i64]) -> i64 {
        self.terms
            .iter()
            .filter(|t| t.tier == tier)
            .map(|t| t.coeff * values[t.var.index()])
            .sum()
    }

    /// Lowest and highest value the objective can take given variable bounds
    pub fn bounds(&self, model: &Model) -> (i64, i64) {
        self.terms.iter().fold((0, 0), |(lo, hi), term| {
            let var = model.variable(term.var);
            let (a, b) = (term.coeff * var.lower, term.coeff * var.upper);
            (lo + a.min(b), hi + a.max(b))
        })
    }

    fn push(&mut self, tier: Tier, var: VarId, coeff: i64) {
        if coeff != 0 {
            self.terms.push(ObjectiveTerm { tier, var, coeff });
        }
    }
}

/// Compose the weighted objective, adding its auxiliary variables and
/// linearization constraints to `built.model`
pub fn compose(built: &mut ScheduleModel, plan: &Plan, weights: &ObjectiveWeights) -> Objective {
    let mut objective = Objective::default();
    let layout = &built.layout;
    let model = &mut built.model;
    let employees = plan.employee_count();

    for (p, &var) in layout.unmet.iter().enumerate() {
        if plan.demand[p] > 0 {
            objective.push(Tier::UnmetDemand, var, weights.unmet_demand);
        }
    }

    for e in 0..employees {
        for (p, spec) in plan.periods.iter().enumerate() {
            let cost = plan.wage_cents_per_slot[e] * spec.slots as i64;
            objective.push(Tier::WageCost, layout.work[e][p], weights.wage_cost * cost);
        }
    }

    // Hours worked per employee, in slots
    let needs_hours = weights.hours_deviation > 0 || (weights.fairness > 0 && employees > 1);
    let hours: Vec<VarId> = if needs_hours {
        (0..employees)
            .map(|e| {
                let employee = &plan.snapshot.employees[e].id;
                let upper: i64 = plan.periods.iter().map(|p| p.slots as i64).sum();
                let h = model.add_var(format!("h[{employee}]"), 0, upper);
                let worked = plan
                    .periods
                    .iter()
                    .enumerate()
                    .map(|(p, spec)| (layout.work[e][p], -(spec.slots as i64)));
                model.add_constraint(
                    ConstraintGroup::Linearization,
                    format!("hours[{employee}]"),
                    worked.chain([(h, 1)]),
                    Sense::Eq,
                    0,
                );
                h
            })
            .collect()
    } else {
        Vec::new()
    };

    if weights.hours_deviation > 0 {
        for (e, &h) in hours.iter().enumerate() {
            let target = plan.preferred_slots[e];
            let employee = &plan.snapshot.employees[e].id;
            let upper = model.variable(h).upper.max(target);
            let d = model.add_var(format!("dev[{employee}]"), 0, upper);
            add_abs_bound(model, d, &[(h, 1)], target, &format!("dev[{employee}]"));
            objective.push(Tier::HoursDeviation, d, weights.hours_deviation);
        }
    }

    // n * h_e - sum(h) is n times the deviation from the average
    if weights.fairness > 0 && employees > 1 {
        let n = employees as i64;
        let upper = hours
            .iter()
            .map(|&h| model.variable(h).upper)
            .max()
            .unwrap_or(0)
            * n;
        let spread = model.add_var("fairness", 0, upper);
        for (e, &h) in hours.iter().enumerate() {
            let employee = &plan.snapshot.employees[e].id;
            let diff: Vec<(VarId, i64)> = hours
                .iter()
                .map(|&other| (other, -1))
                .chain([(h, n)])
                .collect();
            add_abs_bound(model, spread, &diff, 0, &format!("fair[{employee}]"));
        }
        objective.push(Tier::Fairness, spread, weights.fairness);
    }

    if weights.preference_reward > 0 {
        for e in 0..employees {
            for p in 0..plan.periods.len() {
                if plan.prefers(e, p) {
                    objective.push(Tier::PreferenceReward, layout.work[e][p], -weights.preference_reward);
                }
            }
        }
    }

    built.layout.hours = hours;
    check_dominance(plan, weights);
    debug!(terms = objective.terms.len(), "composed objective");
    objective
}

/// `aux >= expr - target` and `aux >= target - expr`
fn add_abs_bound(model: &mut Model, aux: VarId, expr: &[(VarId, i64)], target: i64, label: &str) {
    let negated = expr.iter().map(|&(var, coeff)| (var, -coeff));
    model.add_constraint(
        ConstraintGroup::Linearization,
        format!("{label}+"),
        negated.chain([(aux, 1)]),
        Sense::Ge,
        -target,
    );
    model.add_constraint(
        ConstraintGroup::Linearization,
        format!("{label}-"),
        expr.iter().copied().chain([(aux, 1)]),
        Sense::Ge,
        target,
    );
}

/// Warn when the weights cannot keep the intended tier order for this plan.
///
/// Two orderings matter in practice: the demand one slot of work covers must
/// cost more unmet than the wage of producing it, and the reward for a
/// preferred period must not pay for the period's wage.
fn check_dominance(plan: &Plan, weights: &ObjectiveWeights) {
    let slot_hours = plan.slot_hours();
    let best_rate = plan
        .snapshot
        .roles
        .iter()
        .map(|r| r.capacity_hundredths(slot_hours))
        .filter(|r| *r > 0)
        .min();
    let dearest_slot = plan.wage_cents_per_slot.iter().copied().max().unwrap_or(0);
    if let Some(rate) = best_rate {
        if weights.wage_cost * dearest_slot > weights.unmet_demand * rate {
            warn!(
                unmet_weight = weights.unmet_demand,
                slot_cost = weights.wage_cost * dearest_slot,
                "wage cost of a slot can outweigh the demand it covers"
            );
        }
    }
    let cheapest_slot = plan
        .wage_cents_per_slot
        .iter()
        .copied()
        .filter(|c| *c > 0)
        .min();
    if let Some(cost) = cheapest_slot {
        if weights.preference_reward > weights.wage_cost * cost {
            warn!(
                reward = weights.preference_reward,
                slot_cost = weights.wage_cost * cost,
                "preference reward can pay for an otherwise unneeded slot"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use rust_decimal_macros::dec;
    use staffplan_core::{DemandSeries, Employee, Horizon, Role, SchedulingMode, Snapshot};

    fn two_baristas() -> Snapshot {
        Snapshot::new("cafe", Horizon::single_day(2))
            .role(Role::new("barista").producing(10.0))
            .employee(
                Employee::new("alice")
                    .role("barista")
                    .wage(dec!(10))
                    .available_everywhere(1, 2),
            )
            .employee(
                Employee::new("bob")
                    .role("barista")
                    .wage(dec!(20))
                    .available_everywhere(1, 2),
            )
            .demand(DemandSeries::from_slots(vec![vec![5.0, 0.0]]))
    }

    #[test]
    fn every_tier_is_present_with_default_weights() {
        let snapshot = two_baristas();
        let plan = Plan::derive(&snapshot, &SchedulingMode::SlotBased).unwrap();
        let mut built = build(&plan);
        let objective = compose(&mut built, &plan, &ObjectiveWeights::default());
        for tier in [
            Tier::UnmetDemand,
            Tier::WageCost,
            Tier::HoursDeviation,
            Tier::Fairness,
        ] {
            assert!(objective.terms.iter().any(|t| t.tier == tier), "{tier:?}");
        }
        // Only slot 0 has demand
        let unmet: Vec<_> = objective
            .terms
            .iter()
            .filter(|t| t.tier == Tier::UnmetDemand)
            .collect();
        assert_eq!(unmet.len(), 1);
    }

    #[test]
    fn wage_terms_scale_with_cents_and_weight() {
        let snapshot = two_baristas();
        let plan = Plan::derive(&snapshot, &SchedulingMode::SlotBased).unwrap();
        let mut built = build(&plan);
        let weights = ObjectiveWeights {
            wage_cost: 3,
            ..ObjectiveWeights::default()
        };
        let objective = compose(&mut built, &plan, &weights);
        let bob_slot0 = built.layout.work[1][0];
        let term = objective.terms.iter().find(|t| t.var == bob_slot0).unwrap();
        assert_eq!(term.coeff, 3 * 2000);
    }

    #[test]
    fn absolute_value_linearization_holds_for_a_feasible_point() {
        let snapshot = two_baristas();
        let plan = Plan::derive(&snapshot, &SchedulingMode::SlotBased).unwrap();
        let mut built = build(&plan);
        let objective = compose(&mut built, &plan, &ObjectiveWeights::default());

        // alice works slot 0, bob idle: hours (1, 0), spread n*|h - avg| = 1
        let mut values = vec![0; built.model.variables().len()];
        let layout = &built.layout;
        values[layout.work[0][0].index()] = 1;
        values[layout.performs[&(0, 0, 0)].index()] = 1;
        values[layout.starts[0][0].index()] = 1;
        for var in built.model.variables().iter().enumerate() {
            match var.1.name.as_str() {
                "h[alice]" => values[var.0] = 1,
                "dev[alice]" => values[var.0] = 1,
                "fairness" => values[var.0] = 1,
                _ => {}
            }
        }
        assert_eq!(built.model.first_violation(&values), None);
        assert_eq!(objective.tier_value(Tier::UnmetDemand, &values), 0);
        assert_eq!(objective.tier_value(Tier::WageCost, &values), 1000);
        assert_eq!(objective.tier_value(Tier::Fairness, &values), 20);
    }

    #[test]
    fn bounds_account_for_negative_rewards() {
        let mut model = Model::new();
        let x = model.add_binary("x");
        let objective = Objective {
            terms: vec![ObjectiveTerm {
                tier: Tier::PreferenceReward,
                var: x,
                coeff: -5,
            }],
        };
        assert_eq!(objective.bounds(&model), (-5, 0));
    }
}
