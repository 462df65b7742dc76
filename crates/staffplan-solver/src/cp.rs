//! Constraint-programming backend using the Pumpkin solver
//!
//! # Feature Flag
//!
//! This module requires the `cp-backend` feature (enabled by default):
//!
//! ```toml
//! staffplan-solver = { version = "0.3", features = ["cp-backend"] }
//! ```
//!
//! # Encoding
//!
//! Every model variable becomes a bounded integer. Pumpkin's linear
//! constraints are all of the form `sum(c * x) >= rhs`, so `<=` is posted
//! negated and `==` as both directions. The objective is an extra variable
//! `obj >= sum(coeff * x)` minimized with linear SAT-UNSAT search.

use std::time::{Duration, Instant};

use pumpkin_solver::constraints as cp;
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution};
use pumpkin_solver::termination::{TerminationCondition, TimeBudget};
use pumpkin_solver::variables::{AffineView, DomainId, TransformableVariable};
use pumpkin_solver::Solver;
use tracing::{debug, info};

use staffplan_core::SolveStatus;

use crate::adapter::{
    incumbent_gap, BackendError, CancellationToken, RawSolution, SolveBudget, SolverBackend,
};
use crate::model::{Model, Sense};
use crate::objective::Objective;

/// Pumpkin-backed implementation of the solver contract
#[derive(Clone, Copy, Debug, Default)]
pub struct CpBackend;

impl CpBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Stops the search on wall-clock expiry or caller cancellation
struct BudgetTermination {
    time: TimeBudget,
    cancel: CancellationToken,
}

impl TerminationCondition for BudgetTermination {
    fn should_stop(&mut self) -> bool {
        self.cancel.is_cancelled() || self.time.should_stop()
    }
}

fn to_i32(value: i64, context: impl FnOnce() -> String) -> Result<i32, BackendError> {
    i32::try_from(value).map_err(|_| BackendError::ModelTooLarge {
        context: context(),
        value,
    })
}

type Terms = Vec<AffineView<DomainId>>;

fn scaled_terms(
    vars: &[DomainId],
    terms: &[(crate::model::VarId, i64)],
    sign: i64,
    label: &str,
) -> Result<Terms, BackendError> {
    terms
        .iter()
        .map(|&(var, coeff)| {
            let c = to_i32(sign * coeff, || format!("constraint {label}"))?;
            Ok(vars[var.index()].scaled(c))
        })
        .collect()
}

impl SolverBackend for CpBackend {
    fn name(&self) -> &str {
        "pumpkin"
    }

    fn solve(
        &self,
        model: &Model,
        objective: &Objective,
        budget: &SolveBudget,
    ) -> Result<RawSolution, BackendError> {
        let started = Instant::now();
        if budget.cancel.is_cancelled() {
            return Ok(RawSolution::timed_out(started.elapsed()));
        }

        let mut solver = Solver::default();

        let vars: Vec<DomainId> = model
            .variables()
            .iter()
            .map(|v| {
                let lower = to_i32(v.lower, || format!("bounds of {}", v.name))?;
                let upper = to_i32(v.upper, || format!("bounds of {}", v.name))?;
                Ok(solver.new_bounded_integer(lower, upper))
            })
            .collect::<Result<_, BackendError>>()?;

        let tag = solver.new_constraint_tag();
        let no_values: Vec<i64> = Vec::new();
        for constraint in model.constraints() {
            // Constant constraints (e.g. a pin on a missing role variable)
            if constraint.terms.is_empty() {
                if constraint.is_satisfied(&no_values) {
                    continue;
                }
                debug!(constraint = %constraint.label, "constant constraint is violated");
                return Ok(RawSolution::infeasible(started.elapsed()));
            }

            let rhs = to_i32(constraint.rhs, || format!("constraint {}", constraint.label))?;
            let mut directions = Vec::with_capacity(2);
            if matches!(constraint.sense, Sense::Ge | Sense::Eq) {
                directions.push((1, rhs));
            }
            if matches!(constraint.sense, Sense::Le | Sense::Eq) {
                directions.push((-1, -rhs));
            }
            for (sign, bound) in directions {
                let terms = scaled_terms(&vars, &constraint.terms, sign, &constraint.label)?;
                let posted = solver
                    .add_constraint(cp::greater_than_or_equals(terms, bound, tag))
                    .post();
                if posted.is_err() {
                    // Root propagation already found a conflict
                    debug!(constraint = %constraint.label, "constraint conflicts at the root");
                    return Ok(RawSolution::infeasible(started.elapsed()));
                }
            }
        }

        // obj >= sum(coeff * x), minimized
        let (lower, upper) = objective.bounds(model);
        let objective_var = solver.new_bounded_integer(
            to_i32(lower, || "objective lower bound".into())?,
            to_i32(upper, || "objective upper bound".into())?,
        );
        if !objective.is_empty() {
            let mut terms = vec![objective_var.scaled(1)];
            for term in &objective.terms {
                let c = to_i32(-term.coeff, || "objective coefficient".into())?;
                terms.push(vars[term.var.index()].scaled(c));
            }
            if solver
                .add_constraint(cp::greater_than_or_equals(terms, 0, tag))
                .post()
                .is_err()
            {
                return Ok(RawSolution::infeasible(started.elapsed()));
            }
        }

        let mut brancher = solver.default_brancher();
        let mut termination = BudgetTermination {
            time: TimeBudget::starting_now(budget.time_limit),
            cancel: budget.cancel.clone(),
        };

        fn noop_callback<B>(_: &Solver, _: pumpkin_solver::results::SolutionReference, _: &B) {}
        let result = solver.optimise(
            &mut brancher,
            &mut termination,
            LinearSatUnsat::new(OptimisationDirection::Minimise, objective_var, noop_callback),
        );

        let (status, values) = match result {
            OptimisationResult::Optimal(solution) => (
                SolveStatus::Optimal,
                Some(
                    vars.iter()
                        .map(|&var| i64::from(solution.get_integer_value(var)))
                        .collect::<Vec<_>>(),
                ),
            ),
            // Search stopped by the budget while still improving
            OptimisationResult::Satisfiable(solution) => (
                SolveStatus::Timeout,
                Some(
                    vars.iter()
                        .map(|&var| i64::from(solution.get_integer_value(var)))
                        .collect(),
                ),
            ),
            OptimisationResult::Unsatisfiable => (SolveStatus::Infeasible, None),
            OptimisationResult::Unknown => (SolveStatus::Timeout, None),
        };

        let elapsed = started.elapsed();
        let objective_value = values.as_ref().map(|v| objective.evaluate(v));
        let gap = match (status, objective_value) {
            (SolveStatus::Optimal, Some(_)) => Some(0.0),
            (_, Some(value)) => Some(incumbent_gap(model, objective, value)),
            _ => None,
        };

        info!(
            backend = self.name(),
            %status,
            objective = ?objective_value,
            elapsed_ms = duration_ms(elapsed),
            "solve finished"
        );

        Ok(RawSolution {
            status,
            values,
            objective_value,
            gap,
            elapsed,
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
