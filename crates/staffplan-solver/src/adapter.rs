//! Solver Adapter
//!
//! The narrow contract between the engine and a concrete solving engine:
//! `solve(model, objective, budget)` returns a status, the variable values of
//! the best solution found and its optimality gap. Nothing outside a backend
//! implementation depends on the engine itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use staffplan_core::SolveStatus;

use crate::model::Model;
use crate::objective::Objective;

/// Cloneable flag shared between a caller and a running solve
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running solve to stop and report its incumbent
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wall-clock budget plus cancellation for one backend call
#[derive(Clone, Debug)]
pub struct SolveBudget {
    pub time_limit: Duration,
    pub cancel: CancellationToken,
}

impl SolveBudget {
    pub fn new(time_limit: Duration) -> Self {
        Self {
            time_limit,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What a backend hands back
#[derive(Clone, Debug, PartialEq)]
pub struct RawSolution {
    pub status: SolveStatus,
    /// One value per model variable; `None` when no solution was found
    pub values: Option<Vec<i64>>,
    pub objective_value: Option<i64>,
    /// Relative optimality gap of `values`
    pub gap: Option<f64>,
    pub elapsed: Duration,
}

impl RawSolution {
    pub fn infeasible(elapsed: Duration) -> Self {
        Self {
            status: SolveStatus::Infeasible,
            values: None,
            objective_value: None,
            gap: None,
            elapsed,
        }
    }

    /// Budget exhausted before any solution was found
    pub fn timed_out(elapsed: Duration) -> Self {
        Self {
            status: SolveStatus::Timeout,
            ..Self::infeasible(elapsed)
        }
    }

    pub fn has_solution(&self) -> bool {
        self.values.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Model value {value} in {context} exceeds the backend's integer range")]
    ModelTooLarge { context: String, value: i64 },

    #[error("Engine failure: {0}")]
    Engine(String),
}

/// A concrete solving engine.
///
/// Implementations must honour `budget.time_limit` and stop promptly once
/// `budget.cancel` is set, returning `TIMEOUT` with whatever incumbent they
/// hold rather than blocking.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &str;

    fn solve(
        &self,
        model: &Model,
        objective: &Objective,
        budget: &SolveBudget,
    ) -> Result<RawSolution, BackendError>;
}

/// Relative gap between an incumbent and the trivial lower bound of the
/// objective, `(incumbent - bound) / max(|incumbent|, 1)`
pub fn incumbent_gap(model: &Model, objective: &Objective, incumbent: i64) -> f64 {
    let (lower, _) = objective.bounds(model);
    let gap = (incumbent - lower) as f64 / incumbent.abs().max(1) as f64;
    gap.max(0.0)
}

#[cfg(test)]
pub(crate) mod scripted {
    //! Deterministic backend for unit tests

    use super::*;
    use std::sync::Mutex;

    type Script = dyn Fn(&Model, &Objective) -> RawSolution + Send + Sync;

    /// Answers every call with the result of a closure, recording the
    /// constraint groups each call saw
    pub struct ScriptedBackend {
        script: Box<Script>,
        pub calls: Mutex<Vec<Vec<staffplan_core::ConstraintGroup>>>,
    }

    impl ScriptedBackend {
        pub fn new(script: impl Fn(&Model, &Objective) -> RawSolution + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Always optimal with the given values
        pub fn returning(values: Vec<i64>) -> Self {
            Self::new(move |_, objective| RawSolution {
                status: SolveStatus::Optimal,
                objective_value: Some(objective.evaluate(&values)),
                values: Some(values.clone()),
                gap: Some(0.0),
                elapsed: Duration::ZERO,
            })
        }
    }

    impl SolverBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn solve(
            &self,
            model: &Model,
            objective: &Objective,
            _budget: &SolveBudget,
        ) -> Result<RawSolution, BackendError> {
            self.calls
                .lock()
                .map_err(|e| BackendError::Engine(e.to_string()))?
                .push(model.groups().into_iter().collect());
            Ok((self.script)(model, objective))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{ObjectiveTerm, Tier};

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let budget = SolveBudget::new(Duration::from_secs(1)).with_cancel(token.clone());
        assert!(!budget.cancel.is_cancelled());
        token.cancel();
        assert!(budget.cancel.is_cancelled());
    }

    #[test]
    fn gap_is_relative_to_trivial_bound() {
        let mut model = Model::new();
        let v = model.add_var("v", 0, 10);
        let objective = Objective {
            terms: vec![ObjectiveTerm {
                tier: Tier::UnmetDemand,
                var: v,
                coeff: 100,
            }],
        };
        assert_eq!(incumbent_gap(&model, &objective, 0), 0.0);
        assert!((incumbent_gap(&model, &objective, 400) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn timed_out_solution_has_no_values() {
        let raw = RawSolution::timed_out(Duration::from_millis(5));
        assert_eq!(raw.status, SolveStatus::Timeout);
        assert!(!raw.has_solution());
    }
}
