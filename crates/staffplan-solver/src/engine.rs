//! Engine entry points: single, parallel and background solves.
//!
//! Every solve works on its own borrowed snapshot and builds its own model,
//! so solves share nothing mutable and can run side by side.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{info, info_span, warn};

use staffplan_core::{
    Diagnosis, EngineConfig, ObjectiveWeights, Schedule, ScheduleError, SchedulingMode, Snapshot,
    SolveStatus,
};

#[cfg(feature = "cp-backend")]
use crate::cp::CpBackend;

use crate::adapter::{CancellationToken, RawSolution, SolveBudget, SolverBackend};
use crate::builder::{build, ScheduleModel};
use crate::decoder::decode;
use crate::objective::{compose, Objective};
use crate::plan::Plan;
use crate::{diagnostics, insights};

/// One independent solve request
#[derive(Clone, Debug)]
pub struct SolveRequest {
    pub snapshot: Snapshot,
    pub mode: SchedulingMode,
    pub weights: ObjectiveWeights,
    pub time_budget: Duration,
}

impl SolveRequest {
    /// Request using the mode implied by the snapshot's rules
    pub fn new(snapshot: Snapshot, config: &EngineConfig) -> Result<Self, ScheduleError> {
        let mode = SchedulingMode::from_rules(&snapshot.rules)?;
        Ok(Self {
            snapshot,
            mode,
            weights: config.weights,
            time_budget: config.time_budget(),
        })
    }
}

/// Schedule generator over a solver backend
#[cfg(feature = "cp-backend")]
#[derive(Debug, Default)]
pub struct Engine<B: SolverBackend = CpBackend> {
    backend: B,
    config: EngineConfig,
}

/// Schedule generator over a solver backend
#[cfg(not(feature = "cp-backend"))]
#[derive(Debug, Default)]
pub struct Engine<B: SolverBackend> {
    backend: B,
    config: EngineConfig,
}

#[cfg(feature = "cp-backend")]
impl Engine<CpBackend> {
    pub fn new() -> Self {
        Self::with_backend(CpBackend::new())
    }
}

impl<B: SolverBackend> Engine<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Generate a schedule, or explain why none exists.
    ///
    /// Rules are validated before any model is built. An infeasible model
    /// is diagnosed; an exhausted budget returns the best incumbent (if
    /// any) inside `ScheduleError::SolverTimeout`.
    pub fn generate_schedule(
        &self,
        snapshot: &Snapshot,
        mode: &SchedulingMode,
        weights: &ObjectiveWeights,
        time_budget: Duration,
    ) -> Result<Schedule, ScheduleError> {
        self.generate_with_budget(snapshot, mode, weights, &SolveBudget::new(time_budget))
    }

    /// `generate_schedule` with a caller-supplied cancellation token
    pub fn generate_with_budget(
        &self,
        snapshot: &Snapshot,
        mode: &SchedulingMode,
        weights: &ObjectiveWeights,
        budget: &SolveBudget,
    ) -> Result<Schedule, ScheduleError> {
        let _span = info_span!("solve", org = %snapshot.organization, mode = mode.name()).entered();

        let plan = Plan::derive(snapshot, mode)?;
        weights.validate()?;
        let mut built = build(&plan);
        let objective = compose(&mut built, &plan, weights);

        let raw = self
            .backend
            .solve(&built.model, &objective, budget)
            .map_err(|e| ScheduleError::Solver(e.to_string()))?;

        match raw.status {
            SolveStatus::Optimal | SolveStatus::Feasible => {
                let schedule = self.assemble(&plan, &built, &raw)?;
                info!(
                    status = %schedule.status,
                    assignments = schedule.assignments.len(),
                    unmet = schedule.metrics.total_unmet,
                    "schedule generated"
                );
                Ok(schedule)
            }
            SolveStatus::Infeasible => {
                let diagnosis = self.run_diagnostics(&plan, &built, &budget.cancel)?;
                Err(ScheduleError::Infeasible {
                    diagnosis: Box::new(diagnosis),
                })
            }
            SolveStatus::Timeout => {
                let best = if raw.has_solution() {
                    Some(Box::new(self.assemble(&plan, &built, &raw)?))
                } else {
                    None
                };
                warn!(incumbent = best.is_some(), gap = ?raw.gap, "solver budget exhausted");
                Err(ScheduleError::SolverTimeout { best, gap: raw.gap })
            }
        }
    }

    /// Run the relaxation search directly.
    ///
    /// Returns `None` when the model is feasible as given, and
    /// `SolverTimeout` when the budget ran out before feasibility was decided.
    pub fn diagnose(
        &self,
        snapshot: &Snapshot,
        mode: &SchedulingMode,
    ) -> Result<Option<Diagnosis>, ScheduleError> {
        let plan = Plan::derive(snapshot, mode)?;
        let built = build(&plan);
        let cancel = CancellationToken::new();
        let budget = SolveBudget::new(self.config.diagnostics_budget()).with_cancel(cancel.clone());
        let raw = self
            .backend
            .solve(&built.model, &Objective::feasibility(), &budget)
            .map_err(|e| ScheduleError::Solver(e.to_string()))?;
        if raw.has_solution() {
            return Ok(None);
        }
        if raw.status == SolveStatus::Timeout {
            warn!("feasibility check ran out of budget");
            return Err(ScheduleError::SolverTimeout {
                best: None,
                gap: None,
            });
        }
        self.run_diagnostics(&plan, &built, &cancel).map(Some)
    }

    /// Solve independent requests in parallel
    pub fn generate_many(&self, requests: &[SolveRequest]) -> Vec<Result<Schedule, ScheduleError>> {
        requests
            .par_iter()
            .map(|r| self.generate_schedule(&r.snapshot, &r.mode, &r.weights, r.time_budget))
            .collect()
    }

    fn run_diagnostics(
        &self,
        plan: &Plan,
        built: &ScheduleModel,
        cancel: &CancellationToken,
    ) -> Result<Diagnosis, ScheduleError> {
        let budget = SolveBudget::new(self.config.diagnostics_budget()).with_cancel(cancel.clone());
        let diagnosis = diagnostics::diagnose(&self.backend, plan, built, &budget)
            .map_err(|e| ScheduleError::Solver(e.to_string()))?;
        info!(binding = ?diagnosis.binding_group, "diagnosis complete");
        Ok(diagnosis)
    }

    fn assemble(
        &self,
        plan: &Plan,
        built: &ScheduleModel,
        raw: &RawSolution,
    ) -> Result<Schedule, ScheduleError> {
        let values = raw
            .values
            .as_deref()
            .ok_or_else(|| ScheduleError::Solver("backend returned no values".into()))?;
        let decoded =
            decode(plan, &built.layout, values).map_err(ScheduleError::DecodingInconsistency)?;
        let insights = insights::derive(plan, &decoded.metrics, &self.config.insights);
        Ok(Schedule {
            organization: plan.snapshot.organization.clone(),
            mode: plan.mode.name().to_string(),
            status: raw.status,
            objective_value: raw.objective_value,
            gap: raw.gap,
            assignments: decoded.assignments,
            metrics: decoded.metrics,
            insights,
        })
    }
}

impl<B: SolverBackend + 'static> Engine<B> {
    /// Solve on a background thread; the handle can cancel the solve, which
    /// then ends with `SolverTimeout` carrying any incumbent
    pub fn spawn(self: &Arc<Self>, request: SolveRequest) -> SolveHandle {
        let cancel = CancellationToken::new();
        let engine = Arc::clone(self);
        let token = cancel.clone();
        let thread = std::thread::spawn(move || {
            let budget = SolveBudget::new(request.time_budget).with_cancel(token);
            engine.generate_with_budget(&request.snapshot, &request.mode, &request.weights, &budget)
        });
        SolveHandle { cancel, thread }
    }
}

/// A solve running on a background thread
#[derive(Debug)]
pub struct SolveHandle {
    cancel: CancellationToken,
    thread: JoinHandle<Result<Schedule, ScheduleError>>,
}

impl SolveHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the solve to finish
    pub fn join(self) -> Result<Schedule, ScheduleError> {
        self.thread
            .join()
            .map_err(|_| ScheduleError::Solver("solve thread panicked".into()))?
    }
}

/// Generate a schedule with the default constraint-programming backend
#[cfg(feature = "cp-backend")]
pub fn generate_schedule(
    snapshot: &Snapshot,
    mode: &SchedulingMode,
    weights: &ObjectiveWeights,
    time_budget: Duration,
) -> Result<Schedule, ScheduleError> {
    Engine::new().generate_schedule(snapshot, mode, weights, time_budget)
}
