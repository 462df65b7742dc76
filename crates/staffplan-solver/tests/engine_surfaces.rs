//! Parallel, background and cancellable solves

#![cfg(feature = "cp-backend")]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use staffplan_core::{
    DemandSeries, Employee, EngineConfig, Horizon, ObjectiveWeights, Role, ScheduleError,
    SchedulingMode, Snapshot, SolveStatus,
};
use staffplan_solver::{CancellationToken, Engine, SolveBudget, SolveRequest};

fn shop(name: &str, peak: f64) -> Snapshot {
    Snapshot::new(name, Horizon::single_day(4))
        .role(Role::new("clerk").producing(8.0))
        .employee(
            Employee::new(format!("{name}-1"))
                .role("clerk")
                .wage(dec!(11))
                .available_everywhere(1, 4),
        )
        .employee(
            Employee::new(format!("{name}-2"))
                .role("clerk")
                .wage(dec!(12))
                .available_everywhere(1, 4),
        )
        .demand(DemandSeries::from_slots(vec![vec![0.0, peak, peak, 0.0]]))
}

#[test]
fn many_organizations_solve_independently() {
    let engine = Engine::new();
    let config = EngineConfig::default();
    let requests: Vec<SolveRequest> = [("north", 6.0), ("south", 14.0), ("east", 0.0)]
        .into_iter()
        .map(|(name, peak)| SolveRequest::new(shop(name, peak), &config).unwrap())
        .collect();

    let results = engine.generate_many(&requests);
    assert_eq!(results.len(), 3);
    for (request, result) in requests.iter().zip(&results) {
        let schedule = result.as_ref().expect("feasible");
        assert_eq!(schedule.organization, request.snapshot.organization);
        assert_eq!(schedule.metrics.total_unmet, 0.0);
    }
    assert!(results[2].as_ref().unwrap().assignments.is_empty());
}

#[test]
fn pre_cancelled_solve_times_out_without_incumbent() {
    let engine = Engine::new();
    let token = CancellationToken::new();
    token.cancel();
    let budget = SolveBudget::new(Duration::from_secs(30)).with_cancel(token);

    let err = engine
        .generate_with_budget(
            &shop("west", 10.0),
            &SchedulingMode::SlotBased,
            &ObjectiveWeights::default(),
            &budget,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::SolverTimeout { best: None, .. }
    ));
}

#[test]
fn background_solve_can_be_joined() {
    let engine = Arc::new(Engine::new());
    let request = SolveRequest::new(shop("harbor", 10.0), &EngineConfig::default()).unwrap();

    let handle = engine.spawn(request);
    let schedule = handle.join().expect("feasible");
    assert_eq!(schedule.status, SolveStatus::Optimal);
    assert_eq!(schedule.metrics.total_unmet, 0.0);
}

#[test]
fn cancelled_background_solve_returns_promptly() {
    let engine = Arc::new(Engine::new());
    let request = SolveRequest::new(shop("airport", 12.0), &EngineConfig::default()).unwrap();

    let handle = engine.spawn(request);
    handle.cancel();
    // Either the solve finished before the cancel landed, or it stopped
    // with a timeout; it never hangs
    match handle.join() {
        Ok(schedule) => assert_eq!(schedule.metrics.total_unmet, 0.0),
        Err(ScheduleError::SolverTimeout { .. }) => {}
        Err(err) => panic!("unexpected failure: {err}"),
    }
}
