//! End-to-end scheduling scenarios on the constraint-programming backend
//!
//! - Coverage: two employees together meet a single peak
//! - Consecutive days: runs restart after the overnight closure
//! - Fractional capacity: quarter-hour slots below one item each
//! - Bottleneck: chain output is capped by its slowest stage
//! - Infeasible rest: diagnostics names the rest constraint
//! - Fixed-shift mode rejects slot-level availability

#![cfg(feature = "cp-backend")]

use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use staffplan_core::{
    Availability, ConstraintGroup, DemandSeries, Employee, GridForm, Horizon, ObjectiveWeights,
    Period, PinnedAssignment, ProductionChain, Role, Rules, RulesError, ScheduleError,
    SchedulingMode, Snapshot, SolveStatus,
};
use staffplan_solver::{generate_schedule, Engine};

fn solve(snapshot: &Snapshot, mode: &SchedulingMode) -> Result<staffplan_core::Schedule, ScheduleError> {
    generate_schedule(snapshot, mode, &ObjectiveWeights::default(), Duration::from_secs(20))
}

// ============================================================================
// Coverage
// ============================================================================

fn two_baristas(demand: Vec<f64>) -> Snapshot {
    let slots = demand.len();
    Snapshot::new("corner-cafe", Horizon::single_day(slots))
        .role(Role::new("barista").producing(10.0))
        .employee(
            Employee::new("alice")
                .role("barista")
                .wage(dec!(15))
                .available_everywhere(1, slots),
        )
        .employee(
            Employee::new("bob")
                .role("barista")
                .wage(dec!(15))
                .available_everywhere(1, slots),
        )
        .demand(DemandSeries::from_slots(vec![demand]))
}

#[test]
fn both_employees_cover_a_peak_of_fifteen() {
    let snapshot = two_baristas(vec![0.0, 15.0, 0.0]);
    let schedule = solve(&snapshot, &SchedulingMode::SlotBased).expect("feasible");

    assert_eq!(schedule.status, SolveStatus::Optimal);
    assert_eq!(schedule.gap, Some(0.0));
    assert_eq!(schedule.unmet_at(0, Period::Slot(1)), 0.0);
    assert_eq!(schedule.metrics.total_unmet, 0.0);

    let worked: Vec<(&str, Period)> = schedule
        .assignments
        .iter()
        .map(|a| (a.employee.as_str(), a.period))
        .collect();
    assert_eq!(
        worked,
        vec![("alice", Period::Slot(1)), ("bob", Period::Slot(1))]
    );
    assert!(schedule.metrics.periods[1].supply >= 15.0);
}

#[test]
fn idle_slots_are_not_staffed() {
    let snapshot = two_baristas(vec![0.0, 0.0, 0.0]);
    let schedule = solve(&snapshot, &SchedulingMode::SlotBased).expect("feasible");
    assert!(schedule.assignments.is_empty());
    assert_eq!(schedule.metrics.total_cost, dec!(0));
}

// ============================================================================
// Consecutive days
// ============================================================================

#[test]
fn two_full_days_in_a_row_are_allowed() {
    let snapshot = Snapshot::new("corner-cafe", Horizon::days(2, 8))
        .role(Role::new("barista").producing(10.0))
        .employee(
            Employee::new("alice")
                .role("barista")
                .wage(dec!(15))
                .available_everywhere(2, 8),
        )
        .demand(DemandSeries::from_slots(vec![vec![10.0; 8]; 2]));
    let schedule = solve(&snapshot, &SchedulingMode::SlotBased).expect("feasible");

    assert_eq!(schedule.assignments.len(), 16);
    assert_eq!(schedule.metrics.total_unmet, 0.0);
    assert_eq!(schedule.metrics.employees[0].hours, 16.0);
}

// ============================================================================
// Fractional capacity
// ============================================================================

#[test]
fn quarter_hour_slots_keep_fractional_supply() {
    let snapshot = Snapshot::new("bakery", Horizon::days(1, 8))
        .rules(Rules {
            slot_hours: 0.25,
            ..Rules::default()
        })
        .role(Role::new("baker").producing(1.0))
        .employee(
            Employee::new("bea")
                .role("baker")
                .wage(dec!(12))
                .available_everywhere(1, 8),
        )
        .demand(DemandSeries::from_slots(vec![vec![0.25; 8]]));
    let schedule = solve(&snapshot, &SchedulingMode::SlotBased).expect("feasible");

    assert_eq!(schedule.assignments.len(), 8);
    assert_eq!(schedule.metrics.total_demand, 2.0);
    assert_eq!(schedule.metrics.total_unmet, 0.0);
    assert_eq!(schedule.metrics.periods[0].supply, 0.25);
}

// ============================================================================
// Bottleneck
// ============================================================================

fn kitchen() -> Snapshot {
    Snapshot::new("diner", Horizon::single_day(1))
        .role(Role::new("cook").producing(10.0).chained())
        .role(Role::new("runner").producing(5.0).chained())
        .chain(ProductionChain::new("kitchen").stage("cook").stage("runner"))
        .employee(Employee::new("ann").role("cook").wage(dec!(18)).available_everywhere(1, 1))
        .employee(Employee::new("ben").role("cook").wage(dec!(18)).available_everywhere(1, 1))
        .employee(Employee::new("cal").role("runner").wage(dec!(14)).available_everywhere(1, 1))
        .demand(DemandSeries::from_slots(vec![vec![30.0]]))
}

#[test]
fn chain_output_is_capped_by_the_slowest_stage() {
    // Both cooks pinned: stage one offers 20, stage two only 5
    let snapshot = kitchen()
        .pin(PinnedAssignment::slot("ann", 0, 0))
        .pin(PinnedAssignment::slot("ben", 0, 0))
        .pin(PinnedAssignment::slot("cal", 0, 0));
    let schedule = solve(&snapshot, &SchedulingMode::SlotBased).expect("feasible");

    assert_eq!(schedule.metrics.chains.len(), 1);
    let output = &schedule.metrics.chains[0];
    assert_eq!(output.output, 5.0);
    assert_eq!(output.bottleneck, "runner");
    assert_eq!(schedule.unmet_at(0, Period::Slot(0)), 25.0);
}

#[test]
fn extra_first_stage_staff_adds_nothing() {
    let schedule = solve(&kitchen(), &SchedulingMode::SlotBased).expect("feasible");

    // One cook already saturates the single runner
    let cooks = schedule.assignments.iter().filter(|a| a.role == "cook").count();
    assert_eq!(cooks, 1);
    assert_eq!(schedule.metrics.chains[0].output, 5.0);
    assert_eq!(schedule.metrics.total_unmet, 25.0);
}

// ============================================================================
// Infeasible rest
// ============================================================================

/// Alice must work slots 1 and 3 with slot 2 off, but needs four idle slots
/// between working periods
fn rest_conflict() -> Snapshot {
    Snapshot::new("bakery", Horizon::single_day(5))
        .rules(Rules {
            min_rest_slots: 4,
            ..Rules::default()
        })
        .role(Role::new("baker").producing(6.0))
        .employee(
            Employee::new("alice")
                .role("baker")
                .wage(dec!(16))
                .availability(Availability::Slots(vec![vec![true, true, false, true, true]])),
        )
        .pin(PinnedAssignment::slot("alice", 0, 1))
        .pin(PinnedAssignment::slot("alice", 0, 3))
}

#[test]
fn rest_violation_is_diagnosed() {
    let err = solve(&rest_conflict(), &SchedulingMode::SlotBased).unwrap_err();
    let ScheduleError::Infeasible { diagnosis } = err else {
        panic!("expected an infeasibility diagnosis, got {err}");
    };
    assert_eq!(diagnosis.binding_group, Some(ConstraintGroup::MinimumRest));
    assert_eq!(
        diagnosis.binding_group.map(ConstraintGroup::label),
        Some("rest constraint")
    );
    assert_eq!(diagnosis.entities, vec!["alice".to_string()]);
    assert_eq!(diagnosis.steps[0].group, ConstraintGroup::MinimumRest);
    assert!(!diagnosis.suggestions.is_empty());
}

#[test]
fn direct_diagnosis_agrees_with_the_solve() {
    let engine = Engine::new();
    let diagnosis = engine
        .diagnose(&rest_conflict(), &SchedulingMode::SlotBased)
        .unwrap()
        .expect("infeasible");
    assert_eq!(diagnosis.binding_group, Some(ConstraintGroup::MinimumRest));
}

#[test]
fn enough_rest_makes_the_pins_feasible() {
    let snapshot = rest_conflict().rules(Rules {
        min_rest_slots: 1,
        ..Rules::default()
    });
    let schedule = solve(&snapshot, &SchedulingMode::SlotBased).expect("feasible");
    let slots: Vec<Period> = schedule.assignments.iter().map(|a| a.period).collect();
    assert!(slots.contains(&Period::Slot(1)));
    assert!(slots.contains(&Period::Slot(3)));
}

// ============================================================================
// Fixed-shift mode
// ============================================================================

fn two_shift_rules() -> Rules {
    Rules {
        fixed_shifts: true,
        shifts_per_day: Some(2),
        ..Rules::default()
    }
}

#[test]
fn fixed_shift_mode_rejects_slot_availability() {
    let snapshot = Snapshot::new("diner", Horizon::single_day(8))
        .rules(two_shift_rules())
        .role(Role::new("server").producing(8.0))
        .employee(Employee::new("dee").role("server").available_everywhere(1, 8));
    let mode = SchedulingMode::from_rules(&snapshot.rules).unwrap();

    let err = solve(&snapshot, &mode).unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::InvalidRules(RulesError::GridFormMismatch {
            expected: GridForm::Shifts,
            found: GridForm::Slots,
            ..
        })
    ));
}

#[test]
fn slot_mode_with_fixed_shift_rules_is_a_mismatch() {
    let snapshot = Snapshot::new("diner", Horizon::single_day(8))
        .rules(two_shift_rules())
        .role(Role::new("server").producing(8.0))
        .employee(Employee::new("dee").role("server").available_everywhere(1, 8));

    let err = solve(&snapshot, &SchedulingMode::SlotBased).unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::InvalidRules(RulesError::ModeMismatch { .. })
    ));
}

#[test]
fn contradictory_rules_fail_before_solving() {
    let snapshot = two_baristas(vec![1.0, 1.0, 1.0]).rules(Rules {
        fixed_shifts: true,
        shifts_per_day: None,
        ..Rules::default()
    });
    let err = SchedulingMode::from_rules(&snapshot.rules).unwrap_err();
    assert_eq!(err, RulesError::MissingShiftCount);
}
