//! Exit code integration tests
//!
//! ## Exit Code Contract
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0 | Success: schedule generated, or snapshot feasible |
//! | 1 | Failure: unreadable input, invalid rules, solver error |
//! | 2 | Infeasible: no schedule satisfies the hard rules |
//! | 3 | Timeout: budget exhausted before a schedule or feasibility was proven |
//!
//! `--format=json` never changes the exit code.

use std::path::PathBuf;
use std::process::{Command, Output};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn staffplan(args: &[&str], fixture: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_staffplan"))
        .args(args)
        .arg(fixtures_dir().join(fixture))
        .output()
        .expect("failed to execute staffplan")
}

fn exit_code(args: &[&str], fixture: &str) -> i32 {
    staffplan(args, fixture).status.code().unwrap_or(-1)
}

// =============================================================================
// check
// =============================================================================

#[test]
fn check_valid_snapshot_exits_0() {
    let output = staffplan(&["check"], "cafe.json");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Mode: slot_based"), "{stdout}");
    assert!(stdout.contains("variables"));
    assert!(stdout.contains("capacity"));
}

#[test]
fn check_missing_shift_count_exits_1() {
    let output = staffplan(&["check"], "missing_shift_count.json");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid rules"), "{stderr}");
}

#[test]
fn check_malformed_json_exits_1() {
    let output = staffplan(&["check"], "malformed.json");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse snapshot"), "{stderr}");
}

#[test]
fn check_missing_file_exits_1() {
    assert_eq!(exit_code(&["check"], "does_not_exist.json"), 1);
}

// =============================================================================
// solve
// =============================================================================

#[test]
fn solve_feasible_exits_0() {
    let output = staffplan(&["solve"], "cafe.json");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Status: OPTIMAL"), "{stdout}");
    assert!(stdout.contains("alice"));
    assert!(stdout.contains("bob"));
    assert!(stdout.contains("09:00 - 10:00"));
}

#[test]
fn solve_infeasible_exits_2() {
    let output = staffplan(&["solve"], "bakery_rest.json");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("rest constraint"), "{stdout}");
}

#[test]
fn solve_infeasible_json_exits_2() {
    assert_eq!(exit_code(&["solve", "--format", "json"], "bakery_rest.json"), 2);
}

#[test]
fn solve_invalid_rules_exits_1() {
    assert_eq!(exit_code(&["solve"], "missing_shift_count.json"), 1);
}

#[test]
fn solve_zero_budget_never_hangs() {
    // A zero budget either still proves the tiny model or stops with a timeout
    let code = exit_code(&["solve", "--budget-ms", "0"], "cafe.json");
    assert!(code == 0 || code == 3, "unexpected exit code {code}");
}

// =============================================================================
// diagnose
// =============================================================================

#[test]
fn diagnose_feasible_exits_0() {
    let output = staffplan(&["diagnose"], "cafe.json");
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Feasible"));
}

#[test]
fn diagnose_infeasible_exits_2() {
    let output = staffplan(&["diagnose"], "bakery_rest.json");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Relaxation steps"), "{stdout}");
    assert!(stdout.contains("Suggestions"));
}

#[test]
fn diagnose_out_of_budget_is_never_infeasible() {
    // A feasible snapshot either still proves feasible or stops with a timeout
    let config = fixtures_dir().join("zero_diagnostics_budget.toml");
    let output = Command::new(env!("CARGO_BIN_EXE_staffplan"))
        .arg("diagnose")
        .arg("--config")
        .arg(config)
        .arg(fixtures_dir().join("cafe.json"))
        .output()
        .expect("failed to execute staffplan");
    let code = output.status.code().unwrap_or(-1);
    assert!(code == 0 || code == 3, "unexpected exit code {code}");
}
