//! # staffplan-solver
//!
//! Staff schedule optimization over a constraint-programming backend.
//!
//! This crate provides:
//! - Model building for slot-based and fixed-shift scheduling
//! - A tiered objective (unmet demand, wage cost, preferred hours, fairness,
//!   preferences)
//! - A swappable solver backend behind `SolverBackend`
//! - Decoding with an independent audit of every hard rule
//! - Feasibility diagnostics by group relaxation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use staffplan_core::{ObjectiveWeights, SchedulingMode, Snapshot};
//! use staffplan_solver::generate_schedule;
//!
//! let snapshot: Snapshot = serde_json::from_str(&json)?;
//! let mode = SchedulingMode::from_rules(&snapshot.rules)?;
//! let schedule = generate_schedule(
//!     &snapshot,
//!     &mode,
//!     &ObjectiveWeights::default(),
//!     Duration::from_secs(30),
//! )?;
//! ```

pub mod adapter;
pub mod builder;
#[cfg(feature = "cp-backend")]
pub mod cp;
pub mod decoder;
pub mod diagnostics;
mod engine;
pub mod insights;
pub mod model;
pub mod objective;
pub mod plan;

pub use adapter::{BackendError, CancellationToken, RawSolution, SolveBudget, SolverBackend};
pub use builder::{build, Layout, ScheduleModel};
#[cfg(feature = "cp-backend")]
pub use cp::CpBackend;
pub use decoder::{decode, Decoded};
#[cfg(feature = "cp-backend")]
pub use engine::generate_schedule;
pub use engine::{Engine, SolveHandle, SolveRequest};
pub use model::{Model, ModelStats, Sense, VarId};
pub use objective::{compose, Objective, Tier};
pub use plan::Plan;
