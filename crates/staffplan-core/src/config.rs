//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! time_budget_ms = 30000
//! diagnostics_budget_ms = 2000
//!
//! [weights]
//! unmet_demand = 100
//! wage_cost = 1
//! hours_deviation = 100
//! fairness = 20
//! preference_reward = 5
//!
//! [insights]
//! persistent_unmet_min_days = 2
//! outreach_fraction = 0.75
//! bottleneck_recurrence = 0.6
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::RulesError;

/// Configuration loading error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Objective weights, one per tier, heaviest first.
///
/// Tiers are meant to dominate one another in this order:
/// unmet demand, wage cost, hours deviation, fairness, preference reward.
/// Reordering the magnitudes changes who gets scheduled, so keep the order
/// unless that is the intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    /// Per hundredth of an item of unmet demand
    pub unmet_demand: i64,
    /// Per cent of wage cost
    pub wage_cost: i64,
    /// Per slot an employee's hours deviate from their preferred hours
    pub hours_deviation: i64,
    /// Per unit of fairness spread (slots times employee count)
    pub fairness: i64,
    /// Reward per preferred period worked
    pub preference_reward: i64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            unmet_demand: 100,
            wage_cost: 1,
            hours_deviation: 100,
            fairness: 20,
            preference_reward: 5,
        }
    }
}

impl ObjectiveWeights {
    fn tiers(&self) -> [(&'static str, i64); 5] {
        [
            ("unmet_demand", self.unmet_demand),
            ("wage_cost", self.wage_cost),
            ("hours_deviation", self.hours_deviation),
            ("fairness", self.fairness),
            ("preference_reward", self.preference_reward),
        ]
    }

    /// Reject negative weights.
    ///
    /// Tier dominance depends on the value ranges of a concrete model, so it
    /// is checked where the objective is composed, not here.
    pub fn validate(&self) -> Result<(), RulesError> {
        for (tier, value) in self.tiers() {
            if value < 0 {
                return Err(RulesError::InvalidWeight { tier, value });
            }
        }
        Ok(())
    }
}

/// Thresholds for operator-facing insights
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightThresholds {
    /// Days a slot must be short before a hiring recommendation is raised
    pub persistent_unmet_min_days: usize,
    /// Employees scheduled below this fraction of preferred hours get outreach
    pub outreach_fraction: f64,
    /// Share of active periods a stage must bottleneck to suggest rebalancing
    pub bottleneck_recurrence: f64,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            persistent_unmet_min_days: 2,
            outreach_fraction: 0.75,
            bottleneck_recurrence: 0.6,
        }
    }
}

/// Engine-wide configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: ObjectiveWeights,
    /// Wall-clock budget of the main solve
    pub time_budget_ms: u64,
    /// Budget of each diagnostics re-solve
    pub diagnostics_budget_ms: u64,
    pub insights: InsightThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: ObjectiveWeights::default(),
            time_budget_ms: 30_000,
            diagnostics_budget_ms: 2_000,
            insights: InsightThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn time_budget(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.time_budget_ms)
    }

    pub fn diagnostics_budget(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.diagnostics_budget_ms)
    }
}
