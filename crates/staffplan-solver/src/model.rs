//! Solver-independent integer model.
//!
//! The builder emits bounded integer variables and linear constraints, each
//! constraint tagged with the `ConstraintGroup` it belongs to. Backends only
//! ever see this representation, which keeps the concrete engine swappable.

use staffplan_core::ConstraintGroup;
use std::collections::{BTreeMap, BTreeSet};

/// Handle to a model variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A bounded integer variable
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub lower: i64,
    pub upper: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sense {
    /// `lhs <= rhs`
    Le,
    /// `lhs >= rhs`
    Ge,
    /// `lhs == rhs`
    Eq,
}

/// `sum(coeff * var) <sense> rhs`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearConstraint {
    pub group: ConstraintGroup,
    pub label: String,
    pub terms: Vec<(VarId, i64)>,
    pub sense: Sense,
    pub rhs: i64,
}

impl LinearConstraint {
    pub fn lhs(&self, values: &[i64]) -> i64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[var.0])
            .sum()
    }

    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        let lhs = self.lhs(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs,
            Sense::Ge => lhs >= self.rhs,
            Sense::Eq => lhs == self.rhs,
        }
    }
}

/// Size summary, mostly for logging
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelStats {
    pub variables: usize,
    pub constraints: usize,
    pub per_group: BTreeMap<ConstraintGroup, usize>,
}

/// Variables plus grouped linear constraints
#[derive(Clone, Debug, Default)]
pub struct Model {
    variables: Vec<Variable>,
    constraints: Vec<LinearConstraint>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, name: impl Into<String>, lower: i64, upper: i64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name: name.into(),
            lower,
            upper: upper.max(lower),
        });
        id
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, 0, 1)
    }

    /// Add a constraint; duplicate variables are merged and zero terms dropped
    pub fn add_constraint(
        &mut self,
        group: ConstraintGroup,
        label: impl Into<String>,
        terms: impl IntoIterator<Item = (VarId, i64)>,
        sense: Sense,
        rhs: i64,
    ) {
        let mut merged: BTreeMap<VarId, i64> = BTreeMap::new();
        for (var, coeff) in terms {
            *merged.entry(var).or_insert(0) += coeff;
        }
        let terms = merged.into_iter().filter(|(_, c)| *c != 0).collect();
        self.constraints.push(LinearConstraint {
            group,
            label: label.into(),
            terms,
            sense,
            rhs,
        });
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn groups(&self) -> BTreeSet<ConstraintGroup> {
        self.constraints.iter().map(|c| c.group).collect()
    }

    pub fn has_group(&self, group: ConstraintGroup) -> bool {
        self.constraints.iter().any(|c| c.group == group)
    }

    /// Copy of the model without the given constraint groups
    pub fn relaxed(&self, groups: &[ConstraintGroup]) -> Model {
        Model {
            variables: self.variables.clone(),
            constraints: self
                .constraints
                .iter()
                .filter(|c| !groups.contains(&c.group))
                .cloned()
                .collect(),
        }
    }

    /// First constraint the assignment violates, bounds included
    pub fn first_violation(&self, values: &[i64]) -> Option<String> {
        if values.len() != self.variables.len() {
            return Some(format!(
                "expected {} values, got {}",
                self.variables.len(),
                values.len()
            ));
        }
        for (var, value) in self.variables.iter().zip(values) {
            if *value < var.lower || *value > var.upper {
                return Some(format!(
                    "{} = {value} outside [{}, {}]",
                    var.name, var.lower, var.upper
                ));
            }
        }
        self.constraints
            .iter()
            .find(|c| !c.is_satisfied(values))
            .map(|c| format!("{} ({})", c.label, c.group))
    }

    pub fn stats(&self) -> ModelStats {
        let mut per_group = BTreeMap::new();
        for constraint in &self.constraints {
            *per_group.entry(constraint.group).or_insert(0) += 1;
        }
        ModelStats {
            variables: self.variables.len(),
            constraints: self.constraints.len(),
            per_group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_terms_are_merged() {
        let mut model = Model::new();
        let x = model.add_binary("x");
        let y = model.add_binary("y");
        model.add_constraint(
            ConstraintGroup::Capacity,
            "c",
            [(x, 2), (y, 1), (x, -2)],
            Sense::Le,
            1,
        );
        assert_eq!(model.constraints()[0].terms, vec![(y, 1)]);
    }

    #[test]
    fn relaxing_drops_only_named_groups() {
        let mut model = Model::new();
        let x = model.add_binary("x");
        model.add_constraint(ConstraintGroup::MinimumRest, "rest", [(x, 1)], Sense::Le, 0);
        model.add_constraint(ConstraintGroup::Capacity, "cap", [(x, 1)], Sense::Le, 1);
        let relaxed = model.relaxed(&[ConstraintGroup::MinimumRest]);
        assert_eq!(relaxed.constraints().len(), 1);
        assert!(!relaxed.has_group(ConstraintGroup::MinimumRest));
        assert_eq!(relaxed.variables().len(), 1);
    }

    #[test]
    fn violations_report_label_and_group() {
        let mut model = Model::new();
        let x = model.add_binary("x");
        model.add_constraint(ConstraintGroup::Availability, "avail[a,0]", [(x, 1)], Sense::Le, 0);
        assert_eq!(model.first_violation(&[0]), None);
        let violation = model.first_violation(&[1]).unwrap();
        assert!(violation.contains("avail[a,0]"));
        assert!(violation.contains("availability"));
    }
}
