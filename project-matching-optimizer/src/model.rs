//! A small solver-independent MILP representation.
//!
//! Every backend reads this: the in-process `good_lp` adapters translate it, the
//! command-line adapters and the offline export write it as LP or MPS. Rebuilding a
//! model from the same inputs yields the same variable and constraint order, which is
//! what makes reading an offline solution back meaningful.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Integer,
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: Option<f64>,
}

/// Column order and row count of a model.
///
/// MPS solutions name columns by position, so a solution only applies to a model of
/// exactly this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelShape {
    pub variables: Vec<String>,
    pub constraints: usize,
}

impl ModelShape {
    pub fn ensure_matches(&self, rebuilt: &Self) -> Result<()> {
        if let Some((position, (exported, current))) = self
            .variables
            .iter()
            .zip(&rebuilt.variables)
            .enumerate()
            .find(|(_, (exported, current))| exported != current)
        {
            return Err(OptimizerError::Integrity(format!(
                "column {position} was {exported} at export but is now {current}"
            )));
        }
        if self.variables.len() != rebuilt.variables.len() {
            return Err(OptimizerError::Integrity(format!(
                "model had {} columns at export but now has {}",
                self.variables.len(),
                rebuilt.variables.len()
            )));
        }
        if self.constraints != rebuilt.constraints {
            return Err(OptimizerError::Integrity(format!(
                "model had {} rows at export but now has {}",
                self.constraints, rebuilt.constraints
            )));
        }
        Ok(())
    }
}

/// `Σ coefficient · variable + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: BTreeMap<VarId, f64>,
    constant: f64,
}

impl LinExpr {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    #[must_use]
    pub fn var(var: VarId) -> Self {
        let mut expr = Self::new();
        expr.add(var, 1.0);
        expr
    }

    /// Sum of the variables, each with coefficient 1.
    pub fn sum<I: IntoIterator<Item = VarId>>(vars: I) -> Self {
        let mut expr = Self::new();
        for var in vars {
            expr.add(var, 1.0);
        }
        expr
    }

    pub fn add(&mut self, var: VarId, coefficient: f64) -> &mut Self {
        let entry = self.terms.entry(var).or_insert(0.0);
        *entry += coefficient;
        if *entry == 0.0 {
            self.terms.remove(&var);
        }
        self
    }

    pub fn add_constant(&mut self, value: f64) -> &mut Self {
        self.constant += value;
        self
    }

    /// `self += factor · other`
    pub fn add_scaled(&mut self, other: &Self, factor: f64) -> &mut Self {
        for (var, coefficient) in &other.terms {
            self.add(*var, coefficient * factor);
        }
        self.constant += other.constant * factor;
        self
    }

    #[must_use]
    pub fn scaled(mut self, factor: f64) -> Self {
        for coefficient in self.terms.values_mut() {
            *coefficient *= factor;
        }
        self.constant *= factor;
        self
    }

    pub fn terms(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.terms.iter().map(|(var, coefficient)| (*var, *coefficient))
    }

    #[must_use]
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms.get(&var).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub const fn constant_term(&self) -> f64 {
        self.constant
    }

    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    #[must_use]
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coefficient)| coefficient * values[var.0])
            .sum::<f64>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEqual,
    GreaterEqual,
    Equal,
}

impl Relation {
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        const TOLERANCE: f64 = 1e-9;
        match self {
            Self::LessEqual => lhs <= rhs + TOLERANCE,
            Self::GreaterEqual => lhs + TOLERANCE >= rhs,
            Self::Equal => (lhs - rhs).abs() <= TOLERANCE,
        }
    }
}

/// `expr relation rhs`, with all constants moved into `rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinExpr,
    pub relation: Relation,
    pub rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Maximise,
    Minimise,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub sense: Sense,
    pub objective: LinExpr,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
}

impl Model {
    #[must_use]
    pub fn new(name: impl Into<String>, sense: Sense) -> Self {
        Self {
            name: name.into(),
            sense,
            objective: LinExpr::new(),
            variables: Vec::new(),
            constraints: Vec::new(),
        }
    }

    fn push(&mut self, variable: Variable) -> VarId {
        self.variables.push(variable);
        VarId(self.variables.len() - 1)
    }

    pub fn binary(&mut self, name: impl Into<String>) -> VarId {
        self.push(Variable {
            name: name.into(),
            kind: VarKind::Binary,
            lower: 0.0,
            upper: Some(1.0),
        })
    }

    pub fn integer(&mut self, name: impl Into<String>, lower: f64, upper: Option<f64>) -> VarId {
        self.push(Variable {
            name: name.into(),
            kind: VarKind::Integer,
            lower,
            upper,
        })
    }

    pub fn continuous(&mut self, name: impl Into<String>, lower: f64, upper: Option<f64>) -> VarId {
        self.push(Variable {
            name: name.into(),
            kind: VarKind::Continuous,
            lower,
            upper,
        })
    }

    /// Add `lhs relation rhs`.
    ///
    /// A constraint that ends up without variables is decided right here: dropped
    /// when it holds, an error when it cannot.
    pub fn constrain(
        &mut self,
        name: impl Into<String>,
        lhs: LinExpr,
        relation: Relation,
        rhs: LinExpr,
    ) -> Result<()> {
        let name = name.into();
        let mut expr = lhs;
        expr.add_scaled(&rhs, -1.0);
        let rhs = if expr.constant == 0.0 {
            0.0
        } else {
            -expr.constant
        };
        expr.constant = 0.0;

        if expr.is_constant() {
            return if relation.holds(0.0, rhs) {
                Ok(())
            } else {
                Err(OptimizerError::InfeasibleConstraint(name))
            };
        }
        self.constraints.push(Constraint {
            name,
            expr,
            relation,
            rhs,
        });
        Ok(())
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[must_use]
    pub fn variable(&self, var: VarId) -> &Variable {
        &self.variables[var.0]
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    #[must_use]
    pub fn shape(&self) -> ModelShape {
        ModelShape {
            variables: self.variables.iter().map(|variable| variable.name.clone()).collect(),
            constraints: self.constraints.len(),
        }
    }

    /// Lookup table from LP variable name to id.
    #[must_use]
    pub fn names(&self) -> HashMap<&str, VarId> {
        self.variables
            .iter()
            .enumerate()
            .map(|(index, variable)| (variable.name.as_str(), VarId(index)))
            .collect()
    }

    /// Identifier of a column in the MPS export, which renames to stay within
    /// fixed-width limits.
    #[must_use]
    pub fn column_name(var: VarId) -> String {
        format!("C{:07}", var.0)
    }

    #[must_use]
    pub fn row_name(row: usize) -> String {
        format!("R{row:07}")
    }

    /// Lookup table from MPS column identifier to id.
    #[must_use]
    pub fn column_names(&self) -> HashMap<String, VarId> {
        (0..self.variables.len())
            .map(|index| (Self::column_name(VarId(index)), VarId(index)))
            .collect()
    }

    /// Whether `values` satisfies every bound, integrality and constraint.
    #[must_use]
    pub fn is_feasible(&self, values: &[f64]) -> bool {
        const TOLERANCE: f64 = 1e-6;
        if values.len() != self.variables.len() {
            return false;
        }
        let bounds = self.variables.iter().zip(values).all(|(variable, value)| {
            let integral = variable.kind == VarKind::Continuous
                || (value - value.round()).abs() <= TOLERANCE;
            integral
                && *value + TOLERANCE >= variable.lower
                && variable.upper.map_or(true, |upper| *value <= upper + TOLERANCE)
        });
        bounds
            && self.constraints.iter().all(|constraint| {
                let lhs = constraint.expr.evaluate(values);
                match constraint.relation {
                    Relation::LessEqual => lhs <= constraint.rhs + TOLERANCE,
                    Relation::GreaterEqual => lhs + TOLERANCE >= constraint.rhs,
                    Relation::Equal => (lhs - constraint.rhs).abs() <= TOLERANCE,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::{LinExpr, Model, Relation, Sense};
    use crate::error::OptimizerError;

    #[test]
    fn constants_move_to_the_right_hand_side() {
        let mut model = Model::new("test", Sense::Maximise);
        let x = model.binary("x");
        let y = model.binary("y");
        let mut lhs = LinExpr::sum([x, y]);
        lhs.add_constant(2.0);
        model
            .constrain("c", lhs, Relation::LessEqual, LinExpr::constant(3.0))
            .unwrap();

        let constraint = &model.constraints()[0];
        assert!((constraint.rhs - 1.0).abs() < f64::EPSILON);
        assert!((constraint.expr.coefficient(x) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cancelling_terms_disappear() {
        let mut model = Model::new("test", Sense::Maximise);
        let x = model.binary("x");
        model
            .constrain("c", LinExpr::var(x), Relation::Equal, LinExpr::var(x))
            .unwrap();
        assert!(model.constraints().is_empty());
    }

    #[test]
    fn unsatisfiable_constant_constraint_is_rejected() {
        let mut model = Model::new("test", Sense::Maximise);
        let result = model.constrain(
            "impossible",
            LinExpr::new(),
            Relation::Equal,
            LinExpr::constant(1.0),
        );
        assert_matches!(result, Err(OptimizerError::InfeasibleConstraint(name)) if name == "impossible");
    }

    #[test]
    fn feasibility_check_respects_integrality() {
        let mut model = Model::new("test", Sense::Maximise);
        let x = model.integer("x", 0.0, Some(3.0));
        model
            .constrain("c", LinExpr::var(x), Relation::GreaterEqual, LinExpr::constant(2.0))
            .unwrap();
        assert!(model.is_feasible(&[2.0]));
        assert!(!model.is_feasible(&[2.5]));
        assert!(!model.is_feasible(&[1.0]));
        assert!(!model.is_feasible(&[4.0]));
    }

    #[test]
    fn mps_identifiers_are_fixed_width() {
        let mut model = Model::new("test", Sense::Minimise);
        let x = model.continuous("a_rather_long_variable_name", 0.0, None);
        assert_eq!(Model::column_name(x), "C0000000");
        assert_eq!(Model::row_name(12), "R0000012");
    }

    #[test]
    fn shapes_differ_when_a_column_shifts() {
        let mut exported = Model::new("test", Sense::Maximise);
        exported.binary("X_0_0");
        exported.binary("X_1_0");
        let mut rebuilt = Model::new("test", Sense::Maximise);
        rebuilt.binary("X_0_0");
        rebuilt.binary("X_0_2");
        rebuilt.binary("X_1_0");

        assert!(exported.shape().ensure_matches(&exported.shape()).is_ok());
        assert_matches!(
            exported.shape().ensure_matches(&rebuilt.shape()),
            Err(OptimizerError::Integrity(message)) if message.contains("X_0_2")
        );

        let mut extended = exported.clone();
        extended.binary("Z_0");
        assert_matches!(
            exported.shape().ensure_matches(&extended.shape()),
            Err(OptimizerError::Integrity(_))
        );
    }
}
