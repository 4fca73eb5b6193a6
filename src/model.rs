//! Pseudo-boolean constraint system.
//!
//! Every decision in the tournament model is a 0/1 variable and every rule is
//! a linear inequality or equality over them, so the model is a plain list of
//! `sum(coef * var) <= rhs` / `== rhs` rows plus a linear objective. Both
//! search backends consume this representation.

use std::collections::BTreeMap;
use std::fmt;

/// Handle to a boolean variable of a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u32);

impl Var {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEq,
    Equal,
}

/// The rule family a row was posted for. Used for logging and for
/// inspecting the model in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKind {
    StationBusySubjective,
    StationBusyPerformance,
    StationStartSubjective,
    StationStartPerformance,
    DurationSubjective,
    DurationPerformance,
    EndOfSchedule,
    NoOverlapSubjective,
    NoOverlapPerformance,
    TeamSubjective,
    TeamPerformance,
    BothSides,
    ChangetimeSubjSubj,
    ChangetimeSubjPerf,
    ChangetimePerfPerf,
    PerformanceWarmup,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A linear expression over boolean variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinExpr {
    terms: Vec<(Var, i64)>,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, var: Var, coef: i64) -> &mut Self {
        self.terms.push((var, coef));
        self
    }

    pub fn plus(mut self, var: Var) -> Self {
        self.terms.push((var, 1));
        self
    }

    pub fn minus(mut self, var: Var) -> Self {
        self.terms.push((var, -1));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Merges repeated variables and drops zero coefficients.
    fn normalized(self) -> Vec<(Var, i64)> {
        let mut merged: BTreeMap<Var, i64> = BTreeMap::new();
        for (var, coef) in self.terms {
            *merged.entry(var).or_insert(0) += coef;
        }
        merged.into_iter().filter(|&(_, coef)| coef != 0).collect()
    }
}

impl FromIterator<Var> for LinExpr {
    fn from_iter<I: IntoIterator<Item = Var>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().map(|v| (v, 1)).collect(),
        }
    }
}

impl Extend<Var> for LinExpr {
    fn extend<I: IntoIterator<Item = Var>>(&mut self, iter: I) {
        self.terms.extend(iter.into_iter().map(|v| (v, 1)));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConstraint {
    pub kind: ConstraintKind,
    pub terms: Vec<(Var, i64)>,
    pub relation: Relation,
    pub rhs: i64,
}

impl LinearConstraint {
    pub fn lhs(&self, values: &[bool]) -> i64 {
        self.terms
            .iter()
            .filter(|(var, _)| values[var.index()])
            .map(|(_, coef)| coef)
            .sum()
    }

    pub fn is_satisfied(&self, values: &[bool]) -> bool {
        let lhs = self.lhs(values);
        match self.relation {
            Relation::LessEq => lhs <= self.rhs,
            Relation::Equal => lhs == self.rhs,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    names: Vec<String>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<(Var, i64)>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_bool(&mut self, name: impl Into<String>) -> Var {
        let var = Var(self.names.len() as u32);
        self.names.push(name.into());
        var
    }

    pub fn num_vars(&self) -> usize {
        self.names.len()
    }

    pub fn name(&self, var: Var) -> &str {
        &self.names[var.index()]
    }

    /// All variables in creation order.
    pub fn vars(&self) -> impl Iterator<Item = Var> + '_ {
        (0..self.names.len() as u32).map(Var)
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &[(Var, i64)] {
        &self.objective
    }

    pub fn post(&mut self, kind: ConstraintKind, expr: LinExpr, relation: Relation, rhs: i64) {
        self.constraints.push(LinearConstraint {
            kind,
            terms: expr.normalized(),
            relation,
            rhs,
        });
    }

    pub fn at_most(&mut self, kind: ConstraintKind, expr: LinExpr, rhs: i64) {
        self.post(kind, expr, Relation::LessEq, rhs);
    }

    pub fn exactly(&mut self, kind: ConstraintKind, expr: LinExpr, rhs: i64) {
        self.post(kind, expr, Relation::Equal, rhs);
    }

    pub fn set_objective(&mut self, expr: LinExpr) {
        self.objective = expr.normalized();
    }

    pub fn objective_value(&self, values: &[bool]) -> i64 {
        self.objective
            .iter()
            .filter(|(var, _)| values[var.index()])
            .map(|(_, coef)| coef)
            .sum()
    }

    pub fn count_by_kind(&self) -> BTreeMap<ConstraintKind, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.constraints {
            *counts.entry(c.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// A complete 0/1 assignment produced by a search backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    values: Vec<bool>,
    objective: i64,
}

impl Solution {
    pub fn new(values: Vec<bool>, objective: i64) -> Self {
        Self { values, objective }
    }

    pub fn value(&self, var: Var) -> bool {
        self.values[var.index()]
    }

    pub fn values(&self) -> &[bool] {
        &self.values
    }

    pub fn objective(&self) -> i64 {
        self.objective
    }

    /// Rows of `model` this assignment breaks.
    pub fn violations<'m>(&self, model: &'m Model) -> Vec<&'m LinearConstraint> {
        model
            .constraints()
            .iter()
            .filter(|c| !c.is_satisfied(&self.values))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_repeated_terms() {
        let mut model = Model::new();
        let a = model.new_bool("a");
        let b = model.new_bool("b");
        let expr = LinExpr::new().plus(a).plus(b).minus(a).plus(b);
        model.at_most(ConstraintKind::BothSides, expr, 1);

        let row = &model.constraints()[0];
        assert_eq!(row.terms, vec![(b, 2)]);
        assert!(row.is_satisfied(&[true, false]));
        assert!(!row.is_satisfied(&[false, true]));
    }

    #[test]
    fn evaluates_objective() {
        let mut model = Model::new();
        let vars: Vec<Var> = (0..3).map(|i| model.new_bool(format!("x{i}"))).collect();
        let mut expr = LinExpr::new();
        for (t, &v) in vars.iter().enumerate() {
            expr.add(v, t as i64);
        }
        model.set_objective(expr);

        assert_eq!(model.objective().len(), 2);
        assert_eq!(model.objective_value(&[true, true, true]), 3);
        assert_eq!(model.objective_value(&[false, false, true]), 2);
    }

    #[test]
    fn counts_rows_per_kind() {
        let mut model = Model::new();
        let a = model.new_bool("a");
        model.exactly(ConstraintKind::TeamSubjective, LinExpr::from_iter([a]), 1);
        model.exactly(ConstraintKind::TeamSubjective, LinExpr::new(), 1);
        model.at_most(ConstraintKind::PerformanceWarmup, LinExpr::new(), 0);

        let counts = model.count_by_kind();
        assert_eq!(counts[&ConstraintKind::TeamSubjective], 2);
        assert_eq!(counts[&ConstraintKind::PerformanceWarmup], 1);
    }
}
