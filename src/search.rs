//! Depth-first branch-and-bound over 0/1 assignments.
//!
//! Variables are branched in creation order, `0` before `1`. After every
//! assignment each affected row is re-examined with bounds reasoning: a row
//! `sum(a * x) <= rhs` whose slack `rhs - min(lhs)` is smaller than `|a|` fixes
//! `x` to the value that keeps the row satisfiable, and symmetrically for the
//! lower side of equalities. The objective is kept as one more `<=` row whose
//! right-hand side drops to `best - 1` each time a complete assignment is
//! found, so the search only accepts strictly better solutions afterwards.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::model::{Model, Relation, Solution, Var};

/// Shared flag to abort a running search from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Budget for one search. Unset limits do not apply.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    /// Maximum number of branching decisions.
    pub node_limit: Option<u64>,
    pub time_limit: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl SearchLimits {
    fn exceeded(&self, nodes: u64, started: Instant) -> Option<StopReason> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(StopReason::Cancelled);
        }
        if self.node_limit.is_some_and(|limit| nodes >= limit) {
            return Some(StopReason::NodeLimit);
        }
        // clock sampled every 64 nodes
        if nodes % 64 == 0 && self.time_limit.is_some_and(|limit| started.elapsed() >= limit) {
            return Some(StopReason::TimeLimit);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NodeLimit,
    TimeLimit,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    NotStarted,
    Searching,
    Solved,
    Infeasible,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,
    pub failures: u64,
    pub solutions: u64,
    pub elapsed: Duration,
    /// The whole tree was explored, so the result is proven.
    pub exhausted: bool,
    pub stopped_by: Option<StopReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Best assignment found. `optimal` holds when the search space was
    /// exhausted after finding it.
    Solved { solution: Solution, optimal: bool },
    Infeasible,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub outcome: SearchOutcome,
    pub stats: SearchStats,
}

impl SearchResult {
    pub fn state(&self) -> SearchState {
        match self.outcome {
            SearchOutcome::Solved { .. } => SearchState::Solved,
            SearchOutcome::Infeasible => SearchState::Infeasible,
        }
    }
}

/// Incremental bounds of one row under the current partial assignment.
struct Row<'m> {
    terms: &'m [(Var, i64)],
    relation: Relation,
    rhs: i64,
    /// Lowest reachable left-hand side.
    min: i64,
    /// Highest reachable left-hand side.
    max: i64,
    max_abs: i64,
}

impl<'m> Row<'m> {
    fn new(terms: &'m [(Var, i64)], relation: Relation, rhs: i64) -> Self {
        Self {
            terms,
            relation,
            rhs,
            min: terms.iter().map(|&(_, a)| a.min(0)).sum(),
            max: terms.iter().map(|&(_, a)| a.max(0)).sum(),
            max_abs: terms.iter().map(|&(_, a)| a.abs()).max().unwrap_or(0),
        }
    }
}

struct Choice {
    var: Var,
    position: usize,
    trail_len: usize,
    value: bool,
}

/// Backtracking engine over one [`Model`]. Solving consumes the engine, so a
/// model/engine pair is searched at most once.
pub struct SearchEngine<'m> {
    model: &'m Model,
    state: SearchState,
    values: Vec<Option<bool>>,
    trail: Vec<Var>,
    rows: Vec<Row<'m>>,
    occurs: Vec<Vec<(usize, i64)>>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
    objective_row: usize,
}

impl<'m> SearchEngine<'m> {
    pub fn new(model: &'m Model) -> Self {
        let mut rows: Vec<Row<'m>> = model
            .constraints()
            .iter()
            .map(|c| Row::new(&c.terms, c.relation, c.rhs))
            .collect();
        let mut objective = Row::new(model.objective(), Relation::LessEq, 0);
        // never binding until a first solution is known
        objective.rhs = objective.max;
        let objective_row = rows.len();
        rows.push(objective);

        let mut occurs = vec![Vec::new(); model.num_vars()];
        for (index, row) in rows.iter().enumerate() {
            for &(var, coef) in row.terms {
                occurs[var.index()].push((index, coef));
            }
        }

        let queued = vec![false; rows.len()];
        Self {
            model,
            state: SearchState::NotStarted,
            values: vec![None; model.num_vars()],
            trail: Vec::with_capacity(model.num_vars()),
            rows,
            occurs,
            queue: VecDeque::new(),
            queued,
            objective_row,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    fn enqueue(&mut self, row: usize) {
        if !self.queued[row] {
            self.queued[row] = true;
            self.queue.push_back(row);
        }
    }

    fn assign(&mut self, var: Var, value: bool) {
        self.values[var.index()] = Some(value);
        self.trail.push(var);
        for &(index, coef) in &self.occurs[var.index()] {
            let row = &mut self.rows[index];
            let fixed = if value { coef } else { 0 };
            row.min += fixed - coef.min(0);
            row.max += fixed - coef.max(0);
            if !self.queued[index] {
                self.queued[index] = true;
                self.queue.push_back(index);
            }
        }
    }

    fn undo_to(&mut self, trail_len: usize) {
        while self.trail.len() > trail_len {
            let Some(var) = self.trail.pop() else {
                break;
            };
            let value = self.values[var.index()].take().unwrap_or(false);
            for &(index, coef) in &self.occurs[var.index()] {
                let row = &mut self.rows[index];
                let fixed = if value { coef } else { 0 };
                row.min -= fixed - coef.min(0);
                row.max -= fixed - coef.max(0);
            }
        }
    }

    /// Runs the queue to a fixpoint. Returns `false` on a conflict.
    fn propagate(&mut self) -> bool {
        while let Some(index) = self.queue.pop_front() {
            self.queued[index] = false;
            if !self.propagate_row(index) {
                for stale in self.queue.drain(..) {
                    self.queued[stale] = false;
                }
                return false;
            }
        }
        true
    }

    fn propagate_row(&mut self, index: usize) -> bool {
        let row = &self.rows[index];
        let terms = row.terms;
        let has_lower = row.relation == Relation::Equal;

        if row.min > row.rhs || (has_lower && row.max < row.rhs) {
            return false;
        }
        let upper_slack = row.rhs - row.min;
        let lower_slack = if has_lower { row.max - row.rhs } else { i64::MAX };
        if upper_slack >= row.max_abs && lower_slack >= row.max_abs {
            return true;
        }

        for &(var, coef) in terms {
            if self.values[var.index()].is_some() {
                continue;
            }
            if coef.abs() > upper_slack {
                self.assign(var, coef < 0);
            } else if coef.abs() > lower_slack {
                self.assign(var, coef > 0);
            }
        }
        true
    }

    /// Pops choices until one still has its `1` branch open and takes it.
    /// Returns the order position to resume scanning from.
    fn backtrack(&mut self, stack: &mut Vec<Choice>) -> Option<usize> {
        while let Some(choice) = stack.pop() {
            self.undo_to(choice.trail_len);
            if choice.value {
                continue;
            }
            let (var, position) = (choice.var, choice.position);
            stack.push(Choice {
                value: true,
                ..choice
            });
            self.assign(var, true);
            self.enqueue(self.objective_row);
            return Some(position);
        }
        None
    }

    fn snapshot(&self) -> Solution {
        let values: Vec<bool> = self.values.iter().map(|v| v.unwrap_or(false)).collect();
        let objective = self.model.objective_value(&values);
        Solution::new(values, objective)
    }

    /// Searches until the tree is exhausted or `limits` stop it.
    pub fn solve(mut self, limits: &SearchLimits) -> SearchResult {
        let started = Instant::now();
        self.state = SearchState::Searching;
        info!(
            "Starting backtracking search over {} variables and {} constraints...",
            self.model.num_vars(),
            self.model.constraints().len()
        );

        let order: Vec<Var> = self.model.vars().collect();
        let mut stack: Vec<Choice> = Vec::new();
        let mut stats = SearchStats::default();
        let mut best: Option<Solution> = None;
        let mut position = 0;

        for index in 0..self.rows.len() {
            self.enqueue(index);
        }
        let mut consistent = self.propagate();

        loop {
            if !consistent {
                stats.failures += 1;
                match self.backtrack(&mut stack) {
                    Some(resume) => {
                        position = resume;
                        consistent = self.propagate();
                        continue;
                    }
                    None => {
                        stats.exhausted = true;
                        break;
                    }
                }
            }

            while position < order.len() && self.values[order[position].index()].is_some() {
                position += 1;
            }

            if position == order.len() {
                let solution = self.snapshot();
                debug_assert!(solution.violations(self.model).is_empty());
                stats.solutions += 1;
                trace!(
                    "Solution {} with objective {} after {} nodes",
                    stats.solutions,
                    solution.objective(),
                    stats.nodes
                );
                self.rows[self.objective_row].rhs = solution.objective() - 1;
                best = Some(solution);
                self.enqueue(self.objective_row);
                consistent = self.propagate();
                continue;
            }

            if let Some(reason) = limits.exceeded(stats.nodes, started) {
                debug!("Search stopped by {reason:?} after {} nodes", stats.nodes);
                stats.stopped_by = Some(reason);
                break;
            }

            let var = order[position];
            stats.nodes += 1;
            stack.push(Choice {
                var,
                position,
                trail_len: self.trail.len(),
                value: false,
            });
            self.assign(var, false);
            consistent = self.propagate();
        }

        stats.elapsed = started.elapsed();
        let outcome = match best {
            Some(solution) => {
                self.state = SearchState::Solved;
                SearchOutcome::Solved {
                    solution,
                    optimal: stats.exhausted,
                }
            }
            None => {
                self.state = SearchState::Infeasible;
                SearchOutcome::Infeasible
            }
        };
        info!(
            "Search finished as {:?} in {:.2?}: {} nodes, {} failures, {} solutions",
            self.state, stats.elapsed, stats.nodes, stats.failures, stats.solutions
        );

        SearchResult { outcome, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintKind, LinExpr};

    const KIND: ConstraintKind = ConstraintKind::TeamSubjective;

    fn weighted(vars: &[Var], weights: &[i64]) -> LinExpr {
        let mut expr = LinExpr::new();
        for (&v, &w) in vars.iter().zip(weights) {
            expr.add(v, w);
        }
        expr
    }

    fn choose_k(n: usize, k: i64) -> (Model, Vec<Var>) {
        let mut model = Model::new();
        let vars: Vec<Var> = (0..n).map(|i| model.new_bool(format!("x{i}"))).collect();
        model.exactly(KIND, vars.iter().copied().collect(), k);
        let weights: Vec<i64> = (0..n as i64).collect();
        model.set_objective(weighted(&vars, &weights));
        (model, vars)
    }

    #[test]
    fn finds_the_optimum() {
        let mut model = Model::new();
        let vars: Vec<Var> = ["a", "b", "c"].iter().map(|n| model.new_bool(*n)).collect();
        model.exactly(KIND, vars.iter().copied().collect(), 1);
        model.set_objective(weighted(&vars, &[3, 1, 2]));

        let engine = SearchEngine::new(&model);
        assert_eq!(engine.state(), SearchState::NotStarted);
        let result = engine.solve(&SearchLimits::default());

        assert_eq!(result.state(), SearchState::Solved);
        let SearchOutcome::Solved { solution, optimal } = result.outcome else {
            panic!("expected a solution");
        };
        assert!(optimal);
        assert!(result.stats.exhausted);
        assert_eq!(solution.objective(), 1);
        assert!(solution.value(vars[1]));
        assert_eq!(result.stats.solutions, 2);
    }

    #[test]
    fn prefers_zero_among_ties() {
        let mut model = Model::new();
        let x = model.new_bool("x");
        let y = model.new_bool("y");
        model.exactly(KIND, LinExpr::new().plus(x).plus(y), 1);

        let result = SearchEngine::new(&model).solve(&SearchLimits::default());
        let SearchOutcome::Solved { solution, .. } = result.outcome else {
            panic!("expected a solution");
        };
        assert!(!solution.value(x));
        assert!(solution.value(y));
    }

    #[test]
    fn detects_conflicting_rows() {
        let mut model = Model::new();
        let x = model.new_bool("x");
        let y = model.new_bool("y");
        model.at_most(KIND, LinExpr::new().plus(x).plus(y), 1);
        model.exactly(KIND, LinExpr::new().plus(x).plus(y), 2);

        let result = SearchEngine::new(&model).solve(&SearchLimits::default());
        assert_eq!(result.outcome, SearchOutcome::Infeasible);
        assert!(result.stats.exhausted);
        assert_eq!(result.stats.nodes, 0);
    }

    #[test]
    fn empty_row_with_positive_demand_is_infeasible() {
        let mut model = Model::new();
        model.new_bool("unused");
        model.exactly(KIND, LinExpr::new(), 1);

        let result = SearchEngine::new(&model).solve(&SearchLimits::default());
        assert_eq!(result.state(), SearchState::Infeasible);
    }

    #[test]
    fn implications_with_negative_coefficients() {
        // start -> busy for the next two slots, exactly one start
        let mut model = Model::new();
        let busy: Vec<Var> = (0..3).map(|t| model.new_bool(format!("y{t}"))).collect();
        let start: Vec<Var> = (0..3).map(|t| model.new_bool(format!("z{t}"))).collect();
        for t in 0..3usize {
            let mut expr: LinExpr = (0..2)
                .filter_map(|u| t.checked_sub(u))
                .map(|s| start[s])
                .collect();
            expr.add(busy[t], -1);
            model.at_most(KIND, expr, 0);
        }
        model.exactly(KIND, start.iter().copied().collect(), 1);
        model.exactly(KIND, busy.iter().copied().collect(), 2);
        model.exactly(KIND, LinExpr::from_iter([start[2]]), 0);
        model.set_objective(weighted(&busy, &[0, 1, 2]));

        let result = SearchEngine::new(&model).solve(&SearchLimits::default());
        let SearchOutcome::Solved { solution, optimal } = result.outcome else {
            panic!("expected a solution");
        };
        assert!(optimal);
        assert_eq!(solution.objective(), 1);
        assert!(solution.value(start[0]));
        assert!(solution.value(busy[0]) && solution.value(busy[1]));
        assert!(solution.violations(&model).is_empty());
    }

    #[test]
    fn node_limit_returns_best_so_far() {
        let (model, _) = choose_k(10, 5);

        let limits = SearchLimits {
            node_limit: Some(5),
            ..SearchLimits::default()
        };
        let result = SearchEngine::new(&model).solve(&limits);
        assert_eq!(result.stats.stopped_by, Some(StopReason::NodeLimit));
        let SearchOutcome::Solved { solution, optimal } = result.outcome else {
            panic!("expected a solution");
        };
        assert!(!optimal);
        assert_eq!(solution.objective(), 5 + 6 + 7 + 8 + 9);

        let result = SearchEngine::new(&model).solve(&SearchLimits::default());
        let SearchOutcome::Solved { solution, optimal } = result.outcome else {
            panic!("expected a solution");
        };
        assert!(optimal);
        assert_eq!(solution.objective(), 10);
    }

    #[test]
    fn cancelled_search_reports_infeasible_without_a_solution() {
        let (model, _) = choose_k(6, 3);
        let token = CancelToken::new();
        token.cancel();

        let limits = SearchLimits {
            cancel: Some(token),
            ..SearchLimits::default()
        };
        let result = SearchEngine::new(&model).solve(&limits);
        assert_eq!(result.outcome, SearchOutcome::Infeasible);
        assert_eq!(result.stats.stopped_by, Some(StopReason::Cancelled));
        assert!(!result.stats.exhausted);
    }
}
