use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use good_lp::solvers::SolutionStatus;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution as _, SolverModel, Variable,
    constraint, default_solver, variable,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::builder::TournamentModel;
use crate::data::{SchedulingParameters, TeamId, TeamSchedule};
use crate::error::{SchedulerError, SchedulerResult};
use crate::extract::extract_schedule;
use crate::model::{Model, Relation, Solution, Var};
use crate::search::{
    CancelToken, SearchEngine, SearchLimits, SearchOutcome, SearchStats, StopReason,
};
use crate::validation::validate_parameters;

/// Which engine searches the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    /// Depth-first branch-and-bound with propagation.
    #[default]
    Backtracking,
    /// The HiGHS MILP solver.
    Highs,
}

#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    pub backend: Backend,
    pub limits: SearchLimits,
}

impl SolveOptions {
    pub fn with_node_limit(mut self, nodes: u64) -> Self {
        self.limits.node_limit = Some(nodes);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.limits.time_limit = Some(limit);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.limits.cancel = Some(token);
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

/// The result of one scheduling attempt.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Solved {
        schedule: BTreeMap<TeamId, TeamSchedule>,
        objective: i64,
        /// Proven optimal rather than best found within the limits.
        optimal: bool,
        stats: SearchStats,
    },
    Infeasible {
        stats: SearchStats,
    },
}

impl SolveOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, SolveOutcome::Solved { .. })
    }

    pub fn schedule(&self) -> Option<&BTreeMap<TeamId, TeamSchedule>> {
        match self {
            SolveOutcome::Solved { schedule, .. } => Some(schedule),
            SolveOutcome::Infeasible { .. } => None,
        }
    }

    pub fn stats(&self) -> &SearchStats {
        match self {
            SolveOutcome::Solved { stats, .. } | SolveOutcome::Infeasible { stats } => stats,
        }
    }
}

/// Validates the parameters, builds a fresh model, searches it with the
/// configured backend and extracts the per-team schedule.
pub fn solve(params: &SchedulingParameters, options: &SolveOptions) -> SchedulerResult<SolveOutcome> {
    validate_parameters(params)?;
    let tournament = TournamentModel::build(params);
    solve_model(&tournament, options)
}

/// Searches an already built model.
pub fn solve_model(
    tournament: &TournamentModel,
    options: &SolveOptions,
) -> SchedulerResult<SolveOutcome> {
    let outcome = match options.backend {
        Backend::Backtracking => {
            let result = SearchEngine::new(tournament.model()).solve(&options.limits);
            (result.outcome, result.stats)
        }
        Backend::Highs => solve_with_highs(tournament.model(), &options.limits)?,
    };

    Ok(match outcome {
        (SearchOutcome::Solved { solution, optimal }, stats) => {
            let schedule = extract_schedule(tournament, &solution);
            SolveOutcome::Solved {
                schedule,
                objective: solution.objective(),
                optimal,
                stats,
            }
        }
        (SearchOutcome::Infeasible, stats) => {
            warn!("No schedule satisfies the constraints");
            SolveOutcome::Infeasible { stats }
        }
    })
}

/// Solves `model` with the HiGHS ILP solver.
pub fn solve_with_highs(
    model: &Model,
    limits: &SearchLimits,
) -> SchedulerResult<(SearchOutcome, SearchStats)> {
    let start_time = Instant::now();
    let mut stats = SearchStats::default();

    // HiGHS cannot be interrupted once running; the token is honored up front
    if limits.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
        stats.stopped_by = Some(StopReason::Cancelled);
        return Ok((SearchOutcome::Infeasible, stats));
    }

    // rows without variables never reach the solver
    for row in model.constraints().iter().filter(|c| c.terms.is_empty()) {
        let holds = match row.relation {
            Relation::LessEq => 0 <= row.rhs,
            Relation::Equal => 0 == row.rhs,
        };
        if !holds {
            info!("{} row with no terms cannot hold; skipping the solver", row.kind);
            stats.exhausted = true;
            stats.elapsed = start_time.elapsed();
            return Ok((SearchOutcome::Infeasible, stats));
        }
    }

    info!(
        "Setting up ILP model with {} variables and {} constraints...",
        model.num_vars(),
        model.constraints().len()
    );
    let mut problem = ProblemVariables::new();
    let vars: Vec<Variable> = problem.add_vector(variable().binary(), model.num_vars());

    let linear = |terms: &[(Var, i64)]| -> Expression {
        terms
            .iter()
            .map(|&(var, coef)| coef as f64 * vars[var.index()])
            .sum()
    };

    let objective = linear(model.objective());
    let mut ilp = problem
        .minimise(objective)
        .using(default_solver)
        .set_option("threads", 1) // limit to 1 thread for reproducibility
        .set_option("random_seed", 1234) //set seed for reproducibility
        .set_option("log_to_console", false);
    if let Some(limit) = limits.time_limit {
        ilp = ilp.set_option("time_limit", limit.as_secs_f64());
    }

    for row in model.constraints().iter().filter(|c| !c.terms.is_empty()) {
        let lhs = linear(&row.terms);
        let rhs = row.rhs as f64;
        match row.relation {
            Relation::LessEq => ilp.add_constraint(constraint!(lhs <= rhs)),
            Relation::Equal => ilp.add_constraint(constraint!(lhs == rhs)),
        };
    }

    info!("Starting ILP solver...");
    let solution = match ilp.solve() {
        Ok(s) => s,
        Err(ResolutionError::Infeasible) => {
            stats.exhausted = true;
            stats.elapsed = start_time.elapsed();
            info!("ILP solver proved infeasibility in {:.2?}", stats.elapsed);
            return Ok((SearchOutcome::Infeasible, stats));
        }
        // HiGHS ran out of time before any feasible assignment
        Err(ResolutionError::Other("NoSolutionFound")) if limits.time_limit.is_some() => {
            stats.stopped_by = Some(StopReason::TimeLimit);
            stats.elapsed = start_time.elapsed();
            warn!("ILP solver found no solution within {:.2?}", stats.elapsed);
            return Ok((SearchOutcome::Infeasible, stats));
        }
        Err(e) => return Err(SchedulerError::Backend(e.to_string())),
    };
    stats.elapsed = start_time.elapsed();
    let solution_status = solution.status();
    info!("Solution found in {:.2?} ({solution_status:?})", stats.elapsed);

    let values: Vec<bool> = vars.iter().map(|&v| solution.value(v) > 0.5).collect();
    let objective = model.objective_value(&values);
    let solution = Solution::new(values, objective);
    let violations = solution.violations(model);
    if !violations.is_empty() {
        return Err(SchedulerError::Backend(format!(
            "solver returned an assignment breaking {} rows, first {}",
            violations.len(),
            violations[0].kind
        )));
    }

    stats.solutions = 1;
    stats.exhausted = matches!(solution_status, SolutionStatus::Optimal);
    if matches!(solution_status, SolutionStatus::TimeLimit) {
        stats.stopped_by = Some(StopReason::TimeLimit);
    }
    Ok((
        SearchOutcome::Solved {
            solution,
            optimal: stats.exhausted,
        },
        stats,
    ))
}
