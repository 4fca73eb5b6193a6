use thiserror::Error;

/// Faults surfaced by [`crate::solver::solve`].
///
/// An infeasible parameter set is not an error; it is reported through
/// [`crate::solver::SolveOutcome::Infeasible`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("inconsistent parameters: {}", .0.join("; "))]
    InconsistentParameters(Vec<String>),

    #[error("ILP backend failed: {0}")]
    Backend(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
