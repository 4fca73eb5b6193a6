//! Tournament timetabling.
//!
//! Places every team into one judging session per subjective category and a
//! fixed number of head-to-head matches on two-sided tables. The problem is
//! posted as a pseudo-boolean model ([`model`]) of per-team occupancy and
//! start indicators ([`team`]) by [`builder`], searched by a branch-and-bound
//! engine ([`search`]) or HiGHS, and read back per team by [`extract`].
//! [`solver::solve`] runs the whole pipeline.

pub mod builder;
pub mod data;
pub mod error;
pub mod extract;
pub mod model;
pub mod search;
pub mod server;
pub mod solver;
pub mod team;
pub mod validation;

pub use builder::TournamentModel;
pub use data::{SchedulingParameters, TeamSchedule};
pub use error::SchedulerError;
pub use search::{CancelToken, SearchLimits};
pub use solver::{Backend, SolveOptions, SolveOutcome, solve};
