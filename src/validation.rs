//! Structural checks run on [`SchedulingParameters`] before a model is built.
//!
//! Only configurations that cannot describe a tournament at all are rejected
//! here. Parameters that merely do not fit (a horizon that is too short, no
//! tables for the requested rounds) pass and are reported as infeasible by
//! the search. Parameters that would build an unreasonably large model are
//! rejected as well.

use std::collections::HashSet;

use crate::data::SchedulingParameters;
use crate::error::{SchedulerError, SchedulerResult};
use crate::team::SIDES;

/// Most decision variables a model may have.
pub const MAX_MODEL_VARIABLES: usize = 2_000_000;
/// Most constraint terms a model may have, counted loosely.
pub const MAX_MODEL_TERMS: usize = 50_000_000;

fn product(factors: &[usize]) -> usize {
    factors.iter().fold(1, |acc: usize, &f| acc.saturating_mul(f))
}

/// Upper estimates of the variables and constraint terms the model builder
/// would create. Saturates instead of overflowing.
fn model_size(params: &SchedulingParameters) -> (usize, usize) {
    let teams = params
        .judging_groups
        .iter()
        .fold(0usize, |acc, g| acc.saturating_add(g.team_count));
    let slots = params.max_slots;
    let categories = params.num_categories();
    let tables = params.num_tables;
    let changetime = params.changetime_slots.min(slots).saturating_add(1);
    let performance_changetime = params.performance_changetime().min(slots).saturating_add(1);
    let performance = params.performance_duration_slots.min(slots).saturating_add(1);

    let per_team_variables =
        product(&[categories, slots, 2]).saturating_add(product(&[tables, SIDES, slots, 2]));
    let variables = product(&[teams, per_team_variables]);

    let subjective = params
        .categories
        .iter()
        .map(|c| product(&[slots, c.duration_slots.min(slots).saturating_add(8)]))
        .fold(0usize, usize::saturating_add);
    let per_team_terms = [
        subjective,
        product(&[tables, SIDES, slots, performance.saturating_add(12)]),
        product(&[
            2,
            slots,
            changetime,
            categories,
            categories.saturating_add(tables.saturating_mul(2)),
        ]),
        product(&[2, slots, performance_changetime, tables, tables]),
        product(&[tables, SIDES, slots, performance.saturating_add(performance_changetime)]),
    ]
    .into_iter()
    .fold(0usize, usize::saturating_add);
    // rows posted once per group, category, table and slot, even without teams
    let shared_rows = product(&[
        slots,
        product(&[categories, params.judging_groups.len()])
            .saturating_add(tables.saturating_mul(SIDES)),
    ]);

    let terms = product(&[teams, per_team_terms])
        .saturating_add(product(&[variables, 2]))
        .saturating_add(shared_rows);
    (variables, terms)
}

/// Validates the parameters, collecting every problem found.
pub fn validate_parameters(params: &SchedulingParameters) -> SchedulerResult<()> {
    let mut problems = Vec::new();

    if params.slot_minutes == 0 {
        problems.push("slot length must be at least one minute".to_string());
    }

    let mut group_ids = HashSet::new();
    for group in &params.judging_groups {
        if !group_ids.insert(group.id) {
            problems.push(format!("duplicate judging group id {}", group.id));
        }
    }

    let mut names = HashSet::new();
    for (index, category) in params.categories.iter().enumerate() {
        if category.name.trim().is_empty() {
            problems.push(format!("category {index} has an empty name"));
        } else if !names.insert(category.name.as_str()) {
            problems.push(format!("duplicate category name '{}'", category.name));
        }
        if category.duration_slots == 0 {
            problems.push(format!(
                "category '{}' must last at least one slot",
                category.name
            ));
        }
    }

    if params.num_rounds > 0 && params.performance_duration_slots == 0 {
        problems.push("performance matches must last at least one slot".to_string());
    }

    let (variables, terms) = model_size(params);
    if variables > MAX_MODEL_VARIABLES {
        problems.push(format!(
            "model would need {variables} variables, more than {MAX_MODEL_VARIABLES}"
        ));
    } else if terms > MAX_MODEL_TERMS {
        problems.push(format!(
            "model would need about {terms} constraint terms, more than {MAX_MODEL_TERMS}"
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::InconsistentParameters(problems))
    }
}
