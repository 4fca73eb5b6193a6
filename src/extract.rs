//! Projection of a solved assignment onto per-team schedules.

use std::collections::BTreeMap;

use crate::builder::TournamentModel;
use crate::data::{PerformanceAssignment, SubjectiveAssignment, TeamId, TeamSchedule};
use crate::model::Solution;

/// Reads every team's sessions and matches out of `solution`.
///
/// # Panics
///
/// When a team does not have exactly one session of the right length per
/// category, or not exactly the configured number of matches. Such a
/// solution can only come from a modeling bug.
pub fn extract_schedule(
    tournament: &TournamentModel,
    solution: &Solution,
) -> BTreeMap<TeamId, TeamSchedule> {
    let params = tournament.params();
    let mut schedule = BTreeMap::new();

    for team in tournament.teams() {
        let mut subjective = Vec::with_capacity(params.num_categories());
        for (c, category) in params.categories.iter().enumerate() {
            let starts = (0..params.max_slots)
                .filter_map(|t| team.sz(c, t))
                .filter(|&var| solution.value(var))
                .count();
            assert_eq!(
                starts, 1,
                "{} has {starts} starts in category '{}'",
                team.name(),
                category.name
            );
            let occupied = team.subjective_occupancy(c, solution);
            assert_eq!(
                occupied,
                category.duration_slots,
                "{} occupies '{}' for {occupied} slots",
                team.name(),
                category.name
            );

            let Some(slot) = team.subjective_slot(c, solution) else {
                unreachable!("start counted above");
            };
            subjective.push(SubjectiveAssignment {
                category: c,
                category_name: category.name.clone(),
                slot,
                start_minutes: params.slot_start_minutes(slot),
            });
        }

        let starts = team.performance_starts(solution);
        assert_eq!(
            starts.len(),
            params.num_rounds,
            "{} has {} match starts",
            team.name(),
            starts.len()
        );
        let performance = starts
            .into_iter()
            .enumerate()
            .map(|(round, (table, side, slot))| PerformanceAssignment {
                round,
                table,
                side,
                slot,
                start_minutes: params.slot_start_minutes(slot),
            })
            .collect();

        schedule.insert(
            team.id(),
            TeamSchedule {
                team: team.id(),
                name: team.name().to_string(),
                judging_group: team.judging_group(),
                subjective,
                performance,
            },
        );
    }

    schedule
}
