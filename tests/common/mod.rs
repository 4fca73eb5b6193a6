#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;
use tournament_scheduler::data::{
    JudgingGroup, SchedulingParameters, SubjectiveCategory, TeamId, TeamSchedule,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two judging groups of two teams, one 3-slot category, one table with
/// 2-slot matches, one round, changetime 1.
pub fn four_team_parameters(max_slots: usize) -> SchedulingParameters {
    SchedulingParameters {
        judging_groups: vec![
            JudgingGroup { id: 1, team_count: 2 },
            JudgingGroup { id: 2, team_count: 2 },
        ],
        categories: vec![SubjectiveCategory {
            name: "Project".to_string(),
            duration_slots: 3,
        }],
        num_tables: 1,
        performance_duration_slots: 2,
        num_rounds: 1,
        changetime_slots: 1,
        performance_changetime_slots: None,
        max_slots,
        slot_minutes: 15,
        performance_warmup_minutes: 60,
    }
}

#[derive(Debug, Clone, Copy)]
struct Activity {
    start: usize,
    end: usize,
    performance: bool,
}

/// Checks every hard rule directly on the extracted schedule.
pub fn assert_schedule_valid(
    params: &SchedulingParameters,
    schedule: &BTreeMap<TeamId, TeamSchedule>,
) {
    assert_eq!(schedule.len(), params.total_teams());

    for team in schedule.values() {
        assert_eq!(team.subjective.len(), params.num_categories(), "{team}");
        for session in &team.subjective {
            let end = session.slot + params.category_duration(session.category);
            assert!(end <= params.max_slots, "{team}: session past the horizon");
            assert_eq!(session.start_minutes, session.slot as u32 * params.slot_minutes);
        }

        assert_eq!(team.performance.len(), params.num_rounds, "{team}");
        let distinct: HashSet<_> = team
            .performance
            .iter()
            .map(|p| (p.table, p.side, p.slot))
            .collect();
        assert_eq!(distinct.len(), params.num_rounds, "{team}: repeated match start");
        for m in &team.performance {
            assert!(m.table < params.num_tables);
            assert!(m.side < 2);
            assert!(m.slot >= params.warmup_slots(), "{team}: match during warm-up");
            assert!(m.slot + params.performance_duration_slots <= params.max_slots);
        }

        let activities: Vec<Activity> = team
            .subjective
            .iter()
            .map(|s| Activity {
                start: s.slot,
                end: s.slot + params.category_duration(s.category),
                performance: false,
            })
            .chain(team.performance.iter().map(|p| Activity {
                start: p.slot,
                end: p.slot + params.performance_duration_slots,
                performance: true,
            }))
            .sorted_by_key(|a| a.start)
            .collect();
        for (a, b) in activities.iter().tuple_combinations() {
            let gap = if a.performance && b.performance {
                params.performance_changetime()
            } else {
                params.changetime_slots
            };
            assert!(
                b.start >= a.end + gap,
                "{team}: activities {a:?} and {b:?} closer than {gap} slots"
            );
        }
    }

    // one judge per group and category
    let by_group = schedule
        .values()
        .map(|team| (team.judging_group, team))
        .into_group_map();
    for (group, teams) in by_group {
        for c in 0..params.num_categories() {
            let duration = params.category_duration(c);
            for (x, y) in teams.iter().tuple_combinations() {
                let (sx, sy) = (x.subjective[c].slot, y.subjective[c].slot);
                assert!(
                    sx + duration <= sy || sy + duration <= sx,
                    "group {group}: {} and {} share the judge",
                    x.name,
                    y.name
                );
            }
        }
    }

    // a match engages both sides of its table
    let matches: Vec<(usize, usize, &str)> = schedule
        .values()
        .flat_map(|team| {
            team.performance
                .iter()
                .map(move |p| (p.table, p.slot, team.name.as_str()))
        })
        .collect();
    for ((ta, sa, na), (tb, sb, nb)) in matches.iter().tuple_combinations() {
        if ta != tb {
            continue;
        }
        let d = params.performance_duration_slots;
        assert!(
            sa + d <= *sb || sb + d <= *sa,
            "table {ta}: {na} at {sa} overlaps {nb} at {sb}"
        );
    }
}
