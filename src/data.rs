use serde::{Deserialize, Serialize};
use std::fmt;

// Type aliases for clarity
pub type GroupId = u32;
pub type TeamId = u32;
pub type Slot = usize;
pub type TableIndex = usize;
pub type Side = usize;

pub const DEFAULT_SLOT_MINUTES: u32 = 5;
pub const DEFAULT_MAX_HOURS: u32 = 8;
pub const DEFAULT_SUBJECTIVE_MINUTES: u32 = 20;
pub const DEFAULT_PERFORMANCE_MINUTES: u32 = 5;
pub const DEFAULT_CHANGETIME_MINUTES: u32 = 15;
pub const DEFAULT_PERFORMANCE_CHANGETIME_MINUTES: u32 = 30;
pub const DEFAULT_WARMUP_MINUTES: u32 = 60;

/// A set of teams that share one judge rotation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgingGroup {
    pub id: GroupId,
    pub team_count: usize,
}

/// A subjective judging category and the length of one session in it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectiveCategory {
    pub name: String,
    pub duration_slots: usize,
}

/// The complete input for one scheduling attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingParameters {
    pub judging_groups: Vec<JudgingGroup>,
    pub categories: Vec<SubjectiveCategory>,
    pub num_tables: usize,
    pub performance_duration_slots: usize,
    pub num_rounds: usize,
    pub changetime_slots: usize,
    /// Gap between two matches of one team. Falls back to `changetime_slots`.
    #[serde(default)]
    pub performance_changetime_slots: Option<usize>,
    pub max_slots: usize,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
    #[serde(default = "default_warmup_minutes")]
    pub performance_warmup_minutes: u32,
}

fn default_slot_minutes() -> u32 {
    DEFAULT_SLOT_MINUTES
}

fn default_warmup_minutes() -> u32 {
    DEFAULT_WARMUP_MINUTES
}

fn minutes_to_slots(minutes: u32, slot_minutes: u32) -> usize {
    minutes.div_ceil(slot_minutes) as usize
}

impl SchedulingParameters {
    /// Parameters using the usual tournament defaults: 5 minute slots over an
    /// 8 hour day, 20 minute judging sessions, 5 minute matches, 15 minutes
    /// between stations and 30 minutes between matches.
    pub fn tournament_defaults(
        judging_groups: Vec<JudgingGroup>,
        category_names: &[&str],
        num_tables: usize,
        num_rounds: usize,
    ) -> Self {
        let slot = DEFAULT_SLOT_MINUTES;
        Self {
            judging_groups,
            categories: category_names
                .iter()
                .map(|name| SubjectiveCategory {
                    name: name.to_string(),
                    duration_slots: minutes_to_slots(DEFAULT_SUBJECTIVE_MINUTES, slot),
                })
                .collect(),
            num_tables,
            performance_duration_slots: minutes_to_slots(DEFAULT_PERFORMANCE_MINUTES, slot),
            num_rounds,
            changetime_slots: minutes_to_slots(DEFAULT_CHANGETIME_MINUTES, slot),
            performance_changetime_slots: Some(minutes_to_slots(
                DEFAULT_PERFORMANCE_CHANGETIME_MINUTES,
                slot,
            )),
            max_slots: minutes_to_slots(DEFAULT_MAX_HOURS * 60, slot),
            slot_minutes: slot,
            performance_warmup_minutes: DEFAULT_WARMUP_MINUTES,
        }
    }

    pub fn num_categories(&self) -> usize {
        self.categories.len()
    }

    pub fn category_duration(&self, category: usize) -> usize {
        self.categories[category].duration_slots
    }

    pub fn total_teams(&self) -> usize {
        self.judging_groups.iter().map(|g| g.team_count).sum()
    }

    pub fn performance_changetime(&self) -> usize {
        self.performance_changetime_slots
            .unwrap_or(self.changetime_slots)
    }

    /// Number of leading slots in which no match may start.
    pub fn warmup_slots(&self) -> usize {
        if self.slot_minutes == 0 {
            return 0;
        }
        (self.performance_warmup_minutes / self.slot_minutes) as usize
    }

    pub fn slot_start_minutes(&self, slot: Slot) -> u32 {
        slot as u32 * self.slot_minutes
    }
}

/// One judging session of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectiveAssignment {
    pub category: usize,
    pub category_name: String,
    pub slot: Slot,
    pub start_minutes: u32,
}

/// One performance match of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAssignment {
    pub round: usize,
    pub table: TableIndex,
    pub side: Side,
    pub slot: Slot,
    pub start_minutes: u32,
}

/// Everything one team has to be at during the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSchedule {
    pub team: TeamId,
    pub name: String,
    pub judging_group: GroupId,
    pub subjective: Vec<SubjectiveAssignment>,
    pub performance: Vec<PerformanceAssignment>,
}

impl fmt::Display for TeamSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (group {}):", self.name, self.judging_group)?;
        for s in &self.subjective {
            write!(f, " {}@{}", s.category_name, s.slot)?;
        }
        for p in &self.performance {
            write!(
                f,
                " R{} Table{} {}@{}",
                p.round + 1,
                p.table + 1,
                p.side + 1,
                p.slot
            )?;
        }
        Ok(())
    }
}
