//! Builds the tournament constraint model.
//!
//! One [`Team`] bundle is created per team, then every rule family is posted
//! as linear rows over the bundles' variables. Terms that fall outside the
//! horizon are skipped rather than treated as errors, so windows near the
//! first and last slot simply have fewer terms.

use std::time::Instant;

use itertools::{Itertools, iproduct};
use log::{debug, info};

use crate::data::{GroupId, SchedulingParameters, TeamId};
use crate::model::{ConstraintKind, LinExpr, Model};
use crate::team::{SIDES, Team};

/// The posted model together with the teams whose variables it contains.
#[derive(Debug, Clone)]
pub struct TournamentModel {
    params: SchedulingParameters,
    model: Model,
    teams: Vec<Team>,
}

impl TournamentModel {
    /// Creates every team bundle and posts all hard constraints and the
    /// objective. Never fails: an unsatisfiable system is only detected by
    /// the search.
    pub fn build(params: &SchedulingParameters) -> Self {
        let start_time = Instant::now();
        let mut builder = ModelBuilder::new(params);

        info!(
            "Setting up model with {} teams in {} judging groups, {} categories, {} tables and {} timeslots...",
            builder.teams.len(),
            params.judging_groups.len(),
            params.num_categories(),
            params.num_tables,
            params.max_slots
        );

        builder.station_busy_subjective();
        builder.station_start_subjective();
        builder.duration_subjective();
        builder.no_overlap_subjective();
        builder.team_subjective();

        builder.station_busy_performance();
        builder.station_start_performance();
        builder.duration_performance();
        builder.no_overlap_performance();
        builder.team_performance();
        builder.both_sides();
        builder.performance_warmup();

        builder.end_of_schedule();

        builder.subj_subj_changetime();
        builder.subj_perf_changetime();
        builder.perf_perf_changetime();

        builder.objective();

        for (kind, count) in builder.model.count_by_kind() {
            debug!("{kind}: {count} constraints");
        }
        info!(
            "Model built with {} variables and {} constraints in {:.2?}",
            builder.model.num_vars(),
            builder.model.constraints().len(),
            start_time.elapsed()
        );

        Self {
            params: params.clone(),
            model: builder.model,
            teams: builder.teams,
        }
    }

    pub fn params(&self) -> &SchedulingParameters {
        &self.params
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }
}

struct ModelBuilder<'a> {
    params: &'a SchedulingParameters,
    model: Model,
    teams: Vec<Team>,
    /// Team indices per judging group, in group order.
    groups: Vec<(GroupId, Vec<usize>)>,
}

impl<'a> ModelBuilder<'a> {
    fn new(params: &'a SchedulingParameters) -> Self {
        let mut model = Model::new();
        let mut teams = Vec::with_capacity(params.total_teams());

        let mut team_number: TeamId = 1;
        for group in &params.judging_groups {
            for _ in 0..group.team_count {
                teams.push(Team::new(
                    &mut model,
                    team_number,
                    group.id,
                    params.num_categories(),
                    params.num_tables,
                    params.max_slots,
                ));
                team_number += 1;
            }
        }

        let by_group = teams
            .iter()
            .enumerate()
            .map(|(index, team)| (team.judging_group(), index))
            .into_group_map();
        let groups = params
            .judging_groups
            .iter()
            .map(|g| (g.id, by_group.get(&g.id).cloned().unwrap_or_default()))
            .collect();

        Self {
            params,
            model,
            teams,
            groups,
        }
    }

    fn slots(&self) -> std::ops::Range<usize> {
        0..self.params.max_slots
    }

    /// A started session keeps its station busy for the whole duration:
    /// any start within the last `duration` slots implies occupancy now.
    fn station_busy_subjective(&mut self) {
        for team in &self.teams {
            for c in 0..self.params.num_categories() {
                let duration = self.params.category_duration(c);
                for t in 0..self.params.max_slots {
                    let mut expr: LinExpr = (0..duration.min(t + 1))
                        .filter_map(|u| t.checked_sub(u))
                        .filter_map(|s| team.sz(c, s))
                        .collect();
                    if let Some(sy) = team.sy(c, t) {
                        expr.add(sy, -1);
                    }
                    self.model
                        .at_most(ConstraintKind::StationBusySubjective, expr, 0);
                }
            }
        }
    }

    /// Occupancy at `t` needs occupancy at `t - 1` or a start at `t`.
    fn station_start_subjective(&mut self) {
        for team in &self.teams {
            for c in 0..self.params.num_categories() {
                for t in 0..self.params.max_slots {
                    let (Some(sy), Some(sz)) = (team.sy(c, t), team.sz(c, t)) else {
                        continue;
                    };
                    let mut expr = LinExpr::new().plus(sy).minus(sz);
                    if let Some(prev) = t.checked_sub(1).and_then(|p| team.sy(c, p)) {
                        expr.add(prev, -1);
                    }
                    self.model
                        .at_most(ConstraintKind::StationStartSubjective, expr, 0);
                }
            }
        }
    }

    fn duration_subjective(&mut self) {
        for team in &self.teams {
            for c in 0..self.params.num_categories() {
                let expr: LinExpr = self.slots().filter_map(|t| team.sy(c, t)).collect();
                self.model.exactly(
                    ConstraintKind::DurationSubjective,
                    expr,
                    self.params.category_duration(c) as i64,
                );
            }
        }
    }

    /// One judge per category and group: at most one team of a group in a
    /// category at any slot.
    fn no_overlap_subjective(&mut self) {
        for c in 0..self.params.num_categories() {
            for t in 0..self.params.max_slots {
                for (_, members) in &self.groups {
                    let expr: LinExpr = members
                        .iter()
                        .filter_map(|&i| self.teams[i].sy(c, t))
                        .collect();
                    self.model
                        .at_most(ConstraintKind::NoOverlapSubjective, expr, 1);
                }
            }
        }
    }

    fn team_subjective(&mut self) {
        for team in &self.teams {
            for c in 0..self.params.num_categories() {
                let expr: LinExpr = self.slots().filter_map(|t| team.sz(c, t)).collect();
                self.model.exactly(ConstraintKind::TeamSubjective, expr, 1);
            }
        }
    }

    fn station_busy_performance(&mut self) {
        let duration = self.params.performance_duration_slots;
        for team in &self.teams {
            for (b, s, t) in iproduct!(0..self.params.num_tables, 0..SIDES, self.slots()) {
                let mut expr: LinExpr = (0..duration.min(t + 1))
                    .filter_map(|u| t.checked_sub(u))
                    .filter_map(|p| team.pz(b, s, p))
                    .collect();
                if let Some(py) = team.py(b, s, t) {
                    expr.add(py, -1);
                }
                self.model
                    .at_most(ConstraintKind::StationBusyPerformance, expr, 0);
            }
        }
    }

    /// Occupancy of a table side at `t` needs occupancy at `t - 1` or a match
    /// starting at that table at `t`. A start on either side counts because
    /// one start engages both sides.
    fn station_start_performance(&mut self) {
        for team in &self.teams {
            for (b, s, t) in iproduct!(0..self.params.num_tables, 0..SIDES, self.slots()) {
                let Some(py) = team.py(b, s, t) else {
                    continue;
                };
                let mut expr = LinExpr::new().plus(py);
                for side in 0..SIDES {
                    if let Some(pz) = team.pz(b, side, t) {
                        expr.add(pz, -1);
                    }
                }
                if let Some(prev) = t.checked_sub(1).and_then(|p| team.py(b, s, p)) {
                    expr.add(prev, -1);
                }
                self.model
                    .at_most(ConstraintKind::StationStartPerformance, expr, 0);
            }
        }
    }

    /// Occupied slots at a table equal the match length times the matches
    /// started there. Side 0 stands for the table; side 1 is tied to it.
    fn duration_performance(&mut self) {
        let duration = self.params.performance_duration_slots as i64;
        for team in &self.teams {
            for b in 0..self.params.num_tables {
                let mut expr: LinExpr = self.slots().filter_map(|t| team.py(b, 0, t)).collect();
                for (s, t) in iproduct!(0..SIDES, self.slots()) {
                    if let Some(pz) = team.pz(b, s, t) {
                        expr.add(pz, -duration);
                    }
                }
                self.model
                    .exactly(ConstraintKind::DurationPerformance, expr, 0);
            }
        }
    }

    fn no_overlap_performance(&mut self) {
        for (b, s, t) in iproduct!(0..self.params.num_tables, 0..SIDES, self.slots()) {
            let expr: LinExpr = self.teams.iter().filter_map(|team| team.py(b, s, t)).collect();
            self.model
                .at_most(ConstraintKind::NoOverlapPerformance, expr, 1);
        }
    }

    fn team_performance(&mut self) {
        let rounds = self.params.num_rounds as i64;
        for team in &self.teams {
            let expr: LinExpr = iproduct!(0..self.params.num_tables, 0..SIDES, self.slots())
                .filter_map(|(b, s, t)| team.pz(b, s, t))
                .collect();
            self.model
                .exactly(ConstraintKind::TeamPerformance, expr, rounds);
        }
    }

    /// A team at a table engages both of its sides at once.
    fn both_sides(&mut self) {
        for team in &self.teams {
            for (b, t) in iproduct!(0..self.params.num_tables, self.slots()) {
                if let (Some(left), Some(right)) = (team.py(b, 0, t), team.py(b, 1, t)) {
                    let expr = LinExpr::new().plus(left).minus(right);
                    self.model.exactly(ConstraintKind::BothSides, expr, 0);
                }
            }
        }
    }

    /// No match starts during the opening warm-up window.
    fn performance_warmup(&mut self) {
        let warmup = self.params.warmup_slots().min(self.params.max_slots);
        let mut expr = LinExpr::new();
        for team in &self.teams {
            expr.extend(
                iproduct!(0..self.params.num_tables, 0..SIDES, 0..warmup)
                    .filter_map(|(b, s, t)| team.pz(b, s, t)),
            );
        }
        self.model
            .exactly(ConstraintKind::PerformanceWarmup, expr, 0);
    }

    /// Sessions and matches must finish inside the horizon.
    fn end_of_schedule(&mut self) {
        let max_slots = self.params.max_slots;
        let mut expr = LinExpr::new();
        for team in &self.teams {
            for c in 0..self.params.num_categories() {
                let first_late = max_slots
                    .saturating_add(1)
                    .saturating_sub(self.params.category_duration(c));
                expr.extend((first_late..max_slots).filter_map(|t| team.sz(c, t)));
            }
            let first_late = max_slots
                .saturating_add(1)
                .saturating_sub(self.params.performance_duration_slots);
            expr.extend(
                iproduct!(0..self.params.num_tables, 0..SIDES, first_late..max_slots)
                    .filter_map(|(b, s, t)| team.pz(b, s, t)),
            );
        }
        if !expr.is_empty() {
            self.model.exactly(ConstraintKind::EndOfSchedule, expr, 0);
        }
    }

    /// Two sessions of different categories keep at least the changetime
    /// between the end of one and the start of the other.
    fn subj_subj_changetime(&mut self) {
        let changetime = self.params.changetime_slots.min(self.params.max_slots);
        for team in &self.teams {
            for (n, d) in (0..self.params.num_categories()).tuple_combinations() {
                for (t, u) in iproduct!(self.slots(), 0..=changetime) {
                    if let (Some(a), Some(b)) = (team.sy(n, t), team.sy(d, t + u)) {
                        self.model.at_most(
                            ConstraintKind::ChangetimeSubjSubj,
                            LinExpr::new().plus(a).plus(b),
                            1,
                        );
                    }
                    if u == 0 {
                        continue;
                    }
                    if let (Some(a), Some(b)) = (team.sy(d, t), team.sy(n, t + u)) {
                        self.model.at_most(
                            ConstraintKind::ChangetimeSubjSubj,
                            LinExpr::new().plus(a).plus(b),
                            1,
                        );
                    }
                }
            }
        }
    }

    fn subj_perf_changetime(&mut self) {
        let changetime = self.params.changetime_slots.min(self.params.max_slots);
        for team in &self.teams {
            for (n, b) in iproduct!(0..self.params.num_categories(), 0..self.params.num_tables) {
                for (t, u) in iproduct!(self.slots(), 0..=changetime) {
                    if let (Some(sy), Some(py)) = (team.sy(n, t), team.py(b, 0, t + u)) {
                        self.model.at_most(
                            ConstraintKind::ChangetimeSubjPerf,
                            LinExpr::new().plus(sy).plus(py),
                            1,
                        );
                    }
                    if u == 0 {
                        continue;
                    }
                    if let (Some(py), Some(sy)) = (team.py(b, 0, t), team.sy(n, t + u)) {
                        self.model.at_most(
                            ConstraintKind::ChangetimeSubjPerf,
                            LinExpr::new().plus(py).plus(sy),
                            1,
                        );
                    }
                }
            }
        }
    }

    /// Matches at different tables are separated on occupancy. Matches at the
    /// same table are separated on starts: any window of one match plus the
    /// changetime holds at most one start for the team.
    fn perf_perf_changetime(&mut self) {
        let changetime = self.params.performance_changetime().min(self.params.max_slots);
        let window = self
            .params
            .performance_duration_slots
            .saturating_add(changetime)
            .min(self.params.max_slots);
        for team in &self.teams {
            for (b, d) in (0..self.params.num_tables).tuple_combinations() {
                for (t, u) in iproduct!(self.slots(), 0..=changetime) {
                    if let (Some(x), Some(y)) = (team.py(b, 0, t), team.py(d, 0, t + u)) {
                        self.model.at_most(
                            ConstraintKind::ChangetimePerfPerf,
                            LinExpr::new().plus(x).plus(y),
                            1,
                        );
                    }
                    if u == 0 {
                        continue;
                    }
                    if let (Some(x), Some(y)) = (team.py(d, 0, t), team.py(b, 0, t + u)) {
                        self.model.at_most(
                            ConstraintKind::ChangetimePerfPerf,
                            LinExpr::new().plus(x).plus(y),
                            1,
                        );
                    }
                }
            }

            for (b, t) in iproduct!(0..self.params.num_tables, self.slots()) {
                let expr: LinExpr = iproduct!(0..window, 0..SIDES)
                    .filter_map(|(u, s)| team.pz(b, s, t + u))
                    .collect();
                self.model
                    .at_most(ConstraintKind::ChangetimePerfPerf, expr, 1);
            }
        }
    }

    /// Weighted sum of occupied slots: later occupancy costs more.
    fn objective(&mut self) {
        let mut expr = LinExpr::new();
        for team in &self.teams {
            for t in self.slots() {
                for c in 0..self.params.num_categories() {
                    if let Some(sy) = team.sy(c, t) {
                        expr.add(sy, t as i64);
                    }
                }
                for (b, s) in iproduct!(0..self.params.num_tables, 0..SIDES) {
                    if let Some(py) = team.py(b, s, t) {
                        expr.add(py, t as i64);
                    }
                }
            }
        }
        self.model.set_objective(expr);
    }
}
