use itertools::iproduct;

use crate::data::{GroupId, Side, Slot, TableIndex, TeamId};
use crate::model::{Model, Solution, Var};

/// Sides per performance table.
pub const SIDES: usize = 2;

/// The decision variables owned by one team.
///
/// Subjective variables are created category by category, slot by slot, with
/// the occupancy variable before the start variable. Performance variables
/// follow, slot by slot, then table, then side. The search engine branches in
/// creation order, so this layout is also the branching order.
#[derive(Debug, Clone)]
pub struct Team {
    id: TeamId,
    name: String,
    judging_group: GroupId,
    num_categories: usize,
    num_tables: usize,
    max_slots: usize,
    sy: Vec<Var>,
    sz: Vec<Var>,
    py: Vec<Var>,
    pz: Vec<Var>,
}

impl Team {
    pub fn new(
        model: &mut Model,
        id: TeamId,
        judging_group: GroupId,
        num_categories: usize,
        num_tables: usize,
        max_slots: usize,
    ) -> Self {
        let name = format!("Team {id}");

        let subjective_len = num_categories * max_slots;
        let mut sy = Vec::with_capacity(subjective_len);
        let mut sz = Vec::with_capacity(subjective_len);
        for (c, t) in iproduct!(0..num_categories, 0..max_slots) {
            sy.push(model.new_bool(format!("sy[{name}][{c}][{t}]")));
            sz.push(model.new_bool(format!("sz[{name}][{c}][{t}]")));
        }

        let performance_len = max_slots * num_tables * SIDES;
        let mut py = Vec::with_capacity(performance_len);
        let mut pz = Vec::with_capacity(performance_len);
        for (t, b, s) in iproduct!(0..max_slots, 0..num_tables, 0..SIDES) {
            py.push(model.new_bool(format!("py[{name}][{b}][{s}][{t}]")));
            pz.push(model.new_bool(format!("pz[{name}][{b}][{s}][{t}]")));
        }

        Self {
            id,
            name,
            judging_group,
            num_categories,
            num_tables,
            max_slots,
            sy,
            sz,
            py,
            pz,
        }
    }

    pub fn id(&self) -> TeamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn judging_group(&self) -> GroupId {
        self.judging_group
    }

    fn subjective_index(&self, category: usize, t: Slot) -> Option<usize> {
        (category < self.num_categories && t < self.max_slots)
            .then(|| category * self.max_slots + t)
    }

    fn performance_index(&self, table: TableIndex, side: Side, t: Slot) -> Option<usize> {
        (table < self.num_tables && side < SIDES && t < self.max_slots)
            .then(|| (t * self.num_tables + table) * SIDES + side)
    }

    /// Occupies subjective `category` at slot `t`.
    pub fn sy(&self, category: usize, t: Slot) -> Option<Var> {
        self.subjective_index(category, t).map(|i| self.sy[i])
    }

    /// Starts its `category` session at slot `t`.
    pub fn sz(&self, category: usize, t: Slot) -> Option<Var> {
        self.subjective_index(category, t).map(|i| self.sz[i])
    }

    /// Occupies `side` of `table` at slot `t`.
    pub fn py(&self, table: TableIndex, side: Side, t: Slot) -> Option<Var> {
        self.performance_index(table, side, t).map(|i| self.py[i])
    }

    /// Starts a match on `side` of `table` at slot `t`.
    pub fn pz(&self, table: TableIndex, side: Side, t: Slot) -> Option<Var> {
        self.performance_index(table, side, t).map(|i| self.pz[i])
    }

    /// Slot at which the `category` session starts in `solution`.
    pub fn subjective_slot(&self, category: usize, solution: &Solution) -> Option<Slot> {
        (0..self.max_slots).find(|&t| {
            self.sz(category, t)
                .is_some_and(|var| solution.value(var))
        })
    }

    /// Every match start in `solution`, ordered by table, side, then slot.
    pub fn performance_starts(&self, solution: &Solution) -> Vec<(TableIndex, Side, Slot)> {
        iproduct!(0..self.num_tables, 0..SIDES, 0..self.max_slots)
            .filter(|&(b, s, t)| self.pz(b, s, t).is_some_and(|var| solution.value(var)))
            .collect()
    }

    /// The `round`-th match start in table, side, slot order.
    pub fn performance_slot(
        &self,
        round: usize,
        solution: &Solution,
    ) -> Option<(TableIndex, Side, Slot)> {
        self.performance_starts(solution).get(round).copied()
    }

    /// Number of slots in which the team occupies `category`.
    pub fn subjective_occupancy(&self, category: usize, solution: &Solution) -> usize {
        (0..self.max_slots)
            .filter_map(|t| self.sy(category, t))
            .filter(|&var| solution.value(var))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_reject_out_of_range_indices() {
        let mut model = Model::new();
        let team = Team::new(&mut model, 1, 0, 2, 1, 4);

        assert!(team.sy(1, 3).is_some());
        assert!(team.sy(2, 0).is_none());
        assert!(team.sz(0, 4).is_none());
        assert!(team.py(0, 1, 3).is_some());
        assert!(team.py(1, 0, 0).is_none());
        assert!(team.pz(0, 2, 0).is_none());
        assert_eq!(model.num_vars(), 2 * 4 * 2 + 4 * 2 * 2);
    }

    #[test]
    fn variables_are_created_subjective_first() {
        let mut model = Model::new();
        let team = Team::new(&mut model, 7, 0, 1, 1, 2);

        assert_eq!(team.sy(0, 0).map(Var::index), Some(0));
        assert_eq!(team.sz(0, 0).map(Var::index), Some(1));
        assert_eq!(team.sy(0, 1).map(Var::index), Some(2));
        assert_eq!(team.py(0, 0, 0).map(Var::index), Some(4));
        assert_eq!(team.pz(0, 1, 0).map(Var::index), Some(7));
        let py = team.py(0, 0, 0).unwrap();
        assert_eq!(model.name(py), "py[Team 7][0][0][0]");
    }

    #[test]
    fn reads_slots_from_a_solution() {
        let mut model = Model::new();
        let team = Team::new(&mut model, 1, 0, 1, 2, 5);
        let mut values = vec![false; model.num_vars()];
        for t in 2..4 {
            values[team.sy(0, t).unwrap().index()] = true;
        }
        values[team.sz(0, 2).unwrap().index()] = true;
        values[team.pz(1, 0, 0).unwrap().index()] = true;
        values[team.pz(0, 1, 4).unwrap().index()] = true;
        let solution = Solution::new(values, 0);

        assert_eq!(team.subjective_slot(0, &solution), Some(2));
        assert_eq!(team.subjective_occupancy(0, &solution), 2);
        assert_eq!(team.performance_slot(0, &solution), Some((0, 1, 4)));
        assert_eq!(team.performance_slot(1, &solution), Some((1, 0, 0)));
        assert_eq!(team.performance_slot(2, &solution), None);
    }
}
