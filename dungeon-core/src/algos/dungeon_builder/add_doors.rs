use super::{GenContext, Stage};
use crate::{
    algos::{StageKind, StageStatus, UnionFind, WorkBudget},
    constants::{DIRECTIONS, DOOR_JITTER_RANGE},
    types::{Coord, Direction, RoomId},
};

use std::{
    cmp::Reverse,
    collections::{BTreeSet, HashMap},
};

use priority_queue::PriorityQueue;
use rand::{Rng, seq::SliceRandom};
use serde::Serialize;
use tracing::{Level, debug, event};

/// What sits on the far side of a door candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum DoorTarget {
    Corridor(RoomId),
    Room(RoomId),
}

impl DoorTarget {
    fn id(&self) -> RoomId {
        match self {
            DoorTarget::Corridor(room_id) | DoorTarget::Room(room_id) => *room_id,
        }
    }
}

#[derive(Debug, Clone)]
struct DoorCandidate {
    anchor: Coord,
    direction: Direction,
    // Unclaimed cells between the anchor and the target
    span: u32,
    source: RoomId,
    target: DoorTarget,
    jitter: u32,
    placed: bool,
}

impl DoorCandidate {
    // Shortest punch first, jitter breaks ties between equal spans
    fn priority(&self, idx: usize) -> Reverse<(u32, u32, usize)> {
        Reverse((self.span, self.jitter, idx))
    }

    fn span_cells(&self) -> Option<Vec<Coord>> {
        (1..=self.span)
            .map(|distance| self.anchor.step_by(self.direction, distance))
            .collect()
    }

    fn far_cell(&self) -> Option<Coord> {
        self.anchor.step_by(self.direction, self.span + 1)
    }
}

/// Summary of one run of the door planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DoorReport {
    pub candidates: usize,
    pub dead_ends: usize,
    pub forced: usize,
    pub connecting: usize,
    pub relaxed: usize,
    pub loops: usize,
    pub failed: usize,
    // Connected groups of rooms and corridors left once the planner is done
    pub components: usize,
}

enum Phase {
    Collect { next_room: usize },
    LooseEnds,
    Connect,
    Relax,
    Loops,
    Finalize,
}

pub(super) struct DoorPlanner {
    phase: Phase,
    candidates: Vec<DoorCandidate>,
    queue: PriorityQueue<usize, Reverse<(u32, u32, usize)>>,
    // Candidates passed over while connecting, in the order they came up
    deferred: Vec<usize>,
    spacing: HashMap<(RoomId, Direction, DoorTarget), Vec<Coord>>,
    union_find: UnionFind,
    components: usize,
    door_counts: Vec<u32>,
    pairs: BTreeSet<(RoomId, RoomId)>,
    report: DoorReport,
}

impl DoorPlanner {
    pub fn new() -> Self {
        DoorPlanner {
            phase: Phase::Collect { next_room: 0 },
            candidates: Vec::new(),
            queue: PriorityQueue::new(),
            deferred: Vec::new(),
            spacing: HashMap::new(),
            union_find: UnionFind::new(0),
            components: 0,
            door_counts: Vec::new(),
            pairs: BTreeSet::new(),
            report: DoorReport::default(),
        }
    }

    /// Walks from `anchor` towards `direction` through at most a moat of
    /// unclaimed cells, looking for a corridor or another room.
    fn find_target(ctx: &GenContext, anchor: Coord, direction: Direction, source: RoomId) -> Option<(u32, DoorTarget)> {
        for distance in 1..=ctx.config.moat + 1 {
            let coord = anchor.step_by(direction, distance)?;
            let cell = ctx.grid.cell(&coord)?;

            if cell.is_corridor() {
                return cell.room().map(|room_id| (distance - 1, DoorTarget::Corridor(room_id)));
            }

            match cell.room() {
                Some(room_id) if room_id == source => return None,
                Some(room_id) => return Some((distance - 1, DoorTarget::Room(room_id))),
                None if !ctx.grid.in_play(&coord) => return None,
                None => {}
            }
        }

        None
    }

    fn collect_room(&mut self, ctx: &mut GenContext, source: RoomId) -> u32 {
        let min_spacing = ctx.config.doors.min_spacing;
        let anchors = ctx.rooms[source].cells().to_vec();

        for anchor in anchors.iter() {
            for direction in DIRECTIONS {
                let Some((span, target)) = Self::find_target(ctx, *anchor, direction, source) else {
                    continue;
                };

                let recorded = self.spacing.entry((source, direction, target)).or_default();
                if recorded
                    .iter()
                    .any(|other| other.distance(anchor) < min_spacing)
                {
                    continue;
                }
                recorded.push(*anchor);

                let candidate = DoorCandidate {
                    anchor: *anchor,
                    direction,
                    span,
                    source,
                    target,
                    jitter: ctx.rng.random_range(0..DOOR_JITTER_RANGE),
                    placed: false,
                };

                let idx = self.candidates.len();
                self.queue.push(idx, candidate.priority(idx));
                self.candidates.push(candidate);
            }
        }

        anchors.len() as u32 * 4
    }

    /// Seeds the union find with what is already connected: corridor
    /// groups that touch, and doors from an earlier run.
    fn prepare_connectivity(&mut self, ctx: &GenContext) {
        self.union_find = UnionFind::new(ctx.rooms.len());
        self.door_counts = vec![0; ctx.rooms.len()];

        for idx in ctx.corridors.sorted_cells() {
            let coord = ctx.grid.coord_of(idx);
            let Some(owner) = ctx.grid.cell(&coord).and_then(|cell| cell.room()) else {
                continue;
            };

            for (_, neighbour) in coord.neighbours() {
                if let Some(other) = ctx.grid.cell(&neighbour).filter(|cell| cell.is_corridor()) {
                    if let Some(other_room) = other.room() {
                        self.union_find.union(owner, other_room);
                    }
                }
            }
        }

        for cell in ctx.grid.iter() {
            let Some(owner) = cell.room() else {
                continue;
            };

            for direction in cell.doors().iter() {
                let other = ctx
                    .grid
                    .neighbour(&cell.coord(), direction)
                    .and_then(|neighbour| ctx.grid.cell(&neighbour))
                    .and_then(|neighbour| neighbour.room());

                if let Some(other) = other {
                    self.union_find.union(owner, other);
                    self.pairs.insert((owner.min(other), owner.max(other)));
                }

                if !cell.is_corridor() {
                    self.door_counts[owner] += 1;
                }
            }
        }

        self.components = self.count_components(ctx);
    }

    fn count_components(&mut self, ctx: &GenContext) -> usize {
        let relevant = ctx
            .rooms
            .iter()
            .filter(|room| !room.is_empty())
            .map(|room| room.id())
            .collect::<Vec<_>>();

        self.union_find.components_among(relevant)
    }

    fn under_cap(&self, ctx: &GenContext, candidate: &DoorCandidate) -> bool {
        let cap = ctx.config.doors.max_doors_per_room;

        let target_ok = match candidate.target {
            DoorTarget::Room(target) => self.door_counts[target] < cap,
            DoorTarget::Corridor(_) => true,
        };

        self.door_counts[candidate.source] < cap && target_ok
    }

    /// Physically places the candidate at `idx`. Nothing is touched when
    /// the punch turns out to be blocked.
    fn place(&mut self, ctx: &mut GenContext, idx: usize) -> bool {
        let candidate = self.candidates[idx].clone();
        if candidate.placed {
            return false;
        }

        let Some(joined) = Self::punch(ctx, &candidate) else {
            self.report.failed += 1;
            return false;
        };

        let known = self.union_find.len();
        self.union_find.extend_to(ctx.rooms.len());
        self.door_counts.resize(ctx.rooms.len(), 0);
        self.components += ctx.rooms.len() - known;

        for other in joined {
            if self.union_find.union(candidate.source, other) {
                self.components -= 1;
            }
        }

        self.door_counts[candidate.source] += 1;
        if let DoorTarget::Room(target) = candidate.target {
            self.door_counts[target] += 1;
        }

        let (a, b) = (candidate.source, candidate.target.id());
        self.pairs.insert((a.min(b), a.max(b)));
        self.candidates[idx].placed = true;

        true
    }

    /// Carves the span and sets the door bits. Returns every room the
    /// source is now joined to.
    fn punch(ctx: &mut GenContext, candidate: &DoorCandidate) -> Option<Vec<RoomId>> {
        if ctx.room_at(&candidate.anchor) != Some(candidate.source) {
            return None;
        }

        let span_cells = candidate.span_cells()?;
        for coord in span_cells.iter() {
            if !ctx.grid.in_play(coord) || ctx.room_at(coord).is_some() {
                return None;
            }
        }

        let far = candidate.far_cell()?;
        let far_owner = ctx.grid.cell(&far).and_then(|cell| cell.room())?;
        match candidate.target {
            DoorTarget::Corridor(_) if !ctx.is_corridor(&far) => return None,
            DoorTarget::Room(target) if ctx.room_at(&far) != Some(target) => return None,
            _ => {}
        }

        let mut joined = vec![far_owner];

        // Room to room punches get a passage of their own, a corridor room
        // would otherwise join unrelated areas
        let carve_into = match candidate.target {
            DoorTarget::Corridor(_) => Some(far_owner),
            DoorTarget::Room(_) if candidate.span > 0 => {
                let passage = ctx.add_room(true);
                joined.push(passage);
                Some(passage)
            }
            DoorTarget::Room(_) => None,
        };

        for coord in span_cells.iter() {
            if ctx.is_corridor(coord) {
                if let Some(owner) = ctx.grid.cell(coord).and_then(|cell| cell.room()) {
                    joined.push(owner);
                }
            } else if let Some(room_id) = carve_into {
                ctx.mark_corridor(*coord, room_id);
            }
        }

        let direction = candidate.direction;
        let first = span_cells.first().copied().unwrap_or(far);
        set_door(ctx, candidate.anchor, direction);
        set_door(ctx, first, direction.reverse());

        if matches!(candidate.target, DoorTarget::Room(_)) {
            if let Some(last) = span_cells.last() {
                set_door(ctx, *last, direction);
                set_door(ctx, far, direction.reverse());
            }
        }

        Some(joined)
    }

    /// Forces a door near every corridor dead end.
    fn connect_loose_ends(&mut self, ctx: &mut GenContext) -> u32 {
        let reach = ctx.config.doors.dead_end_reach;

        let dead_ends = ctx
            .corridors
            .sorted_spine()
            .into_iter()
            .map(|idx| ctx.grid.coord_of(idx))
            .filter(|coord| {
                coord
                    .neighbours()
                    .filter(|(_, neighbour)| {
                        ctx.grid
                            .index_of(neighbour)
                            .is_some_and(|idx| ctx.corridors.is_spine(idx))
                    })
                    .count()
                    == 1
            })
            .collect::<Vec<_>>();

        self.report.dead_ends = dead_ends.len();
        let mut work = 0;

        for dead_end in dead_ends {
            let best = self
                .candidates
                .iter()
                .enumerate()
                .filter(|(_, candidate)| {
                    !candidate.placed && matches!(candidate.target, DoorTarget::Corridor(_))
                })
                .filter_map(|(idx, candidate)| {
                    let distance = candidate.far_cell()?.distance(&dead_end);
                    (distance <= reach).then_some((distance, candidate.span, idx))
                })
                .min();

            work += self.candidates.len() as u32;

            if let Some((_, _, idx)) = best {
                if self.place(ctx, idx) {
                    self.report.forced += 1;
                }
            }
        }

        work
    }

    fn relax(&mut self, ctx: &mut GenContext) {
        for idx in self.deferred.clone() {
            if self.components <= 1 {
                break;
            }

            let candidate = &self.candidates[idx];
            let (a, b) = (candidate.source, candidate.target.id());
            if candidate.placed || self.union_find.connected(a, b) {
                continue;
            }

            if self.place(ctx, idx) {
                self.report.relaxed += 1;
            }
        }
    }

    fn add_loops(&mut self, ctx: &mut GenContext) {
        let doors = ctx.config.doors;

        let mut remaining = self
            .deferred
            .iter()
            .copied()
            .filter(|idx| !self.candidates[*idx].placed)
            .collect::<Vec<_>>();

        remaining.shuffle(&mut ctx.rng);

        let wanted = ((remaining.len() as f64 * doors.loop_fraction).ceil() as u32).min(doors.max_loop_doors);

        for idx in remaining {
            if self.report.loops as u32 >= wanted {
                break;
            }

            let candidate = &self.candidates[idx];
            let (a, b) = (candidate.source, candidate.target.id());

            if !self.under_cap(ctx, candidate) || self.pairs.contains(&(a.min(b), a.max(b))) {
                continue;
            }

            if let DoorTarget::Room(target) = candidate.target {
                let chord = ctx.rooms[a]
                    .get_center()
                    .manhattan(&ctx.rooms[target].get_center());
                if chord > doors.max_loop_chord as f32 {
                    continue;
                }
            }

            if self.place(ctx, idx) {
                self.report.loops += 1;
            }
        }
    }

    /// Walls go back up around every owner, and door bits without a
    /// matching bit on the other side are dropped.
    fn finalize(&mut self, ctx: &mut GenContext) {
        ctx.rebuild_walls();

        let dangling = ctx
            .grid
            .iter()
            .flat_map(|cell| {
                cell.doors()
                    .iter()
                    .filter(|direction| {
                        ctx.grid
                            .neighbour(&cell.coord(), *direction)
                            .and_then(|neighbour| ctx.grid.cell(&neighbour))
                            .is_none_or(|neighbour| !neighbour.doors().contains(direction.reverse()))
                    })
                    .map(|direction| (cell.coord(), direction))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        if !dangling.is_empty() {
            debug!("Clearing {} dangling door bit/s", dangling.len());
        }

        for (coord, direction) in dangling {
            if let Some(cell) = ctx.grid.cell_mut(&coord) {
                cell.doors.remove(direction);
            }
        }

        self.report.candidates = self.candidates.len();
        self.report.components = self.count_components(ctx);
    }
}

fn set_door(ctx: &mut GenContext, coord: Coord, direction: Direction) {
    if let Some(cell) = ctx.grid.cell_mut(&coord) {
        cell.doors.insert(direction);
    }
}

impl Stage for DoorPlanner {
    fn kind(&self) -> StageKind {
        StageKind::Doors
    }

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus {
        loop {
            if budget.is_exhausted() {
                return StageStatus::Yield;
            }

            match &mut self.phase {
                Phase::Collect { next_room } => {
                    let Some(room) = ctx.rooms.get(*next_room) else {
                        event!(Level::DEBUG, "Collected {} door candidates", self.candidates.len());
                        self.prepare_connectivity(ctx);
                        self.phase = Phase::LooseEnds;
                        continue;
                    };

                    let source = room.id();
                    let skip = room.is_corridor() || room.is_empty();
                    *next_room += 1;

                    if !skip {
                        let work = self.collect_room(ctx, source);
                        budget.spend(work);
                    }
                }
                Phase::LooseEnds => {
                    let work = self.connect_loose_ends(ctx);
                    budget.spend(work);
                    self.phase = Phase::Connect;
                }
                Phase::Connect => {
                    if self.components <= 1 {
                        while let Some((idx, _)) = self.queue.pop() {
                            self.deferred.push(idx);
                        }
                    }

                    let Some((idx, _)) = self.queue.pop() else {
                        debug!(
                            "Connecting pass placed {} door/s, {} group/s remain",
                            self.report.connecting, self.components
                        );
                        self.phase = Phase::Relax;
                        continue;
                    };

                    let candidate = &self.candidates[idx];
                    budget.spend(candidate.span + 1);

                    // A corridor is a hub, rooms take doors onto it up to their cap
                    let (a, b) = (candidate.source, candidate.target.id());
                    let redundant =
                        matches!(candidate.target, DoorTarget::Room(_)) && self.union_find.connected(a, b);
                    if candidate.placed || redundant || !self.under_cap(ctx, candidate) {
                        self.deferred.push(idx);
                        continue;
                    }

                    if self.place(ctx, idx) {
                        self.report.connecting += 1;
                    }
                }
                Phase::Relax => {
                    if ctx.config.doors.relax_caps && self.components > 1 {
                        self.relax(ctx);
                        budget.spend(self.deferred.len() as u32);
                    }
                    self.phase = Phase::Loops;
                }
                Phase::Loops => {
                    self.add_loops(ctx);
                    budget.spend(self.deferred.len() as u32);
                    self.phase = Phase::Finalize;
                }
                Phase::Finalize => {
                    self.finalize(ctx);

                    event!(Level::DEBUG, "Door planner finished: {:?}", self.report);
                    ctx.door_report = self.report.clone();

                    return StageStatus::Complete;
                }
            }
        }
    }
}
