use super::{GenContext, GrowthConfig, Stage};
use crate::{
    algos::{StageKind, StageStatus, WorkBudget},
    constants::{COMPACT_SIDE_BONUS, COOLDOWN_PENALTY, DIRECTIONS, MAX_SPLIT_PCT, MIN_SPLIT_PCT},
    types::{Direction, Rect, RoomId, SplitAxis},
};

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{Level, debug, event};

#[derive(Debug, Clone)]
struct GrowthState {
    credit: u32,
    cooldown: [u32; 4],
    stalled: bool,
}

impl GrowthState {
    fn new(credit: u32) -> Self {
        GrowthState {
            credit,
            cooldown: [0; 4],
            stalled: false,
        }
    }

    fn is_active(&self) -> bool {
        !self.stalled && self.credit > 0
    }
}

fn side_index(direction: Direction) -> usize {
    match direction {
        Direction::North => 0,
        Direction::South => 1,
        Direction::East => 2,
        Direction::West => 3,
    }
}

/// Grows rooms one full strip at a time until their credit runs out or
/// every side is blocked.
pub(super) struct RoomGrower {
    subset: Option<Vec<RoomId>>,
    states: BTreeMap<RoomId, GrowthState>,
    order: Vec<RoomId>,
    cursor: usize,
    pass: u32,
    strips: u32,
    started: bool,
}

impl RoomGrower {
    pub fn new() -> Self {
        RoomGrower {
            subset: None,
            states: BTreeMap::new(),
            order: Vec::new(),
            cursor: 0,
            pass: 0,
            strips: 0,
            started: false,
        }
    }

    /// Only grows the given rooms; used to re-grow rooms seeded in scrap.
    pub fn for_rooms(rooms: Vec<RoomId>) -> Self {
        RoomGrower {
            subset: Some(rooms),
            ..Self::new()
        }
    }

    fn start(&mut self, ctx: &mut GenContext) {
        let growth = ctx.config.growth;

        let rooms = match &self.subset {
            Some(rooms) => rooms.clone(),
            None => ctx.rooms.iter().map(|room| room.id()).collect(),
        };

        for room_id in rooms {
            let room = &ctx.rooms[room_id];
            if room.is_corridor() || room.is_empty() {
                continue;
            }

            let credit = ctx.rng.random_range(growth.credit_min..=growth.credit_max);
            self.states.insert(room_id, GrowthState::new(credit));
        }

        self.started = true;
        self.begin_pass();
    }

    fn begin_pass(&mut self) {
        self.order = self
            .states
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(room_id, _)| *room_id)
            .collect();
        self.cursor = 0;
    }

    fn score_side(growth: &GrowthConfig, bounds: &Rect, state: &GrowthState, direction: Direction) -> f32 {
        let gain = bounds.side_length(direction) as f32;

        let (width, height) = if direction.is_horizontal() {
            (bounds.width + 1, bounds.height)
        } else {
            (bounds.width, bounds.height + 1)
        };

        let grows_short_axis = if direction.is_horizontal() {
            bounds.width < bounds.height
        } else {
            bounds.height < bounds.width
        };

        let mut score = gain;
        if grows_short_axis {
            score += COMPACT_SIDE_BONUS * gain;
        }

        let aspect = Rect::new(0, 0, width, height).aspect_ratio();
        if aspect > growth.target_aspect {
            score -= (aspect - growth.target_aspect) * gain;
        }

        score - COOLDOWN_PENALTY * state.cooldown[side_index(direction)] as f32
    }

    /// Tries to claim the strip along `direction`. Either every cell is
    /// claimed or none is.
    fn try_claim_strip(ctx: &mut GenContext, room_id: RoomId, bounds: &Rect, direction: Direction) -> bool {
        let Some(strip) = bounds.strip(direction) else {
            return false;
        };

        let cells = strip.get_cells();
        let claimable = cells.iter().all(|coord| {
            ctx.grid.in_play(coord) && ctx.is_unclaimed(coord) && ctx.has_clearance(coord, Some(room_id))
        });

        if !claimable {
            return false;
        }

        for coord in cells {
            ctx.claim(coord, room_id);
        }

        true
    }

    /// One growth attempt for one room. Returns the work spent.
    fn grow_room(&mut self, ctx: &mut GenContext, room_id: RoomId) -> u32 {
        let growth = ctx.config.growth;
        let Some(bounds) = ctx.rooms[room_id].bounds() else {
            return 1;
        };
        let Some(state) = self.states.get_mut(&room_id) else {
            return 1;
        };

        let mut sides = DIRECTIONS
            .iter()
            .copied()
            .filter(|direction| bounds.side_length(*direction) <= state.credit)
            .map(|direction| {
                let jitter = ctx.rng.random_range(0.0..0.5_f32);
                (Self::score_side(&growth, &bounds, state, direction) + jitter, direction)
            })
            .collect::<Vec<_>>();

        if sides.is_empty() {
            state.stalled = true;
            return 1;
        }

        sides.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut work = 0;
        for (_, direction) in sides {
            work += bounds.side_length(direction);

            if Self::try_claim_strip(ctx, room_id, &bounds, direction) {
                state.credit -= bounds.side_length(direction);
                self.strips += 1;

                let Some(grown) = bounds.expanded(direction) else {
                    return work;
                };

                if grown.aspect_ratio() > growth.max_aspect {
                    let long_sides = if grown.width > grown.height {
                        [Direction::East, Direction::West]
                    } else {
                        [Direction::North, Direction::South]
                    };

                    for side in long_sides {
                        state.cooldown[side_index(side)] = growth.cooldown_passes;
                    }
                }

                return work;
            }

            state.cooldown[side_index(direction)] = growth.cooldown_passes;
        }

        // Every affordable side is blocked
        state.stalled = true;
        work
    }

    fn end_pass(&mut self, ctx: &mut GenContext) {
        for state in self.states.values_mut() {
            for cooldown in state.cooldown.iter_mut() {
                *cooldown = cooldown.saturating_sub(1);
            }
        }

        self.pass += 1;

        if self.pass % ctx.config.growth.passes_between_splits == 0 {
            self.split_rooms(ctx);
        }

        self.begin_pass();
    }

    /// Splits rooms that got too large or too stretched along their long
    /// axis. Unless walls are thin, a moat wide band at the cut goes back
    /// to rock.
    fn split_rooms(&mut self, ctx: &mut GenContext) {
        let growth = ctx.config.growth;
        let band = ctx.config.room_gap();

        let candidates = self.states.keys().copied().collect::<Vec<_>>();
        let mut splits = 0;

        for room_id in candidates {
            let room = &ctx.rooms[room_id];
            let Some(bounds) = room.bounds() else {
                continue;
            };

            // Only plain rectangles split cleanly
            if room.area() as u32 != bounds.area() {
                continue;
            }

            if bounds.area() < growth.split_area && bounds.aspect_ratio() < growth.split_aspect {
                continue;
            }

            let (axis, long) = if bounds.width >= bounds.height {
                (SplitAxis::Vertical, bounds.width)
            } else {
                (SplitAxis::Horizontal, bounds.height)
            };

            if long < band + 2 {
                continue;
            }

            let pct = ctx.rng.random_range(MIN_SPLIT_PCT..=MAX_SPLIT_PCT);
            let at = ((long as f32 * pct).round() as u32).clamp(1, long - band - 1);

            let Ok((_, rest)) = bounds.try_split_at(axis, at) else {
                continue;
            };

            let (cut, moved) = if band > 0 {
                match rest.try_split_at(axis, band) {
                    Ok((cut, moved)) => (Some(cut), moved),
                    Err(_) => continue,
                }
            } else {
                (None, rest)
            };

            let new_room = ctx.add_room(false);
            ctx.transfer(&moved.get_cells(), new_room);
            if let Some(cut) = cut {
                ctx.release(&cut.get_cells());
            }

            if let Some(state) = self.states.get_mut(&room_id) {
                let share = (state.credit as u64 * moved.area() as u64 / bounds.area() as u64) as u32;
                state.credit -= share;
                state.stalled = false;

                self.states.insert(new_room, GrowthState::new(share));
            }

            if let Some(subset) = self.subset.as_mut() {
                subset.push(new_room);
            }

            splits += 1;
        }

        if splits > 0 {
            ctx.reconcile();
            debug!("Split {} room/s on pass {}", splits, self.pass);
        }
    }
}

impl Stage for RoomGrower {
    fn kind(&self) -> StageKind {
        StageKind::Growth
    }

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus {
        if !self.started {
            self.start(ctx);
        }

        let growth = ctx.config.growth;

        loop {
            if self.order.is_empty() || self.pass >= growth.max_passes {
                event!(
                    Level::DEBUG,
                    "Growth finished after {} passes: {} strips claimed, {} rooms",
                    self.pass,
                    self.strips,
                    self.states.len()
                );
                return StageStatus::Complete;
            }

            if budget.is_exhausted() {
                return StageStatus::Yield;
            }

            let Some(&room_id) = self.order.get(self.cursor) else {
                self.end_pass(ctx);
                continue;
            };
            self.cursor += 1;

            let active = self.states.get(&room_id).is_some_and(GrowthState::is_active);
            if !active || ctx.rng.random_bool(growth.skip_prob) {
                budget.spend(1);
                continue;
            }

            let work = self.grow_room(ctx, room_id);
            budget.spend(work.max(1));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{algos::GeneratorConfig, types::Coord};

    fn grow(ctx: &mut GenContext, grower: &mut RoomGrower) {
        loop {
            let mut budget = WorkBudget::new(256);
            if grower.step(ctx, &mut budget) == StageStatus::Complete {
                break;
            }
        }
    }

    fn seeded_context(config: &GeneratorConfig, seeds: &[Coord]) -> GenContext {
        let mut ctx = GenContext::new(config).unwrap();
        for seed in seeds {
            let room_id = ctx.add_room(false);
            ctx.claim(*seed, room_id);
        }
        ctx
    }

    #[test]
    fn test_growth_stops_at_border() {
        let mut config = GeneratorConfig::default().with_size(8, 8).with_seed(3);
        config.border = 2;
        config.growth.credit_min = 20;
        config.growth.credit_max = 20;
        config.growth.split_area = 1000;
        config.growth.split_aspect = 100.0;

        let mut ctx = seeded_context(&config, &[Coord::new(3, 3)]);
        let mut grower = RoomGrower::new();
        grow(&mut ctx, &mut grower);

        let room = &ctx.rooms[0];
        let bounds = room.bounds().unwrap();

        assert!(grower.pass < config.growth.max_passes);
        assert!(room.area() <= 21);
        assert!(ctx.grid.play_area().contains(&bounds.origin));
        assert!(bounds.max_col() <= 5 && bounds.max_row() <= 5);
        assert_eq!(room.area() as u32, bounds.area());
    }

    #[test]
    fn test_close_rooms_never_touch() {
        let mut config = GeneratorConfig::default().with_size(20, 12).with_seed(6);
        config.moat = 1;
        config.growth.credit_min = 40;
        config.growth.credit_max = 40;
        config.growth.split_area = 1000;
        config.growth.split_aspect = 100.0;

        let mut ctx = seeded_context(&config, &[Coord::new(8, 5), Coord::new(10, 5)]);
        let mut grower = RoomGrower::new();
        grow(&mut ctx, &mut grower);

        let a = ctx.rooms[0].bounds().unwrap();
        let b = ctx.rooms[1].bounds().unwrap();

        for coord_a in a.get_cells() {
            for coord_b in b.get_cells() {
                assert!(coord_a.chebyshev(&coord_b) > 1);
            }
        }
    }

    #[test]
    fn test_large_rooms_get_split() {
        let mut config = GeneratorConfig::default().with_size(40, 20).with_seed(12);
        config.moat = 1;
        config.growth.credit_min = 300;
        config.growth.credit_max = 300;
        config.growth.split_area = 30;
        config.growth.passes_between_splits = 4;

        let mut ctx = seeded_context(&config, &[Coord::new(20, 10)]);
        let mut grower = RoomGrower::new();
        grow(&mut ctx, &mut grower);

        assert!(ctx.rooms.len() > 1);
        for room in ctx.rooms.iter().filter(|room| !room.is_empty()) {
            let bounds = room.bounds().unwrap();
            assert_eq!(Rect::enclosing(room.cells().iter()), Some(bounds));
            for coord in room.cells() {
                assert!(ctx.has_clearance(coord, Some(room.id())));
            }
        }
    }

    #[test]
    fn test_subset_only_grows_listed_rooms() {
        let config = GeneratorConfig::default().with_size(30, 30).with_seed(1);

        let mut ctx = seeded_context(&config, &[Coord::new(5, 5), Coord::new(20, 20)]);
        let mut grower = RoomGrower::for_rooms(vec![1]);
        grow(&mut ctx, &mut grower);

        assert_eq!(ctx.rooms[0].area(), 1);
        assert!(ctx.rooms[1].area() > 1);
    }

    fn strip_room(config: &GeneratorConfig, cells: &[Coord], credit: u32) -> (GenContext, RoomGrower) {
        let mut ctx = GenContext::new(config).unwrap();
        let room_id = ctx.add_room(false);
        for coord in cells {
            ctx.claim(*coord, room_id);
        }

        let mut grower = RoomGrower::new();
        grower.states.insert(room_id, GrowthState::new(credit));
        (ctx, grower)
    }

    #[test]
    fn test_stretched_room_cools_down_its_long_axis() {
        let config = GeneratorConfig::default().with_size(20, 20).with_seed(2);
        let cells = [Coord::new(8, 8), Coord::new(9, 8), Coord::new(10, 8)];

        // Only the one cell end strips are affordable
        let (mut ctx, mut grower) = strip_room(&config, &cells, 1);
        grower.grow_room(&mut ctx, 0);

        let bounds = ctx.rooms[0].bounds().unwrap();
        assert_eq!((bounds.width, bounds.height), (4, 1));
        assert!(bounds.aspect_ratio() > config.growth.max_aspect);

        let state = &grower.states[&0];
        let cooldown = config.growth.cooldown_passes;
        assert_eq!(state.cooldown[side_index(Direction::East)], cooldown);
        assert_eq!(state.cooldown[side_index(Direction::West)], cooldown);
        assert_eq!(state.cooldown[side_index(Direction::North)], 0);
        assert_eq!(state.cooldown[side_index(Direction::South)], 0);
        assert_eq!(state.credit, 0);
    }

    #[test]
    fn test_compact_room_keeps_every_side_open() {
        let config = GeneratorConfig::default().with_size(20, 20).with_seed(2);
        let cells = [Coord::new(8, 8), Coord::new(9, 8), Coord::new(8, 9), Coord::new(9, 9)];

        let (mut ctx, mut grower) = strip_room(&config, &cells, 2);
        grower.grow_room(&mut ctx, 0);

        assert_eq!(ctx.rooms[0].area(), 6);
        assert_eq!(grower.states[&0].cooldown, [0; 4]);
    }
}
