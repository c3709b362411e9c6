use super::{Walker, WalkerMove, auto_walk_length, paint};
use crate::{
    algos::{
        StageKind, StageStatus, WorkBudget,
        dungeon_builder::{GenContext, Stage},
    },
    types::RoomId,
};

use tracing::debug;

/// Walkers paint corridor wherever they go. They run one after the other
/// so that the random stream does not depend on the step budget.
pub(super) struct RandomWalkCarver {
    walkers: Vec<(Walker, RoomId)>,
    current: usize,
    spawned: bool,
}

impl RandomWalkCarver {
    pub fn new() -> Self {
        RandomWalkCarver {
            walkers: Vec::new(),
            current: 0,
            spawned: false,
        }
    }

    fn spawn_walkers(&mut self, ctx: &mut GenContext) {
        let steps = auto_walk_length(ctx);
        let area = ctx.grid.play_area();
        let merged_room = ctx.config.corridors.merge_walks.then(|| ctx.add_room(true));

        for _ in 0..ctx.config.corridors.walkers {
            let room_id = match merged_room {
                Some(room_id) => room_id,
                None => ctx.add_room(true),
            };

            let walker = Walker::spawn(area, steps, &mut ctx.rng);
            self.walkers.push((walker, room_id));
        }

        debug!(
            "Spawned {} walker/s of {} steps each",
            self.walkers.len(),
            steps
        );
        self.spawned = true;
    }
}

impl Stage for RandomWalkCarver {
    fn kind(&self) -> StageKind {
        StageKind::Corridors
    }

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus {
        if !self.spawned {
            self.spawn_walkers(ctx);
        }

        let wander = ctx.config.corridors.wander;
        let min_straight = ctx.config.corridors.min_straight;
        let merge = ctx.config.corridors.merge_walks;

        while let Some((walker, room_id)) = self.walkers.get_mut(self.current) {
            if walker.steps_left == 0 {
                self.current += 1;
                continue;
            }

            if budget.is_exhausted() {
                return StageStatus::Yield;
            }

            budget.spend(paint(ctx, walker.position, *room_id));

            let teleported = matches!(
                walker.advance(&ctx.grid, wander, min_straight, &mut ctx.rng),
                WalkerMove::Teleported
            );

            // Without merging, every disconnected piece is a room of its own
            if teleported && !merge {
                *room_id = ctx.add_room(true);
            }

            if walker.steps_left == 0 {
                let last = walker.position;
                let room_id = *room_id;
                paint(ctx, last, room_id);
            }
        }

        if merge {
            ctx.regroup_corridors();
        }

        debug!("Carved {} corridor cells", ctx.corridors.len());

        StageStatus::Complete
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::algos::GeneratorConfig;

    fn run(config: &GeneratorConfig) -> GenContext {
        let mut ctx = GenContext::new(config).unwrap();
        let mut carver = RandomWalkCarver::new();

        loop {
            let mut budget = WorkBudget::new(64);
            if carver.step(&mut ctx, &mut budget) == StageStatus::Complete {
                break;
            }
        }

        ctx
    }

    #[test]
    fn test_single_walk_is_one_corridor_room() {
        let config = GeneratorConfig::default().with_size(40, 40).with_seed(11);
        let ctx = run(&config);

        let corridor_rooms = ctx.rooms.iter().filter(|room| room.is_corridor()).count();

        assert!(!ctx.corridors.is_empty());
        assert_eq!(corridor_rooms, 1);
        assert_eq!(ctx.rooms[0].area(), ctx.corridors.len());
    }

    #[test]
    fn test_corridors_respect_border() {
        let mut config = GeneratorConfig::default().with_size(30, 20).with_seed(5);
        config.border = 3;
        config.corridors.width = 3;
        config.corridors.walkers = 2;
        let ctx = run(&config);

        assert!(
            ctx.grid
                .iter()
                .filter(|cell| cell.is_corridor())
                .all(|cell| ctx.grid.in_play(&cell.coord()))
        );
    }

    #[test]
    fn test_unmerged_walkers_keep_their_rooms() {
        let mut config = GeneratorConfig::default().with_size(40, 30).with_seed(8);
        config.corridors.walkers = 3;
        config.corridors.merge_walks = false;
        let ctx = run(&config);

        assert!(ctx.rooms.iter().filter(|room| room.is_corridor()).count() >= 3);
        for room in ctx.rooms.iter() {
            for coord in room.cells() {
                assert_eq!(ctx.grid.cell(coord).unwrap().room(), Some(room.id()));
            }
        }
    }

    #[test]
    fn test_same_seed_same_corridors() {
        let config = GeneratorConfig::default().with_size(32, 32).with_seed(21);

        assert_eq!(run(&config).corridors.sorted_cells(), run(&config).corridors.sorted_cells());
    }
}
