use super::{GenContext, SeedAlgorithm, Stage};
use crate::{
    algos::{StageKind, StageStatus, WorkBudget},
    constants::{DIRECTIONS, SEED_REACH_SLACK},
    types::{Coord, Direction, RoomId},
};

use rand::{Rng, seq::SliceRandom};
use tracing::{Level, debug, event};

pub(super) struct RoomSeederFactory;

impl RoomSeederFactory {
    pub fn seeder_for(algorithm: SeedAlgorithm) -> Box<dyn Stage> {
        match algorithm {
            SeedAlgorithm::AlongCorridors => Box::new(CorridorSeeder::new()),
            SeedAlgorithm::Scattered => Box::new(ScatterSeeder),
        }
    }
}

/// Plants a one cell room at `coord`.
pub(super) fn plant_seed(ctx: &mut GenContext, coord: Coord) -> RoomId {
    let room_id = ctx.add_room(false);
    ctx.claim(coord, room_id);
    room_id
}

/// Plants seeds on random cells with clearance, at least `spacing` apart.
pub(super) fn scatter_seeds(ctx: &mut GenContext, count: u32, spacing: u32) -> Vec<RoomId> {
    let area = ctx.grid.play_area();
    let mut planted: Vec<(Coord, RoomId)> = Vec::new();

    for _ in 0..count.saturating_mul(8) {
        if planted.len() as u32 >= count {
            break;
        }

        let coord = Coord::new(
            ctx.rng.random_range(area.origin.col..=area.max_col()),
            ctx.rng.random_range(area.origin.row..=area.max_row()),
        );

        if !ctx.is_unclaimed(&coord) || !ctx.has_clearance(&coord, None) {
            continue;
        }

        if planted.iter().any(|(other, _)| other.distance(&coord) < spacing) {
            continue;
        }

        planted.push((coord, plant_seed(ctx, coord)));
    }

    planted.into_iter().map(|(_, room_id)| room_id).collect()
}

struct ScatterSeeder;

impl Stage for ScatterSeeder {
    fn kind(&self) -> StageKind {
        StageKind::Seeding
    }

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus {
        let seeding = ctx.config.seeding;
        let count = if seeding.scatter_count > 0 {
            seeding.scatter_count
        } else {
            (ctx.grid.play_area().area() / (seeding.spacing * seeding.spacing)).max(1)
        };

        let planted = scatter_seeds(ctx, count, seeding.spacing);
        budget.spend(count.saturating_mul(8));

        debug!("Scattered {} room seed/s", planted.len());

        StageStatus::Complete
    }
}

enum Phase {
    Collect,
    Place {
        anchors: Vec<Coord>,
        next: usize,
        last_side: Option<Direction>,
    },
}

/// Seeds rooms beside the corridors, alternating sides.
struct CorridorSeeder {
    phase: Phase,
    planted: usize,
}

impl CorridorSeeder {
    fn new() -> Self {
        CorridorSeeder {
            phase: Phase::Collect,
            planted: 0,
        }
    }

    fn spine_neighbours(ctx: &GenContext, coord: &Coord) -> usize {
        coord
            .neighbours()
            .filter(|(_, neighbour)| {
                ctx.grid
                    .index_of(neighbour)
                    .is_some_and(|idx| ctx.corridors.is_spine(idx))
            })
            .count()
    }

    fn spine_run(ctx: &GenContext, coord: &Coord, direction: Direction, limit: u32) -> u32 {
        let mut run = 0;
        let mut current = *coord;

        while run < limit {
            match current.step(direction).filter(|next| {
                ctx.grid
                    .index_of(next)
                    .is_some_and(|idx| ctx.corridors.is_spine(idx))
            }) {
                Some(next) => {
                    current = next;
                    run += 1;
                }
                None => break,
            }
        }

        run
    }

    /// The axis the corridor runs along at `coord`, as the direction of its
    /// positive end.
    fn tangent(ctx: &GenContext, coord: &Coord, limit: u32) -> Direction {
        let runs = DIRECTIONS.map(|direction| Self::spine_run(ctx, coord, direction, limit));
        let [north, south, east, west] = runs;

        let horizontal = east + west;
        let vertical = north + south;

        if horizontal != vertical {
            return if horizontal > vertical {
                Direction::East
            } else {
                Direction::South
            };
        }

        if east.max(west) >= north.max(south) {
            Direction::East
        } else {
            Direction::South
        }
    }

    fn collect_anchors(ctx: &mut GenContext) -> Vec<Coord> {
        let spacing = ctx.config.seeding.spacing;

        let mut candidates = ctx
            .corridors
            .sorted_spine()
            .into_iter()
            .map(|idx| ctx.grid.coord_of(idx))
            .filter(|coord| (1..=2).contains(&Self::spine_neighbours(ctx, coord)))
            .collect::<Vec<_>>();

        candidates.shuffle(&mut ctx.rng);

        let mut anchors: Vec<Coord> = Vec::new();
        for candidate in candidates {
            if anchors
                .iter()
                .all(|anchor| anchor.distance(&candidate) >= spacing)
            {
                anchors.push(candidate);
            }
        }

        anchors
    }

    /// Slides `anchor` up to `jitter` cells along the corridor.
    fn jitter(ctx: &mut GenContext, anchor: Coord, tangent: Direction) -> Coord {
        let jitter = ctx.config.seeding.jitter;
        if jitter == 0 {
            return anchor;
        }

        let offset = ctx.rng.random_range(-(jitter as i64)..=jitter as i64);
        let direction = if offset < 0 { tangent.reverse() } else { tangent };
        let distance = offset.unsigned_abs() as u32;

        let reach = Self::spine_run(ctx, &anchor, direction, distance);
        anchor.step_by(direction, reach).unwrap_or(anchor)
    }

    /// Walks away from the corridor looking for the first cell that can hold
    /// a room.
    fn find_seed(ctx: &GenContext, anchor: Coord, side: Direction) -> Option<Coord> {
        let reach = ctx.config.corridors.width + ctx.config.moat + SEED_REACH_SLACK;

        for distance in 1..=reach {
            let coord = anchor.step_by(side, distance)?;
            if !ctx.grid.in_play(&coord) || ctx.room_at(&coord).is_some() {
                return None;
            }

            if ctx.is_unclaimed(&coord) && ctx.has_clearance(&coord, None) {
                return Some(coord);
            }
        }

        None
    }

    fn pick_side(ctx: &mut GenContext, tangent: Direction, last_side: Option<Direction>) -> Direction {
        let sides = tangent.perpendicular();
        let alternate = ctx.config.seeding.alternate_side_prob;

        match last_side {
            Some(last) if ctx.rng.random_bool(alternate) => {
                if sides[0] == last { sides[1] } else { sides[0] }
            }
            _ => sides[ctx.rng.random_range(0..sides.len())],
        }
    }
}

impl Stage for CorridorSeeder {
    fn kind(&self) -> StageKind {
        StageKind::Seeding
    }

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus {
        loop {
            if budget.is_exhausted() {
                return StageStatus::Yield;
            }

            match &mut self.phase {
                Phase::Collect => {
                    if ctx.corridors.is_empty() {
                        debug!("No corridors to seed along, scattering seeds instead");
                        return ScatterSeeder.step(ctx, budget);
                    }

                    let anchors = Self::collect_anchors(ctx);
                    budget.spend(ctx.corridors.len() as u32);

                    event!(Level::DEBUG, "Collected {} seed anchors", anchors.len());
                    self.phase = Phase::Place {
                        anchors,
                        next: 0,
                        last_side: None,
                    };
                }
                Phase::Place {
                    anchors,
                    next,
                    last_side,
                } => {
                    let Some(&anchor) = anchors.get(*next) else {
                        debug!("Planted {} room seed/s along corridors", self.planted);
                        return StageStatus::Complete;
                    };
                    *next += 1;

                    let limit = ctx.config.seeding.spacing;
                    let tangent = Self::tangent(ctx, &anchor, limit);
                    let anchor = Self::jitter(ctx, anchor, tangent);

                    let side = Self::pick_side(ctx, tangent, *last_side);
                    let seed = Self::find_seed(ctx, anchor, side)
                        .map(|coord| (coord, side))
                        .or_else(|| {
                            Self::find_seed(ctx, anchor, side.reverse())
                                .map(|coord| (coord, side.reverse()))
                        });

                    budget.spend(limit * 4);

                    if let Some((coord, side)) = seed {
                        plant_seed(ctx, coord);
                        *last_side = Some(side);
                        self.planted += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::algos::{
        CorridorAlgorithm, GeneratorConfig, dungeon_builder::carve_corridors::CorridorCarverFactory,
    };

    fn carve_and_seed(config: &GeneratorConfig) -> GenContext {
        let mut ctx = GenContext::new(config).unwrap();
        let mut stages = vec![
            CorridorCarverFactory::carver_for(config.corridors.algorithm),
            RoomSeederFactory::seeder_for(config.seeding.algorithm),
        ];

        for stage in stages.iter_mut() {
            loop {
                let mut budget = WorkBudget::new(128);
                if stage.step(&mut ctx, &mut budget) == StageStatus::Complete {
                    break;
                }
            }
        }

        ctx
    }

    #[test]
    fn test_seeds_keep_moat_from_corridors() {
        let config = GeneratorConfig::default().with_size(40, 40).with_seed(4);
        let ctx = carve_and_seed(&config);

        let seeds = ctx.rooms.iter().filter(|room| !room.is_corridor()).collect::<Vec<_>>();
        assert!(!seeds.is_empty());

        for room in seeds {
            assert_eq!(room.area(), 1);
            let coord = room.cells()[0];
            assert!(!ctx.near_corridor(&coord));
            assert!(ctx.has_clearance(&coord, Some(room.id())));
        }
    }

    #[test]
    fn test_no_corridors_falls_back_to_scatter() {
        let mut config = GeneratorConfig::default().with_size(24, 24).with_seed(9);
        config.corridors.algorithm = CorridorAlgorithm::None;
        let ctx = carve_and_seed(&config);

        assert!(ctx.corridors.is_empty());
        assert!(!ctx.rooms.is_empty());
        assert!(ctx.rooms.iter().all(|room| !room.is_corridor()));
    }

    #[test]
    fn test_scatter_respects_spacing() {
        let mut config = GeneratorConfig::default().with_size(30, 30).with_seed(2);
        config.corridors.algorithm = CorridorAlgorithm::None;
        config.seeding.algorithm = SeedAlgorithm::Scattered;
        config.seeding.spacing = 6;
        let ctx = carve_and_seed(&config);

        let seeds = ctx.rooms.iter().map(|room| room.cells()[0]).collect::<Vec<_>>();
        for (idx, a) in seeds.iter().enumerate() {
            for b in seeds.iter().skip(idx + 1) {
                assert!(a.distance(b) >= 6);
            }
        }
    }

    #[test]
    fn test_tangent_follows_corridor() {
        let config = GeneratorConfig::default().with_size(12, 12).with_seed(1);
        let mut ctx = GenContext::new(&config).unwrap();
        let corridor = ctx.add_room(true);

        for col in 2..9 {
            let coord = Coord::new(col, 5);
            ctx.mark_corridor(coord, corridor);
            ctx.mark_spine(&coord);
        }

        assert_eq!(CorridorSeeder::tangent(&ctx, &Coord::new(5, 5), 6), Direction::East);
        assert_eq!(
            CorridorSeeder::find_seed(&ctx, Coord::new(5, 5), Direction::North),
            Some(Coord::new(5, 3))
        );
    }

    #[test]
    fn test_jitter_stays_on_the_spine() {
        let config = GeneratorConfig::default().with_size(12, 12).with_seed(1);
        let mut ctx = GenContext::new(&config).unwrap();
        let corridor = ctx.add_room(true);

        for col in 2..9 {
            let coord = Coord::new(col, 5);
            ctx.mark_corridor(coord, corridor);
            ctx.mark_spine(&coord);
        }

        // Set past sanitizing, the slide must still be bounded by the spine
        ctx.config.seeding.jitter = u32::MAX;
        for _ in 0..32 {
            let moved = CorridorSeeder::jitter(&mut ctx, Coord::new(5, 5), Direction::East);
            assert_eq!(moved.row, 5);
            assert!((2..9).contains(&moved.col));
        }
    }
}
