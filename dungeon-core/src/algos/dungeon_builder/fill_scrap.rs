use super::{
    GenContext, ProxyPoint, ScrapAlgorithm, ScrapSeedPlacement, Stage, grow_rooms::RoomGrower,
    seed_rooms::plant_seed,
};
use crate::{
    algos::{StageKind, StageStatus, WorkBudget},
    types::{Coord, RoomId},
};

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use tinyset::SetUsize;
use tracing::{Level, debug, event};

pub(super) struct ScrapFillerFactory;

impl ScrapFillerFactory {
    pub fn filler_for(algorithm: ScrapAlgorithm) -> Box<dyn Stage> {
        match algorithm {
            ScrapAlgorithm::None => Box::new(NoScrapFill),
            ScrapAlgorithm::Voronoi => Box::new(VoronoiFiller::new()),
            ScrapAlgorithm::SeedAndGrow => Box::new(SeedAndGrowFiller::new()),
        }
    }
}

struct NoScrapFill;

impl Stage for NoScrapFill {
    fn kind(&self) -> StageKind {
        StageKind::Scrap
    }

    fn step(&mut self, _ctx: &mut GenContext, _budget: &mut WorkBudget) -> StageStatus {
        StageStatus::Complete
    }
}

enum VoronoiPhase {
    Assign { next: usize },
    Peel { iteration: u32 },
    Trim,
}

/// Hands every leftover cell to the closest room, then peels the new cells
/// back wherever they crowd another owner.
struct VoronoiFiller {
    phase: VoronoiPhase,
    proxies: Vec<(RoomId, Coord)>,
    assigned: Vec<Coord>,
    // What each room owned before the fill, used to drop orphaned fragments
    original: Vec<(RoomId, Vec<Coord>)>,
}

impl VoronoiFiller {
    fn new() -> Self {
        VoronoiFiller {
            phase: VoronoiPhase::Assign { next: 0 },
            proxies: Vec::new(),
            assigned: Vec::new(),
            original: Vec::new(),
        }
    }

    fn prepare(&mut self, ctx: &GenContext) {
        let proxy = ctx.config.scrap.proxy;

        for room in ctx.rooms.iter().filter(|room| !room.is_corridor() && !room.is_empty()) {
            let point = match proxy {
                ProxyPoint::Centroid => room.get_center().rounded(),
                ProxyPoint::FirstCell => room.cells()[0],
            };

            self.proxies.push((room.id(), point));
            self.original.push((room.id(), room.cells().to_vec()));
        }
    }

    fn nearest_room(&self, coord: &Coord) -> Option<RoomId> {
        // Strict comparison keeps the lower id on ties
        let mut best: Option<(u32, RoomId)> = None;
        for (room_id, proxy) in self.proxies.iter() {
            let distance = proxy.distance(coord);
            if best.is_none_or(|(best_distance, _)| distance < best_distance) {
                best = Some((distance, *room_id));
            }
        }

        best.map(|(_, room_id)| room_id)
    }

    /// Whether a freshly assigned cell sits within the moat of a corridor
    /// or of another room.
    fn crowds_neighbour(ctx: &GenContext, coord: &Coord, owner: RoomId) -> bool {
        !ctx.has_clearance(coord, Some(owner))
    }

    fn peel(&self, ctx: &mut GenContext) -> usize {
        let mut peeled = 0;

        // In place, so earlier releases are seen by later checks
        for coord in self.assigned.iter() {
            let Some(owner) = ctx.room_at(coord) else {
                continue;
            };

            if Self::crowds_neighbour(ctx, coord, owner) {
                ctx.release(std::slice::from_ref(coord));
                peeled += 1;
            }
        }

        peeled
    }

    /// Releases room cells no longer connected to what the room owned
    /// before the fill.
    fn trim_orphans(&self, ctx: &mut GenContext) -> usize {
        let mut orphans = Vec::new();

        for (room_id, cells) in self.original.iter() {
            let mut reached = SetUsize::new();
            let mut queue = cells
                .iter()
                .filter(|coord| ctx.room_at(coord) == Some(*room_id))
                .copied()
                .collect::<VecDeque<_>>();

            for coord in queue.iter() {
                if let Some(idx) = ctx.grid.index_of(coord) {
                    reached.insert(idx);
                }
            }

            while let Some(coord) = queue.pop_front() {
                for (_, neighbour) in coord.neighbours() {
                    if ctx.room_at(&neighbour) != Some(*room_id) {
                        continue;
                    }

                    if let Some(idx) = ctx.grid.index_of(&neighbour) {
                        if reached.insert(idx) {
                            queue.push_back(neighbour);
                        }
                    }
                }
            }

            for coord in ctx.rooms[*room_id].cells() {
                let idx = ctx.grid.index_of(coord);
                if idx.is_some_and(|idx| !reached.contains(idx)) {
                    orphans.push(*coord);
                }
            }
        }

        let count = orphans.len();
        ctx.release(&orphans);
        count
    }
}

impl Stage for VoronoiFiller {
    fn kind(&self) -> StageKind {
        StageKind::Scrap
    }

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus {
        if matches!(self.phase, VoronoiPhase::Assign { next: 0 }) && self.proxies.is_empty() {
            self.prepare(ctx);
            if self.proxies.is_empty() {
                debug!("No rooms to hand scrap to");
                return StageStatus::Complete;
            }
        }

        let total = ctx.grid.width() as usize * ctx.grid.height() as usize;

        loop {
            if budget.is_exhausted() {
                return StageStatus::Yield;
            }

            match &mut self.phase {
                VoronoiPhase::Assign { next } => {
                    if *next >= total {
                        event!(Level::DEBUG, "Assigned {} scrap cells", self.assigned.len());
                        self.phase = VoronoiPhase::Peel { iteration: 0 };
                        continue;
                    }

                    let coord = ctx.grid.coord_of(*next);
                    *next += 1;
                    budget.spend(1);

                    if !ctx.grid.in_play(&coord) || !ctx.is_unclaimed(&coord) || ctx.near_corridor(&coord) {
                        continue;
                    }

                    if let Some(room_id) = self.nearest_room(&coord) {
                        ctx.claim(coord, room_id);
                        self.assigned.push(coord);
                        budget.spend(self.proxies.len() as u32);
                    }
                }
                VoronoiPhase::Peel { iteration } => {
                    if *iteration >= ctx.config.scrap.peel_iterations {
                        self.phase = VoronoiPhase::Trim;
                        continue;
                    }

                    *iteration += 1;
                    let round = *iteration;

                    let peeled = self.peel(ctx);
                    budget.spend(self.assigned.len() as u32);

                    debug!("Peel round {} released {} cells", round, peeled);
                    if peeled == 0 {
                        self.phase = VoronoiPhase::Trim;
                    }
                }
                VoronoiPhase::Trim => {
                    let trimmed = self.trim_orphans(ctx);
                    event!(Level::DEBUG, "Trimmed {} orphaned scrap cells", trimmed);

                    ctx.reconcile();
                    return StageStatus::Complete;
                }
            }
        }
    }
}

/// Seeds fresh rooms inside scrap regions and grows them, round after round.
struct SeedAndGrowFiller {
    round: u32,
    grower: Option<RoomGrower>,
}

impl SeedAndGrowFiller {
    fn new() -> Self {
        SeedAndGrowFiller {
            round: 0,
            grower: None,
        }
    }

    fn is_seedable(ctx: &GenContext, coord: &Coord) -> bool {
        ctx.is_unclaimed(coord) && ctx.has_clearance(coord, None)
    }

    /// Connected groups of cells that could still hold a room, in raster
    /// order of their first cell.
    fn scrap_regions(ctx: &GenContext) -> Vec<Vec<Coord>> {
        let mut visited = SetUsize::new();
        let mut regions = Vec::new();

        for cell in ctx.grid.iter() {
            let start = cell.coord();
            let Some(start_idx) = ctx.grid.index_of(&start) else {
                continue;
            };

            if visited.contains(start_idx) || !Self::is_seedable(ctx, &start) {
                continue;
            }

            visited.insert(start_idx);
            let mut region = vec![start];
            let mut queue = VecDeque::from([start]);

            while let Some(coord) = queue.pop_front() {
                for (_, neighbour) in coord.neighbours() {
                    let Some(idx) = ctx.grid.index_of(&neighbour) else {
                        continue;
                    };

                    if !visited.contains(idx) && Self::is_seedable(ctx, &neighbour) {
                        visited.insert(idx);
                        region.push(neighbour);
                        queue.push_back(neighbour);
                    }
                }
            }

            regions.push(region);
        }

        regions
    }

    fn plant_region(ctx: &mut GenContext, region: Vec<Coord>) -> Vec<RoomId> {
        let scrap = ctx.config.scrap;

        let candidates = match scrap.placement {
            ScrapSeedPlacement::Scatter => {
                let mut cells = region;
                cells.shuffle(&mut ctx.rng);
                cells
            }
            ScrapSeedPlacement::Perimeter => {
                let inside = region.iter().copied().collect::<std::collections::BTreeSet<_>>();
                region
                    .into_iter()
                    .filter(|coord| {
                        coord.neighbours().count() < 4
                            || coord.neighbours().any(|(_, n)| !inside.contains(&n))
                    })
                    .collect()
            }
        };

        let mut planted: Vec<(Coord, RoomId)> = Vec::new();
        for coord in candidates {
            if planted
                .iter()
                .any(|(other, _)| other.distance(&coord) < scrap.seed_spacing)
            {
                continue;
            }

            // Seeds of this round count against each other's clearance
            if !Self::is_seedable(ctx, &coord) {
                continue;
            }

            planted.push((coord, plant_seed(ctx, coord)));
        }

        planted.into_iter().map(|(_, room_id)| room_id).collect()
    }
}

impl Stage for SeedAndGrowFiller {
    fn kind(&self) -> StageKind {
        StageKind::Scrap
    }

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus {
        loop {
            if budget.is_exhausted() {
                return StageStatus::Yield;
            }

            if let Some(grower) = self.grower.as_mut() {
                if grower.step(ctx, budget) == StageStatus::Yield {
                    return StageStatus::Yield;
                }

                self.grower = None;
                self.round += 1;
                continue;
            }

            if self.round >= ctx.config.scrap.max_rounds {
                debug!("Scrap filling hit its round limit");
                break;
            }

            let min_region = ctx.config.scrap.min_region as usize;
            let regions = Self::scrap_regions(ctx)
                .into_iter()
                .filter(|region| region.len() >= min_region)
                .collect::<Vec<_>>();

            let cells = regions.iter().map(Vec::len).sum::<usize>();
            budget.spend(ctx.grid.width() * ctx.grid.height());

            let mut seeds = Vec::new();
            for region in regions {
                seeds.extend(Self::plant_region(ctx, region));
            }

            event!(
                Level::DEBUG,
                "Scrap round {} planted {} seed/s over {} cells",
                self.round,
                seeds.len(),
                cells
            );

            if seeds.is_empty() {
                break;
            }

            self.grower = Some(RoomGrower::for_rooms(seeds));
        }

        ctx.reconcile();
        StageStatus::Complete
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::algos::GeneratorConfig;

    fn run(ctx: &mut GenContext, stage: &mut dyn Stage) {
        loop {
            let mut budget = WorkBudget::new(200);
            if stage.step(ctx, &mut budget) == StageStatus::Complete {
                break;
            }
        }
    }

    fn two_rooms(config: &GeneratorConfig) -> GenContext {
        let mut ctx = GenContext::new(config).unwrap();
        let a = ctx.add_room(false);
        let b = ctx.add_room(false);

        for coord in crate::types::Rect::new(2, 2, 3, 3).get_cells() {
            ctx.claim(coord, a);
        }
        for coord in crate::types::Rect::new(12, 6, 3, 3).get_cells() {
            ctx.claim(coord, b);
        }

        ctx
    }

    fn assert_moat(ctx: &GenContext) {
        for room in ctx.rooms.iter().filter(|room| !room.is_corridor()) {
            for coord in room.cells() {
                assert!(ctx.has_clearance(coord, Some(room.id())), "{} crowds", coord);
            }
        }
    }

    #[test]
    fn test_voronoi_fills_and_keeps_moat() {
        let config = GeneratorConfig::default().with_size(18, 12).with_seed(1);
        let mut ctx = two_rooms(&config);

        run(&mut ctx, &mut VoronoiFiller::new());

        assert!(ctx.rooms[0].area() > 9);
        assert!(ctx.rooms[1].area() > 9);
        assert_moat(&ctx);

        // Only the moat between the two rooms is left unclaimed
        let unclaimed = ctx
            .grid
            .iter()
            .filter(|cell| ctx.grid.in_play(&cell.coord()) && cell.is_unclaimed())
            .count();
        assert!(unclaimed < 40);
    }

    #[test]
    fn test_voronoi_rooms_stay_connected() {
        let config = GeneratorConfig::default().with_size(18, 12).with_seed(1);
        let mut ctx = two_rooms(&config);
        run(&mut ctx, &mut VoronoiFiller::new());

        for room in ctx.rooms.iter() {
            let mut seen = vec![room.cells()[0]];
            let mut queue = vec![room.cells()[0]];
            while let Some(coord) = queue.pop() {
                for (_, neighbour) in coord.neighbours() {
                    if ctx.room_at(&neighbour) == Some(room.id()) && !seen.contains(&neighbour) {
                        seen.push(neighbour);
                        queue.push(neighbour);
                    }
                }
            }
            assert_eq!(seen.len(), room.area());
        }
    }

    #[test]
    fn test_seed_and_grow_packs_empty_map() {
        let mut config = GeneratorConfig::default().with_size(24, 24).with_seed(5);
        config.scrap.algorithm = ScrapAlgorithm::SeedAndGrow;
        let mut ctx = GenContext::new(&config).unwrap();

        run(&mut ctx, &mut SeedAndGrowFiller::new());

        assert!(ctx.rooms.len() > 1);
        assert!(ctx.rooms.iter().all(|room| room.area() > 1));
        assert_moat(&ctx);
    }

    #[test]
    fn test_perimeter_seeds_sit_on_region_edge() {
        let mut config = GeneratorConfig::default().with_size(16, 16).with_seed(5);
        config.scrap.placement = ScrapSeedPlacement::Perimeter;
        config.scrap.seed_spacing = 4;
        let mut ctx = GenContext::new(&config).unwrap();

        let region = SeedAndGrowFiller::scrap_regions(&ctx).remove(0);
        let seeds = SeedAndGrowFiller::plant_region(&mut ctx, region);

        assert!(!seeds.is_empty());
        let area = ctx.grid.play_area();
        for room_id in seeds {
            let coord = ctx.rooms[room_id].cells()[0];
            let on_edge = coord.col == area.origin.col
                || coord.row == area.origin.row
                || coord.col == area.max_col()
                || coord.row == area.max_row();
            assert!(on_edge);
        }
    }
}
