use super::{GeneratorConfig, add_doors::DoorReport};
use crate::{
    algos::RngHandler,
    constants::{CORRIDOR_COLOR, DIRECTIONS, FLOOR_COST, IMPASSABLE_COST, ROOM_PALETTE},
    error::DungeonError,
    grid::Grid,
    types::{Coord, EdgeSet, Room, RoomId},
};

use rand::rngs::StdRng;
use tinyset::SetUsize;
use tracing::debug;

/// Mirror of the corridor cells, by grid index. The spine holds the centre
/// line the carvers walked, which is what seeding and dead end detection
/// look at when corridors are wider than one cell.
#[derive(Debug, Clone)]
pub(crate) struct CorridorSet {
    cells: SetUsize,
    spine: SetUsize,
}

impl CorridorSet {
    pub fn new() -> Self {
        CorridorSet {
            cells: SetUsize::new(),
            spine: SetUsize::new(),
        }
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.cells.contains(idx)
    }

    pub fn is_spine(&self, idx: usize) -> bool {
        self.spine.contains(idx)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.len() == 0
    }

    // Set iteration order is not stable, callers that draw random numbers
    // per element need these sorted views.
    pub fn sorted_cells(&self) -> Vec<usize> {
        let mut cells = self.cells.iter().collect::<Vec<_>>();
        cells.sort_unstable();
        cells
    }

    pub fn sorted_spine(&self) -> Vec<usize> {
        let mut spine = self.spine.iter().collect::<Vec<_>>();
        spine.sort_unstable();
        spine
    }
}

/// Everything a run mutates. Stages receive it explicitly, nothing about a
/// run lives outside of it.
pub(crate) struct GenContext {
    pub config: GeneratorConfig,
    pub grid: Grid,
    pub rooms: Vec<Room>,
    pub corridors: CorridorSet,
    pub rng: StdRng,
    pub seed: u64,
    pub door_report: DoorReport,
}

impl GenContext {
    pub fn new(config: &GeneratorConfig) -> Result<Self, DungeonError> {
        let config = config.sanitized();
        let grid = Grid::new(config.width, config.height, config.border)?;

        let seed = match config.seed {
            Some(seed) if !config.randomize => seed,
            _ => RngHandler::fresh_seed(),
        };
        debug!("Generating a [{}x{}] dungeon with seed {}", grid.width(), grid.height(), seed);

        Ok(GenContext {
            config,
            grid,
            rooms: Vec::new(),
            corridors: CorridorSet::new(),
            rng: RngHandler::seeded(seed),
            seed,
            door_report: DoorReport::default(),
        })
    }

    pub fn add_room(&mut self, corridor: bool) -> RoomId {
        let id = self.rooms.len();
        let color = if corridor {
            CORRIDOR_COLOR
        } else {
            ROOM_PALETTE[id % ROOM_PALETTE.len()]
        };

        self.rooms.push(Room::new(id, color, corridor));

        id
    }

    pub fn is_unclaimed(&self, coord: &Coord) -> bool {
        self.grid.cell(coord).is_some_and(|cell| cell.is_unclaimed())
    }

    /// The non corridor room owning `coord`, if any.
    pub fn room_at(&self, coord: &Coord) -> Option<RoomId> {
        self.grid
            .cell(coord)
            .filter(|cell| !cell.corridor)
            .and_then(|cell| cell.room)
    }

    pub fn is_corridor(&self, coord: &Coord) -> bool {
        self.grid.cell(coord).is_some_and(|cell| cell.corridor)
    }

    /// Gives an unclaimed playable cell to `room_id`.
    pub fn claim(&mut self, coord: Coord, room_id: RoomId) -> bool {
        if !self.grid.in_play(&coord) {
            return false;
        }

        let color = self.rooms[room_id].floor_color;
        let Some(cell) = self.grid.cell_mut(&coord) else {
            return false;
        };

        if !cell.is_unclaimed() {
            return false;
        }

        cell.room = Some(room_id);
        cell.floor_color = color;
        cell.cost = FLOOR_COST;

        let room = &mut self.rooms[room_id];
        room.cells.push(coord);
        room.include_in_bounds(coord);

        true
    }

    /// Turns an unclaimed cell into corridor grouped under `room_id`.
    /// Cells owned by a room are never overwritten.
    pub fn mark_corridor(&mut self, coord: Coord, room_id: RoomId) -> bool {
        if !self.grid.in_play(&coord) {
            return false;
        }

        let Some(idx) = self.grid.index_of(&coord) else {
            return false;
        };

        let cell = &mut self.grid.cells_mut()[idx];
        if !cell.is_unclaimed() {
            return false;
        }

        cell.corridor = true;
        cell.room = Some(room_id);
        cell.floor_color = CORRIDOR_COLOR;
        cell.cost = FLOOR_COST;

        self.corridors.cells.insert(idx);

        let room = &mut self.rooms[room_id];
        room.cells.push(coord);
        room.include_in_bounds(coord);

        true
    }

    pub fn mark_spine(&mut self, coord: &Coord) {
        if let Some(idx) = self.grid.index_of(coord) {
            if self.corridors.contains(idx) {
                self.corridors.spine.insert(idx);
            }
        }
    }

    /// Reverts room cells to unclaimed. Corridor cells are left alone.
    pub fn release(&mut self, coords: &[Coord]) {
        let mut released = SetUsize::new();
        let mut touched = Vec::new();

        for coord in coords {
            let Some(idx) = self.grid.index_of(coord) else {
                continue;
            };

            let cell = &mut self.grid.cells_mut()[idx];
            if cell.corridor {
                continue;
            }

            if let Some(room_id) = cell.room.take() {
                cell.floor_color = 0;
                cell.cost = IMPASSABLE_COST;
                cell.doors = EdgeSet::EMPTY;

                released.insert(idx);
                touched.push(room_id);
            }
        }

        touched.sort_unstable();
        touched.dedup();

        for room_id in touched {
            let width = self.grid.width();
            let room = &mut self.rooms[room_id];
            room.cells
                .retain(|coord| !released.contains((coord.row * width + coord.col) as usize));
            room.recompute_bounds();
        }
    }

    /// Moves room cells from their current owner to `to`.
    pub fn transfer(&mut self, coords: &[Coord], to: RoomId) {
        let mut moved = SetUsize::new();
        let mut sources = Vec::new();
        let color = self.rooms[to].floor_color;

        for coord in coords {
            let Some(idx) = self.grid.index_of(coord) else {
                continue;
            };

            let cell = &mut self.grid.cells_mut()[idx];
            match cell.room {
                Some(from) if from != to && !cell.corridor => {
                    cell.room = Some(to);
                    cell.floor_color = color;

                    moved.insert(idx);
                    sources.push(from);
                    self.rooms[to].cells.push(*coord);
                }
                _ => {}
            }
        }

        sources.sort_unstable();
        sources.dedup();

        let width = self.grid.width();
        for room_id in sources {
            let room = &mut self.rooms[room_id];
            room.cells
                .retain(|coord| !moved.contains((coord.row * width + coord.col) as usize));
            room.recompute_bounds();
        }

        self.rooms[to].recompute_bounds();
    }

    /// Whether `coord` could join `owner` without coming closer than the
    /// moat to another room or to a corridor. Distances are Chebyshev.
    pub fn has_clearance(&self, coord: &Coord, owner: Option<RoomId>) -> bool {
        if !self.grid.in_play(coord) {
            return false;
        }

        let room_gap = self.config.room_gap();
        let corridor_gap = self.config.corridor_gap();

        self.grid
            .window(coord, room_gap.max(corridor_gap))
            .all(|cell| {
                let distance = cell.coord.chebyshev(coord);
                if cell.corridor {
                    return distance > corridor_gap;
                }

                match cell.room {
                    Some(room_id) if Some(room_id) != owner => distance > room_gap,
                    _ => true,
                }
            })
    }

    pub fn near_corridor(&self, coord: &Coord) -> bool {
        let corridor_gap = self.config.corridor_gap();

        self.grid
            .window(coord, corridor_gap)
            .any(|cell| cell.corridor)
    }

    /// Re-derives corridor rooms as the connected components of corridor
    /// cells. The first component keeps the id of the room it started in.
    pub fn regroup_corridors(&mut self) {
        let corridor_rooms = self
            .rooms
            .iter()
            .filter(|room| room.corridor)
            .map(|room| room.id)
            .collect::<Vec<_>>();

        let mut reusable = corridor_rooms.into_iter();
        for room_id in reusable.clone() {
            self.rooms[room_id].cells.clear();
            self.rooms[room_id].bounds = None;
        }

        let mut visited = SetUsize::new();
        let mut components = 0;

        for start in self.corridors.sorted_cells() {
            if visited.contains(start) {
                continue;
            }

            let room_id = match reusable.next() {
                Some(room_id) => room_id,
                None => self.add_room(true),
            };
            components += 1;

            let mut queue = vec![start];
            visited.insert(start);

            while let Some(idx) = queue.pop() {
                let coord = self.grid.coord_of(idx);
                self.grid.cells_mut()[idx].room = Some(room_id);

                let room = &mut self.rooms[room_id];
                room.cells.push(coord);
                room.include_in_bounds(coord);

                for (_, neighbour) in coord.neighbours() {
                    if let Some(n_idx) = self.grid.index_of(&neighbour) {
                        if self.corridors.contains(n_idx) && visited.insert(n_idx) {
                            queue.push(n_idx);
                        }
                    }
                }
            }
        }

        debug!("Corridors form {} connected group/s", components);
    }

    /// Recomputes every cached bounding box.
    pub fn reconcile(&mut self) {
        for room in self.rooms.iter_mut() {
            room.recompute_bounds();
        }
    }

    /// Puts walls on every claimed cell edge that faces rock, the map edge
    /// or a different owner. Corridor to corridor edges stay open. Door bits
    /// are kept.
    pub fn rebuild_walls(&mut self) {
        let width = self.grid.width();
        let height = self.grid.height();

        let owners = self
            .grid
            .iter()
            .map(|cell| (cell.corridor, cell.room))
            .collect::<Vec<_>>();

        let owner_at = |coord: Coord| -> Option<(bool, Option<RoomId>)> {
            if coord.col < width && coord.row < height {
                Some(owners[(coord.row * width + coord.col) as usize])
            } else {
                None
            }
        };

        for cell in self.grid.iter_mut() {
            let (coord, corridor, room) = (cell.coord, cell.corridor, cell.room);

            if !corridor && room.is_none() {
                cell.walls = EdgeSet::EMPTY;
                cell.doors = EdgeSet::EMPTY;
                cell.cost = IMPASSABLE_COST;
                continue;
            }

            cell.cost = FLOOR_COST;
            cell.walls = DIRECTIONS
                .iter()
                .copied()
                .filter(|&direction| {
                    match coord.step(direction).and_then(owner_at) {
                        None => true,
                        Some((false, None)) => true,
                        Some((n_corridor, n_room)) => {
                            !(corridor && n_corridor) && n_room != room
                        }
                    }
                })
                .collect();
        }
    }

    /// Warns about every room that lost track of its cells.
    #[cfg(debug_assertions)]
    pub fn log_consistency(&self, stage: impl std::fmt::Display) {
        let issues = crate::diagnostics::check_consistency(&self.grid, &self.rooms);
        for issue in issues.iter() {
            tracing::warn!("After {}: {}", stage, issue);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn context(width: u32, height: u32, moat: u32) -> GenContext {
        let mut config = GeneratorConfig::default().with_size(width, height).with_seed(7);
        config.moat = moat;
        config.border = 0;
        GenContext::new(&config).unwrap()
    }

    #[test]
    fn test_claim_and_release_keep_room_in_sync() {
        let mut ctx = context(8, 8, 1);
        let room = ctx.add_room(false);

        assert!(ctx.claim(Coord::new(2, 2), room));
        assert!(ctx.claim(Coord::new(3, 2), room));
        assert!(!ctx.claim(Coord::new(3, 2), room));

        ctx.release(&[Coord::new(2, 2)]);

        assert_eq!(ctx.rooms[room].cells(), &[Coord::new(3, 2)]);
        assert_eq!(ctx.rooms[room].bounds(), Some(crate::types::Rect::new(3, 2, 1, 1)));
        assert!(ctx.is_unclaimed(&Coord::new(2, 2)));
    }

    #[test]
    fn test_clearance_honours_moat() {
        let mut ctx = context(10, 10, 1);
        let corridor = ctx.add_room(true);
        let room = ctx.add_room(false);

        ctx.mark_corridor(Coord::new(5, 5), corridor);
        ctx.claim(Coord::new(1, 1), room);

        assert!(!ctx.has_clearance(&Coord::new(6, 6), None));
        assert!(ctx.has_clearance(&Coord::new(7, 5), None));
        assert!(!ctx.has_clearance(&Coord::new(2, 2), None));
        assert!(ctx.has_clearance(&Coord::new(2, 2), Some(room)));
        assert!(ctx.near_corridor(&Coord::new(4, 4)));
    }

    #[test]
    fn test_regroup_splits_disconnected_corridors() {
        let mut ctx = context(10, 10, 1);
        let corridor = ctx.add_room(true);

        for col in 0..3 {
            ctx.mark_corridor(Coord::new(col, 1), corridor);
            ctx.mark_corridor(Coord::new(col + 5, 8), corridor);
        }

        ctx.regroup_corridors();

        let groups = ctx.rooms.iter().filter(|room| room.is_corridor()).collect::<Vec<_>>();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|room| room.area() == 3));
    }

    #[test]
    fn test_walls_separate_owners() {
        let mut ctx = context(6, 6, 0);
        let corridor = ctx.add_room(true);
        let room = ctx.add_room(false);

        ctx.mark_corridor(Coord::new(1, 1), corridor);
        ctx.mark_corridor(Coord::new(2, 1), corridor);
        ctx.claim(Coord::new(3, 1), room);

        ctx.rebuild_walls();

        let corridor_cell = ctx.grid.cell(&Coord::new(2, 1)).unwrap();
        assert!(!corridor_cell.walls().contains(crate::types::Direction::West));
        assert!(corridor_cell.walls().contains(crate::types::Direction::East));
        assert!(corridor_cell.walls().contains(crate::types::Direction::North));

        let rock = ctx.grid.cell(&Coord::new(4, 4)).unwrap();
        assert!(rock.walls().is_empty());
        assert_eq!(rock.cost(), IMPASSABLE_COST);
    }
}
