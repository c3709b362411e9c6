use crate::{
    algos::DoorReport,
    grid::{Cell, Grid},
    types::{Coord, Direction, Room, RoomId},
};

use serde::Serialize;

/// A finished layout. Read only: renderers and path finders look at it, they
/// never change wall, door or ownership data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dungeon {
    grid: Grid,
    rooms: Vec<Room>,
    seed: u64,
    door_report: DoorReport,
}

impl Dungeon {
    pub(crate) fn new(grid: Grid, rooms: Vec<Room>, seed: u64, door_report: DoorReport) -> Self {
        Dungeon {
            grid,
            rooms,
            seed,
            door_report,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// The seed that reproduces this layout.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn door_report(&self) -> &DoorReport {
        &self.door_report
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    pub fn cell(&self, coord: &Coord) -> Option<&Cell> {
        self.grid.cell(coord)
    }

    pub fn is_edge_open(&self, coord: &Coord, direction: Direction) -> bool {
        self.grid.is_edge_open(coord, direction)
    }

    /// Rooms that are not corridor space.
    pub fn chambers(&self) -> impl Iterator<Item = &Room> {
        self.rooms
            .iter()
            .filter(|room| !room.is_corridor() && !room.is_empty())
    }

    pub fn corridor_cells(&self) -> impl Iterator<Item = &Cell> {
        self.grid.iter().filter(|cell| cell.is_corridor())
    }

    pub fn door_count(&self) -> usize {
        // Each door is recorded on both of its cells
        self.grid
            .iter()
            .map(|cell| cell.doors().len())
            .sum::<usize>()
            / 2
    }
}
