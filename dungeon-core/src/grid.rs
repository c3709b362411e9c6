use crate::{
    constants::{IMPASSABLE_COST, MAX_MAP_SIDE, MIN_MAP_SIDE},
    error::DungeonError,
    types::{Coord, Direction, EdgeSet, Rect, RoomId},
};

use serde::Serialize;

/// One grid unit. A cell is either corridor, owned by a room, or unclaimed.
/// Corridor cells may still point at the corridor room that groups them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub(crate) coord: Coord,
    pub(crate) height_step: i32,
    pub(crate) room: Option<RoomId>,
    pub(crate) corridor: bool,
    pub(crate) walls: EdgeSet,
    pub(crate) doors: EdgeSet,
    pub(crate) floor_color: u32,
    pub(crate) cost: u32,
}

impl Cell {
    fn new(coord: Coord) -> Self {
        Cell {
            coord,
            height_step: 0,
            room: None,
            corridor: false,
            walls: EdgeSet::EMPTY,
            doors: EdgeSet::EMPTY,
            floor_color: 0,
            cost: IMPASSABLE_COST,
        }
    }

    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn height_step(&self) -> i32 {
        self.height_step
    }

    pub fn room(&self) -> Option<RoomId> {
        self.room
    }

    pub fn is_corridor(&self) -> bool {
        self.corridor
    }

    pub fn is_unclaimed(&self) -> bool {
        self.room.is_none() && !self.corridor
    }

    pub fn walls(&self) -> EdgeSet {
        self.walls
    }

    pub fn doors(&self) -> EdgeSet {
        self.doors
    }

    pub fn floor_color(&self) -> u32 {
        self.floor_color
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

/// Fixed size arena of cells, indexed by coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grid {
    width: u32,
    height: u32,
    border: u32,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: u32, height: u32, border: u32) -> Result<Self, DungeonError> {
        let side_range = MIN_MAP_SIDE..=MAX_MAP_SIDE;
        if !side_range.contains(&width) || !side_range.contains(&height) {
            return Err(DungeonError::InvalidDimensions {
                width,
                height,
                min: MIN_MAP_SIDE,
                max: MAX_MAP_SIDE,
            });
        }

        if border.saturating_mul(2) >= width || border.saturating_mul(2) >= height {
            return Err(DungeonError::BorderTooLarge {
                border,
                width,
                height,
            });
        }

        let cells = (0..height)
            .flat_map(|row| (0..width).map(move |col| Cell::new(Coord::new(col, row))))
            .collect();

        Ok(Grid {
            width,
            height,
            border,
            cells,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn border(&self) -> u32 {
        self.border
    }

    pub fn in_grid(&self, coord: &Coord) -> bool {
        coord.col < self.width && coord.row < self.height
    }

    /// Whether the cell lies inside the border keep-out.
    pub fn in_play(&self, coord: &Coord) -> bool {
        (self.border..self.width - self.border).contains(&coord.col)
            && (self.border..self.height - self.border).contains(&coord.row)
    }

    pub fn play_area(&self) -> Rect {
        Rect::new(
            self.border,
            self.border,
            self.width - self.border * 2,
            self.height - self.border * 2,
        )
    }

    pub(crate) fn index_of(&self, coord: &Coord) -> Option<usize> {
        if self.in_grid(coord) {
            Some((coord.row * self.width + coord.col) as usize)
        } else {
            None
        }
    }

    pub(crate) fn coord_of(&self, index: usize) -> Coord {
        Coord::new(index as u32 % self.width, index as u32 / self.width)
    }

    pub fn cell(&self, coord: &Coord) -> Option<&Cell> {
        self.index_of(coord).map(|idx| &self.cells[idx])
    }

    pub(crate) fn cell_mut(&mut self, coord: &Coord) -> Option<&mut Cell> {
        self.index_of(coord).map(|idx| &mut self.cells[idx])
    }

    /// The neighbour of `coord` towards `direction`, if it is on the grid.
    pub fn neighbour(&self, coord: &Coord, direction: Direction) -> Option<Coord> {
        coord
            .step(direction)
            .filter(|neighbour| self.in_grid(neighbour))
    }

    /// An edge is open unless it carries a wall without a matching door.
    pub fn is_edge_open(&self, coord: &Coord, direction: Direction) -> bool {
        match self.cell(coord) {
            Some(cell) => !cell.walls.contains(direction) || cell.doors.contains(direction),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut()
    }

    pub(crate) fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Cells within `radius` of `center` by the Chebyshev metric, clipped to
    /// the grid.
    pub(crate) fn window(&self, center: &Coord, radius: u32) -> impl Iterator<Item = &Cell> {
        let min_col = center.col.saturating_sub(radius);
        let max_col = center.col.saturating_add(radius).min(self.width - 1);
        let min_row = center.row.saturating_sub(radius);
        let max_row = center.row.saturating_add(radius).min(self.height - 1);

        (min_row..=max_row).flat_map(move |row| {
            (min_col..=max_col).map(move |col| &self.cells[(row * self.width + col) as usize])
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_grid_rejects_bad_dimensions() {
        assert!(matches!(
            Grid::new(2, 40, 0),
            Err(DungeonError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            Grid::new(8, 8, 4),
            Err(DungeonError::BorderTooLarge { .. })
        ));
        assert!(Grid::new(8, 8, 3).is_ok());
    }

    #[test]
    fn test_huge_border_is_rejected_not_wrapped() {
        assert!(matches!(
            Grid::new(8, 8, u32::MAX),
            Err(DungeonError::BorderTooLarge { .. })
        ));
        assert!(matches!(
            Grid::new(64, 64, u32::MAX / 2 + 1),
            Err(DungeonError::BorderTooLarge { .. })
        ));
    }

    #[test]
    fn test_new_grid_is_unclaimed() {
        let grid = Grid::new(10, 6, 1).unwrap();

        assert_eq!(grid.iter().count(), 60);
        assert!(grid.iter().all(|cell| cell.is_unclaimed()));
        assert_eq!(grid.cell(&Coord::new(9, 5)).unwrap().coord(), Coord::new(9, 5));
        assert!(grid.cell(&Coord::new(10, 5)).is_none());
    }

    #[test]
    fn test_play_area_respects_border() {
        let grid = Grid::new(8, 8, 2).unwrap();

        assert!(!grid.in_play(&Coord::new(1, 4)));
        assert!(grid.in_play(&Coord::new(2, 2)));
        assert!(grid.in_play(&Coord::new(5, 5)));
        assert!(!grid.in_play(&Coord::new(6, 5)));
        assert_eq!(grid.play_area(), Rect::new(2, 2, 4, 4));
    }

    #[test]
    fn test_window_is_clipped() {
        let grid = Grid::new(6, 6, 0).unwrap();

        assert_eq!(grid.window(&Coord::new(0, 0), 1).count(), 4);
        assert_eq!(grid.window(&Coord::new(3, 3), 1).count(), 9);
        assert_eq!(grid.window(&Coord::new(5, 2), 2).count(), 15);
    }

    #[test]
    fn test_edge_open_needs_door_through_wall() {
        let mut grid = Grid::new(5, 5, 0).unwrap();
        let coord = Coord::new(2, 2);

        assert!(grid.is_edge_open(&coord, Direction::East));

        grid.cell_mut(&coord).unwrap().walls.insert(Direction::East);
        assert!(!grid.is_edge_open(&coord, Direction::East));

        grid.cell_mut(&coord).unwrap().doors.insert(Direction::East);
        assert!(grid.is_edge_open(&coord, Direction::East));
    }
}
