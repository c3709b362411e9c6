use crate::constants::DIRECTIONS;

use std::fmt::{Display, Formatter};

use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2::new(0.0, 0.0);

    pub const fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    pub fn manhattan(&self, other: &Vector2) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn rounded(&self) -> Coord {
        Coord::new(self.x.round().max(0.0) as u32, self.y.round().max(0.0) as u32)
    }
}

impl Display for Vector2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A position on the grid. Also the index a [Room] uses to refer to the
/// cells it owns; the [crate::Grid] is the only owner of cell storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Coord {
    pub col: u32,
    pub row: u32,
}

impl Coord {
    pub const fn new(col: u32, row: u32) -> Self {
        Coord { col, row }
    }

    // Manhattan distance
    pub fn distance(&self, other: &Coord) -> u32 {
        self.col.abs_diff(other.col) + self.row.abs_diff(other.row)
    }

    pub fn chebyshev(&self, other: &Coord) -> u32 {
        self.col.abs_diff(other.col).max(self.row.abs_diff(other.row))
    }

    /// Moves one cell towards `direction`. Returns `None` when the move
    /// would leave the positive quadrant.
    pub fn step(&self, direction: Direction) -> Option<Coord> {
        self.step_by(direction, 1)
    }

    pub fn step_by(&self, direction: Direction, distance: u32) -> Option<Coord> {
        match direction {
            Direction::North => self.row.checked_sub(distance).map(|row| Coord::new(self.col, row)),
            Direction::South => self.row.checked_add(distance).map(|row| Coord::new(self.col, row)),
            Direction::East => self.col.checked_add(distance).map(|col| Coord::new(col, self.row)),
            Direction::West => self.col.checked_sub(distance).map(|col| Coord::new(col, self.row)),
        }
    }

    pub fn neighbours(&self) -> impl Iterator<Item = (Direction, Coord)> + '_ {
        DIRECTIONS
            .iter()
            .filter_map(move |&direction| self.step(direction).map(|coord| (direction, coord)))
    }

    /// Returns the direction to take from `self` to reach `other` when both
    /// cells share an edge.
    pub fn direction_to(&self, other: &Coord) -> Option<Direction> {
        DIRECTIONS
            .iter()
            .copied()
            .find(|&direction| self.step(direction).as_ref() == Some(other))
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub fn is_horizontal(&self) -> bool {
        match self {
            Direction::North | Direction::South => false,
            Direction::East | Direction::West => true,
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    pub fn perpendicular(&self) -> [Direction; 2] {
        if self.is_horizontal() {
            [Direction::North, Direction::South]
        } else {
            [Direction::East, Direction::West]
        }
    }

    const fn bit(&self) -> u8 {
        match self {
            Direction::North => 0b0001,
            Direction::South => 0b0010,
            Direction::East => 0b0100,
            Direction::West => 0b1000,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::North => write!(f, "north"),
            Direction::South => write!(f, "south"),
            Direction::East => write!(f, "east"),
            Direction::West => write!(f, "west"),
        }
    }
}

/// Bit-set over the four cardinal edges of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct EdgeSet(u8);

impl EdgeSet {
    pub const EMPTY: EdgeSet = EdgeSet(0);

    pub fn contains(&self, direction: Direction) -> bool {
        self.0 & direction.bit() != 0
    }

    pub fn insert(&mut self, direction: Direction) {
        self.0 |= direction.bit();
    }

    pub fn remove(&mut self, direction: Direction) {
        self.0 &= !direction.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Direction> + '_ {
        DIRECTIONS.iter().copied().filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Direction> for EdgeSet {
    fn from_iter<T: IntoIterator<Item = Direction>>(iter: T) -> Self {
        let mut set = EdgeSet::EMPTY;
        for direction in iter {
            set.insert(direction);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SplitAxis {
    // Cuts across rows, producing an upper and a lower part
    Horizontal,
    // Cuts across columns, producing a left and a right part
    Vertical,
}

/// Axis aligned rectangle, inclusive of its origin, `width` columns wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rect {
    pub origin: Coord,
    pub width: u32,
    pub height: u32,
}

impl Display for Rect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({},{}):[{}x{}]",
            self.origin.col, self.origin.row, self.width, self.height
        )
    }
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect {
            origin: Coord { col: x, row: y },
            width,
            height,
        }
    }

    pub fn around(coord: Coord) -> Self {
        Rect {
            origin: coord,
            width: 1,
            height: 1,
        }
    }

    /// Smallest rectangle holding every coordinate, `None` when empty.
    pub fn enclosing<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Option<Rect> {
        let mut coords = coords.into_iter();
        let first = coords.next()?;

        let (mut min_col, mut min_row, mut max_col, mut max_row) =
            (first.col, first.row, first.col, first.row);

        for coord in coords {
            min_col = min_col.min(coord.col);
            min_row = min_row.min(coord.row);
            max_col = max_col.max(coord.col);
            max_row = max_row.max(coord.row);
        }

        Some(Rect::new(
            min_col,
            min_row,
            max_col - min_col + 1,
            max_row - min_row + 1,
        ))
    }

    pub fn max_col(&self) -> u32 {
        self.origin.col + self.width - 1
    }

    pub fn max_row(&self) -> u32 {
        self.origin.row + self.height - 1
    }

    pub fn contains(&self, coord: &Coord) -> bool {
        (self.origin.col..=self.max_col()).contains(&coord.col)
            && (self.origin.row..=self.max_row()).contains(&coord.row)
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        let long = self.width.max(self.height) as f32;
        let short = self.width.min(self.height).max(1) as f32;
        long / short
    }

    /// Length of the side facing `direction`.
    pub fn side_length(&self, direction: Direction) -> u32 {
        if direction.is_horizontal() {
            self.height
        } else {
            self.width
        }
    }

    /// The one cell thick strip just outside the side facing `direction`.
    pub fn strip(&self, direction: Direction) -> Option<Rect> {
        match direction {
            Direction::North => self
                .origin
                .row
                .checked_sub(1)
                .map(|row| Rect::new(self.origin.col, row, self.width, 1)),
            Direction::South => Some(Rect::new(self.origin.col, self.max_row() + 1, self.width, 1)),
            Direction::West => self
                .origin
                .col
                .checked_sub(1)
                .map(|col| Rect::new(col, self.origin.row, 1, self.height)),
            Direction::East => Some(Rect::new(self.max_col() + 1, self.origin.row, 1, self.height)),
        }
    }

    pub fn expanded(&self, direction: Direction) -> Option<Rect> {
        self.strip(direction).map(|strip| match direction {
            Direction::North => Rect::new(self.origin.col, strip.origin.row, self.width, self.height + 1),
            Direction::West => Rect::new(strip.origin.col, self.origin.row, self.width + 1, self.height),
            Direction::South => Rect::new(self.origin.col, self.origin.row, self.width, self.height + 1),
            Direction::East => Rect::new(self.origin.col, self.origin.row, self.width + 1, self.height),
        })
    }

    pub(crate) fn try_split_at(self, axis: SplitAxis, at: u32) -> Result<(Rect, Rect)> {
        match axis {
            SplitAxis::Horizontal => {
                if self.height < 2 || at >= self.height || at == 0 {
                    return Err(anyhow::anyhow!("Invalid split {}-{}", self.height, at));
                }

                let up = Rect {
                    origin: self.origin,
                    width: self.width,
                    height: at,
                };

                let down = Rect {
                    origin: Coord {
                        col: self.origin.col,
                        row: self.origin.row + at,
                    },
                    width: self.width,
                    height: self.height - at,
                };

                Ok((up, down))
            }
            SplitAxis::Vertical => {
                if self.width < 2 || at >= self.width || at == 0 {
                    return Err(anyhow::anyhow!("Invalid split {}-{}", self.width, at));
                }

                let left = Rect {
                    origin: self.origin,
                    width: at,
                    height: self.height,
                };

                let right = Rect {
                    origin: Coord {
                        col: self.origin.col + at,
                        row: self.origin.row,
                    },
                    width: self.width - at,
                    height: self.height,
                };

                Ok((left, right))
            }
        }
    }

    pub fn get_cells(&self) -> Vec<Coord> {
        let mut cells = Vec::with_capacity(self.area() as usize);

        for row in self.origin.row..(self.origin.row + self.height) {
            for col in self.origin.col..(self.origin.col + self.width) {
                cells.push(Coord { col, row });
            }
        }

        cells
    }
}

pub type RoomId = usize;

/// A connected region of cells. Its id is its index in the room list and
/// never changes once the room has been added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub(crate) id: RoomId,
    pub(crate) cells: Vec<Coord>,
    pub(crate) bounds: Option<Rect>,
    pub(crate) floor_color: u32,
    pub(crate) corridor: bool,
}

impl Room {
    pub(crate) fn new(id: RoomId, floor_color: u32, corridor: bool) -> Self {
        Room {
            id,
            cells: Vec::new(),
            bounds: None,
            floor_color,
            corridor,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn cells(&self) -> &[Coord] {
        &self.cells
    }

    /// Cached bounding box; tight after every stage boundary.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    pub fn floor_color(&self) -> u32 {
        self.floor_color
    }

    pub fn is_corridor(&self) -> bool {
        self.corridor
    }

    pub fn area(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub(crate) fn recompute_bounds(&mut self) {
        self.bounds = Rect::enclosing(self.cells.iter());
    }

    pub(crate) fn include_in_bounds(&mut self, coord: Coord) {
        self.bounds = Some(match self.bounds {
            Some(bounds) => {
                let min_col = bounds.origin.col.min(coord.col);
                let min_row = bounds.origin.row.min(coord.row);
                let max_col = bounds.max_col().max(coord.col);
                let max_row = bounds.max_row().max(coord.row);

                Rect::new(min_col, min_row, max_col - min_col + 1, max_row - min_row + 1)
            }
            None => Rect::around(coord),
        });
    }

    pub fn get_center(&self) -> Vector2 {
        if self.cells.is_empty() {
            return Vector2::ZERO;
        }

        let mut center = Vector2::ZERO;

        let cell_count = self.cells.len() as f32;

        for cell in self.cells.iter() {
            center.x += cell.col as f32;
            center.y += cell.row as f32;
        }

        center.x /= cell_count;
        center.y /= cell_count;

        center
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_try_split_horizontal() {
        let rect1 = Rect {
            origin: Coord { col: 0, row: 3 },
            width: 4,
            height: 5,
        };

        let split_result = rect1.try_split_at(SplitAxis::Horizontal, 3);
        assert!(split_result.is_ok());

        let (up, down) = split_result.unwrap();

        assert_eq!(up.origin, Coord { col: 0, row: 3 });
        assert_eq!(up.width, 4);
        assert_eq!(up.height, 3);

        assert_eq!(down.origin, Coord { col: 0, row: 6 });
        assert_eq!(down.width, 4);
        assert_eq!(down.height, 2);
    }

    #[test]
    fn test_try_split_fails_with_invalid_index() {
        let rect1 = Rect::new(1, 3, 5, 5);

        assert!(rect1.try_split_at(SplitAxis::Horizontal, 6).is_err());
        assert!(rect1.try_split_at(SplitAxis::Vertical, 6).is_err());
        assert!(rect1.try_split_at(SplitAxis::Horizontal, 0).is_err());
        assert!(rect1.try_split_at(SplitAxis::Vertical, 0).is_err());
    }

    #[test]
    fn test_strip_and_expand() {
        let rect = Rect::new(2, 2, 3, 2);

        assert_eq!(rect.strip(Direction::North), Some(Rect::new(2, 1, 3, 1)));
        assert_eq!(rect.strip(Direction::East), Some(Rect::new(5, 2, 1, 2)));
        assert_eq!(rect.expanded(Direction::West), Some(Rect::new(1, 2, 4, 2)));
        assert_eq!(rect.expanded(Direction::South), Some(Rect::new(2, 2, 3, 3)));

        let corner = Rect::new(0, 0, 2, 2);
        assert_eq!(corner.strip(Direction::North), None);
        assert_eq!(corner.strip(Direction::West), None);
    }

    #[test]
    fn test_enclosing_is_tight() {
        let coords = [Coord::new(4, 7), Coord::new(2, 9), Coord::new(6, 8)];

        let rect = Rect::enclosing(coords.iter()).unwrap();

        assert_eq!(rect, Rect::new(2, 7, 5, 3));
        assert!(coords.iter().all(|coord| rect.contains(coord)));
        assert_eq!(Rect::enclosing(std::iter::empty::<&Coord>()), None);
    }

    #[test]
    fn test_coord_steps() {
        let origin = Coord::new(0, 0);

        assert_eq!(origin.step(Direction::North), None);
        assert_eq!(origin.step(Direction::East), Some(Coord::new(1, 0)));
        assert_eq!(origin.neighbours().count(), 2);
        assert_eq!(
            Coord::new(3, 3).direction_to(&Coord::new(3, 2)),
            Some(Direction::North)
        );
        assert_eq!(Coord::new(3, 3).direction_to(&Coord::new(4, 4)), None);
        assert_eq!(Coord::new(1, 1).chebyshev(&Coord::new(4, 3)), 3);
        assert_eq!(Coord::new(1, 1).distance(&Coord::new(4, 3)), 5);
    }

    #[test]
    fn test_edge_set() {
        let mut edges = EdgeSet::EMPTY;
        edges.insert(Direction::West);
        edges.insert(Direction::North);

        assert!(edges.contains(Direction::West));
        assert!(!edges.contains(Direction::East));
        assert_eq!(edges.len(), 2);

        edges.remove(Direction::West);
        assert_eq!(edges.iter().collect::<Vec<_>>(), vec![Direction::North]);
    }

    #[test]
    fn test_room_bounds_follow_cells() {
        let mut room = Room::new(0, 0, false);
        room.cells.push(Coord::new(3, 3));
        room.include_in_bounds(Coord::new(3, 3));
        room.cells.push(Coord::new(5, 4));
        room.include_in_bounds(Coord::new(5, 4));

        assert_eq!(room.bounds(), Some(Rect::new(3, 3, 3, 2)));

        room.cells.retain(|coord| coord.col < 5);
        room.recompute_bounds();
        assert_eq!(room.bounds(), Some(Rect::new(3, 3, 1, 1)));
    }
}
