//! Cross checks between the grid and the room list. Meant for tests and
//! debug builds, generation never depends on them.

use crate::{
    constants::DIRECTIONS,
    grid::Grid,
    types::{Coord, Direction, Room, RoomId},
};

use std::collections::VecDeque;

use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyIssue {
    #[error("room at index {index} reports id {id}")]
    IndexMismatch { index: usize, id: RoomId },
    #[error("room {room} lists {coord}, which is off the grid")]
    OffGrid { room: RoomId, coord: Coord },
    #[error("room {room} lists {coord}, but the grid gives that cell to {found:?}")]
    OwnerMismatch {
        room: RoomId,
        coord: Coord,
        found: Option<RoomId>,
    },
    #[error("room {room} lists {coord} as corridor={listed}, the grid says corridor={found}")]
    CorridorMismatch {
        room: RoomId,
        coord: Coord,
        listed: bool,
        found: bool,
    },
    #[error("cell {coord} points at room {room}, which does not list it")]
    Unlisted { coord: Coord, room: RoomId },
    #[error("room {room} has a stale bounding box")]
    StaleBounds { room: RoomId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("cell {coord} and its owner {room} disagree on being corridor")]
    DoubleOwnership { coord: Coord, room: RoomId },
    #[error("door on {coord} towards {direction} has no matching door")]
    OneSidedDoor { coord: Coord, direction: Direction },
    #[error("cells {a} and {b} break the moat")]
    MoatBreach { a: Coord, b: Coord },
}

/// Every room index mismatch, and every cell where the room list and the
/// grid disagree.
pub fn check_consistency(grid: &Grid, rooms: &[Room]) -> Vec<ConsistencyIssue> {
    let mut issues = rooms
        .par_iter()
        .enumerate()
        .flat_map_iter(|(index, room)| {
            let mut issues = Vec::new();

            if room.id() != index {
                issues.push(ConsistencyIssue::IndexMismatch { index, id: room.id() });
            }

            for coord in room.cells() {
                let Some(cell) = grid.cell(coord) else {
                    issues.push(ConsistencyIssue::OffGrid { room: index, coord: *coord });
                    continue;
                };

                if cell.room() != Some(index) {
                    issues.push(ConsistencyIssue::OwnerMismatch {
                        room: index,
                        coord: *coord,
                        found: cell.room(),
                    });
                }

                if cell.is_corridor() != room.is_corridor() {
                    issues.push(ConsistencyIssue::CorridorMismatch {
                        room: index,
                        coord: *coord,
                        listed: room.is_corridor(),
                        found: cell.is_corridor(),
                    });
                }
            }

            if room.bounds() != crate::types::Rect::enclosing(room.cells().iter()) {
                issues.push(ConsistencyIssue::StaleBounds { room: index });
            }

            issues
        })
        .collect::<Vec<_>>();

    let mut listed = vec![None; grid.iter().count()];
    for (index, room) in rooms.iter().enumerate() {
        for coord in room.cells() {
            if let Some(idx) = grid.index_of(coord) {
                listed[idx] = Some(index);
            }
        }
    }

    for (idx, cell) in grid.iter().enumerate() {
        if let Some(room) = cell.room() {
            if listed[idx] != Some(room) {
                issues.push(ConsistencyIssue::Unlisted {
                    coord: cell.coord(),
                    room,
                });
            }
        }
    }

    issues
}

/// Ownership and door checks that must hold at any stage boundary.
pub fn check_invariants(grid: &Grid, rooms: &[Room]) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for cell in grid.iter() {
        if let Some(room) = cell.room() {
            let room_is_corridor = rooms.get(room).is_some_and(|room| room.is_corridor());
            if cell.is_corridor() != room_is_corridor {
                violations.push(InvariantViolation::DoubleOwnership {
                    coord: cell.coord(),
                    room,
                });
            }
        }

        for direction in cell.doors().iter() {
            let matched = grid
                .neighbour(&cell.coord(), direction)
                .and_then(|neighbour| grid.cell(&neighbour))
                .is_some_and(|neighbour| neighbour.doors().contains(direction.reverse()));

            if !matched {
                violations.push(InvariantViolation::OneSidedDoor {
                    coord: cell.coord(),
                    direction,
                });
            }
        }
    }

    violations
}

/// Pairs of cells of different rooms closer than `room_gap`, or room cells
/// closer than `corridor_gap` to a corridor. Distances are Chebyshev.
pub fn check_moat(grid: &Grid, room_gap: u32, corridor_gap: u32) -> Vec<InvariantViolation> {
    // Indexed, so breaches come back in row major order
    grid.cells()
        .par_iter()
        .filter(|cell| !cell.is_corridor() && cell.room().is_some())
        .flat_map_iter(|cell| {
            let coord = cell.coord();
            grid.window(&coord, room_gap.max(corridor_gap))
                .filter(|other| {
                    let distance = other.coord().chebyshev(&coord);
                    if other.is_corridor() {
                        distance <= corridor_gap
                    } else {
                        other.room().is_some_and(|room| Some(room) != cell.room())
                            && distance <= room_gap
                    }
                })
                .map(|other| InvariantViolation::MoatBreach {
                    a: coord,
                    b: other.coord(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Number of connected groups the non empty rooms fall into, moving only
/// through open edges between claimed cells.
pub fn count_components(grid: &Grid, rooms: &[Room]) -> usize {
    let mut labels: Vec<Option<usize>> = vec![None; grid.iter().count()];
    let mut next_label = 0;

    for room in rooms.iter() {
        let Some(start) = room.cells().first() else {
            continue;
        };
        let Some(start_idx) = grid.index_of(start) else {
            continue;
        };
        if labels[start_idx].is_some() {
            continue;
        }

        labels[start_idx] = Some(next_label);
        let mut queue = VecDeque::from([*start]);

        while let Some(coord) = queue.pop_front() {
            for direction in DIRECTIONS {
                if !grid.is_edge_open(&coord, direction) {
                    continue;
                }

                let Some(neighbour) = grid.neighbour(&coord, direction) else {
                    continue;
                };
                let Some(cell) = grid.cell(&neighbour) else {
                    continue;
                };

                if cell.is_unclaimed() || !grid.is_edge_open(&neighbour, direction.reverse()) {
                    continue;
                }

                if let Some(idx) = grid.index_of(&neighbour) {
                    if labels[idx].is_none() {
                        labels[idx] = Some(next_label);
                        queue.push_back(neighbour);
                    }
                }
            }
        }

        next_label += 1;
    }

    next_label
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::types::EdgeSet;

    fn grid_with_rooms() -> (Grid, Vec<Room>) {
        let mut grid = Grid::new(8, 6, 0).unwrap();
        let mut rooms = vec![Room::new(0, 0, false), Room::new(1, 0, false)];

        for (room, coords) in [(0, [Coord::new(1, 1), Coord::new(2, 1)]), (1, [Coord::new(4, 1), Coord::new(5, 1)])] {
            for coord in coords {
                grid.cell_mut(&coord).unwrap().room = Some(room);
                rooms[room].cells.push(coord);
            }
            rooms[room].recompute_bounds();
        }

        (grid, rooms)
    }

    #[test]
    fn test_consistent_layout_has_no_issues() {
        let (grid, rooms) = grid_with_rooms();

        assert!(check_consistency(&grid, &rooms).is_empty());
        assert!(check_invariants(&grid, &rooms).is_empty());
        assert!(check_moat(&grid, 1, 1).is_empty());
    }

    #[test]
    fn test_reports_divergent_cells() {
        let (mut grid, mut rooms) = grid_with_rooms();
        grid.cell_mut(&Coord::new(2, 1)).unwrap().room = Some(1);
        rooms[1].id = 7;

        let issues = check_consistency(&grid, &rooms);

        assert!(issues.contains(&ConsistencyIssue::IndexMismatch { index: 1, id: 7 }));
        assert!(issues.contains(&ConsistencyIssue::OwnerMismatch {
            room: 0,
            coord: Coord::new(2, 1),
            found: Some(1),
        }));
        assert!(issues.contains(&ConsistencyIssue::Unlisted {
            coord: Coord::new(2, 1),
            room: 1,
        }));
    }

    #[test]
    fn test_moat_breach_is_found() {
        let (grid, _) = grid_with_rooms();

        assert!(check_moat(&grid, 1, 1).is_empty());
        assert!(!check_moat(&grid, 2, 1).is_empty());
    }

    #[test]
    fn test_moat_breaches_come_in_grid_order() {
        let (grid, _) = grid_with_rooms();

        let breaches = check_moat(&grid, 2, 1);

        assert_eq!(
            breaches,
            vec![
                InvariantViolation::MoatBreach {
                    a: Coord::new(2, 1),
                    b: Coord::new(4, 1),
                },
                InvariantViolation::MoatBreach {
                    a: Coord::new(4, 1),
                    b: Coord::new(2, 1),
                },
            ]
        );
        for _ in 0..8 {
            assert_eq!(check_moat(&grid, 2, 1), breaches);
        }
    }

    #[test]
    fn test_one_sided_door() {
        let (mut grid, rooms) = grid_with_rooms();
        grid.cell_mut(&Coord::new(2, 1)).unwrap().doors.insert(Direction::East);

        assert_eq!(
            check_invariants(&grid, &rooms),
            vec![InvariantViolation::OneSidedDoor {
                coord: Coord::new(2, 1),
                direction: Direction::East
            }]
        );
    }

    #[test]
    fn test_components_follow_doors() {
        let (mut grid, rooms) = grid_with_rooms();
        for cell in grid.iter_mut() {
            cell.walls = EdgeSet::EMPTY;
        }

        // Rooms are two cells apart with rock in between
        assert_eq!(count_components(&grid, &rooms), 2);

        let mut rooms = rooms;
        let bridge = Coord::new(3, 1);
        grid.cell_mut(&bridge).unwrap().room = Some(0);
        rooms[0].cells.push(bridge);

        assert_eq!(count_components(&grid, &rooms), 1);
    }
}
