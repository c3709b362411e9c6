use super::{CorridorAlgorithm, GenContext, Stage};
use crate::{
    algos::{StageKind, StageStatus, WorkBudget},
    constants::{DIRECTIONS, MAX_LINE_STEPS, WALKER_EDGE_MARGIN},
    grid::Grid,
    types::{Coord, Direction, Rect, RoomId},
};

use rand::{Rng, rngs::StdRng};

mod random_walk;
mod wandering_mst;

pub(super) struct CorridorCarverFactory;

impl CorridorCarverFactory {
    pub fn carver_for(algorithm: CorridorAlgorithm) -> Box<dyn Stage> {
        match algorithm {
            CorridorAlgorithm::None => Box::new(NoCorridors),
            CorridorAlgorithm::RandomWalk => Box::new(random_walk::RandomWalkCarver::new()),
            CorridorAlgorithm::WanderingMst => Box::new(wandering_mst::WanderingMstCarver::new()),
        }
    }
}

struct NoCorridors;

impl Stage for NoCorridors {
    fn kind(&self) -> StageKind {
        StageKind::Corridors
    }

    fn step(&mut self, _ctx: &mut GenContext, _budget: &mut WorkBudget) -> StageStatus {
        StageStatus::Complete
    }
}

/// Marks the `width` sided square around `center` as corridor and records
/// the centre as part of the spine. Returns the cells visited.
pub(super) fn paint(ctx: &mut GenContext, center: Coord, room_id: RoomId) -> u32 {
    let width = ctx.config.corridors.width;
    let before = (width - 1) / 2;

    let min_col = center.col.saturating_sub(before);
    let min_row = center.row.saturating_sub(before);

    for row in min_row..min_row + width {
        for col in min_col..min_col + width {
            ctx.mark_corridor(Coord::new(col, row), room_id);
        }
    }

    ctx.mark_spine(&center);

    width * width
}

/// Cells on the line from `from` to `to`, both included. Diagonal moves get
/// an extra orthogonal cell so that consecutive cells always share an edge.
pub(super) fn rasterize_line(from: Coord, to: Coord) -> Vec<Coord> {
    let (mut x, mut y) = (from.col as i64, from.row as i64);
    let (tx, ty) = (to.col as i64, to.row as i64);

    let dx = (tx - x).abs();
    let dy = -(ty - y).abs();
    let sx = if x < tx { 1 } else { -1 };
    let sy = if y < ty { 1 } else { -1 };
    let mut err = dx + dy;

    let mut line = vec![from];
    let mut steps = 0;

    while (x, y) != (tx, ty) && steps < MAX_LINE_STEPS {
        let e2 = 2 * err;
        let step_x = e2 >= dy;
        let step_y = e2 <= dx;

        if step_x {
            err += dy;
            x += sx;
        }

        if step_x && step_y {
            line.push(Coord::new(x as u32, y as u32));
        }

        if step_y {
            err += dx;
            y += sy;
        }

        line.push(Coord::new(x as u32, y as u32));
        steps += 1;
    }

    line
}

/// A wandering cursor shared by the carvers. It keeps going straight for at
/// least `min_straight` steps between turns.
#[derive(Debug, Clone)]
pub(super) struct Walker {
    pub position: Coord,
    direction: Direction,
    run: u32,
    pub steps_left: u32,
}

pub(super) enum WalkerMove {
    Stepped,
    Bounced,
    // No legal neighbour, the walker was dropped somewhere else
    Teleported,
}

impl Walker {
    /// Spawns near a random edge of `area`, heading inwards.
    pub fn spawn(area: Rect, steps: u32, rng: &mut StdRng) -> Self {
        let inner = shrink(area, WALKER_EDGE_MARGIN);
        let direction = DIRECTIONS[rng.random_range(0..DIRECTIONS.len())];

        let col = rng.random_range(inner.origin.col..=inner.max_col());
        let row = rng.random_range(inner.origin.row..=inner.max_row());

        // The walker starts on the edge it walks away from
        let position = match direction {
            Direction::South => Coord::new(col, inner.origin.row),
            Direction::North => Coord::new(col, inner.max_row()),
            Direction::East => Coord::new(inner.origin.col, row),
            Direction::West => Coord::new(inner.max_col(), row),
        };

        Walker {
            position,
            direction,
            run: 0,
            steps_left: steps,
        }
    }

    pub fn advance(&mut self, grid: &Grid, wander: f64, min_straight: u32, rng: &mut StdRng) -> WalkerMove {
        self.steps_left = self.steps_left.saturating_sub(1);

        if self.run >= min_straight && rng.random_bool(wander) {
            let options = self.direction.perpendicular();
            self.direction = options[rng.random_range(0..options.len())];
            self.run = 0;
        }

        let forward = self.direction;
        let mut attempts = vec![forward, forward.reverse()];
        if rng.random_bool(0.5) {
            attempts.extend(forward.perpendicular());
        } else {
            attempts.extend(forward.perpendicular().iter().rev());
        }

        for (attempt, direction) in attempts.into_iter().enumerate() {
            if let Some(next) = grid.neighbour(&self.position, direction).filter(|c| grid.in_play(c)) {
                self.position = next;
                self.direction = direction;

                if attempt == 0 {
                    self.run += 1;
                    return WalkerMove::Stepped;
                }

                self.run = 0;
                return WalkerMove::Bounced;
            }
        }

        let area = grid.play_area();
        self.position = Coord::new(
            rng.random_range(area.origin.col..=area.max_col()),
            rng.random_range(area.origin.row..=area.max_row()),
        );
        self.run = 0;

        WalkerMove::Teleported
    }
}

fn shrink(area: Rect, margin: u32) -> Rect {
    if area.width > margin * 2 && area.height > margin * 2 {
        Rect::new(
            area.origin.col + margin,
            area.origin.row + margin,
            area.width - margin * 2,
            area.height - margin * 2,
        )
    } else {
        area
    }
}

/// Steps each walker takes when the length is left to be derived.
pub(super) fn auto_walk_length(ctx: &GenContext) -> u32 {
    let corridors = &ctx.config.corridors;
    if corridors.walk_length > 0 {
        return corridors.walk_length;
    }

    let area = ctx.grid.play_area().area();
    (area / (5 * corridors.walkers * corridors.width)).max(8)
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::algos::{GeneratorConfig, RngHandler};

    #[test]
    fn test_line_is_edge_connected() {
        let line = rasterize_line(Coord::new(1, 1), Coord::new(6, 4));

        assert_eq!(line.first(), Some(&Coord::new(1, 1)));
        assert_eq!(line.last(), Some(&Coord::new(6, 4)));
        assert!(line.windows(2).all(|pair| pair[0].distance(&pair[1]) == 1));
    }

    #[test]
    fn test_line_handles_reversed_and_straight() {
        let line = rasterize_line(Coord::new(5, 3), Coord::new(1, 3));
        assert_eq!(line.len(), 5);

        let line = rasterize_line(Coord::new(4, 8), Coord::new(2, 1));
        assert!(line.windows(2).all(|pair| pair[0].distance(&pair[1]) == 1));
        assert_eq!(line.last(), Some(&Coord::new(2, 1)));
    }

    #[test]
    fn test_walker_stays_in_play() {
        let config = GeneratorConfig::default().with_size(20, 12).with_seed(3);
        let grid = Grid::new(config.width, config.height, 2).unwrap();
        let mut rng = RngHandler::seeded(3);

        let mut walker = Walker::spawn(grid.play_area(), 200, &mut rng);
        while walker.steps_left > 0 {
            walker.advance(&grid, 0.4, 2, &mut rng);
            assert!(grid.in_play(&walker.position));
        }
    }

    #[test]
    fn test_paint_marks_square() {
        let mut config = GeneratorConfig::default().with_size(12, 12).with_seed(1);
        config.corridors.width = 3;
        let mut ctx = GenContext::new(&config).unwrap();
        let room = ctx.add_room(true);

        paint(&mut ctx, Coord::new(5, 5), room);

        assert_eq!(ctx.corridors.len(), 9);
        assert!(ctx.is_corridor(&Coord::new(4, 4)));
        assert!(ctx.is_corridor(&Coord::new(6, 6)));
        assert_eq!(ctx.corridors.sorted_spine().len(), 1);
    }
}
