use crate::types::Direction;

pub(crate) const MIN_MAP_SIDE: u32 = 4;
pub(crate) const MAX_MAP_SIDE: u32 = 2048;

pub(crate) const MAX_CORRIDOR_WIDTH: u32 = 5;
pub(crate) const MAX_WALKERS: u32 = 16;
pub(crate) const MAX_MOAT: u32 = 4;
pub(crate) const MAX_PEEL_ITERATIONS: u32 = 8;
pub(crate) const MAX_SEED_JITTER: u32 = 32;
pub(crate) const MIN_WORK_PER_STEP: u32 = 64;

// Walkers start this many cells inside the playable area
pub(crate) const WALKER_EDGE_MARGIN: u32 = 2;
// Bresenham rasterization gives up after this many cells
pub(crate) const MAX_LINE_STEPS: u32 = 4096;
pub(crate) const MAX_MST_LOOP_EDGES: u32 = 32;

pub(crate) const SEED_REACH_SLACK: u32 = 2;

pub(crate) const COMPACT_SIDE_BONUS: f32 = 2.0;
pub(crate) const COOLDOWN_PENALTY: f32 = 3.0;
pub(crate) const MIN_SPLIT_PCT: f32 = 0.35;
pub(crate) const MAX_SPLIT_PCT: f32 = 0.65;

// Door candidates are ordered by span first, jitter only breaks ties
pub(crate) const DOOR_JITTER_RANGE: u32 = 1000;

pub(crate) const IMPASSABLE_COST: u32 = u32::MAX;
pub(crate) const FLOOR_COST: u32 = 1;

pub(crate) const CORRIDOR_COLOR: u32 = 0x808080;
pub(crate) const ROOM_PALETTE: [u32; 8] = [
    0x0080ff, 0x00c8c8, 0x004bff, 0x00e000, 0xf8a000, 0xc060f0, 0xf86080, 0x80c040,
];

pub(crate) const DIRECTIONS: [Direction; 4] = [
    Direction::North,
    Direction::South,
    Direction::East,
    Direction::West,
];
