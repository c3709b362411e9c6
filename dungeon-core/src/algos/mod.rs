mod dungeon_builder;
mod union_find;

pub use dungeon_builder::add_doors::DoorReport;
pub use dungeon_builder::{
    CorridorAlgorithm, CorridorConfig, DoorConfig, DungeonBuilder, DungeonStyle, GeneratorConfig,
    GrowthConfig, Progress, ProxyPoint, ScrapAlgorithm, ScrapConfig, ScrapSeedPlacement,
    SeedAlgorithm, SeedConfig,
};
pub(crate) use union_find::UnionFind;

use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;

pub(crate) struct RngHandler;

impl RngHandler {
    /// Every stage draws from one generator seeded here, so a seed fully
    /// determines the layout.
    pub fn seeded(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    pub fn fresh_seed() -> u64 {
        use rand::Rng;

        rand::rng().random::<u64>()
    }
}

/// The pipeline stages, in the order they run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StageKind {
    Corridors,
    Seeding,
    Growth,
    Scrap,
    Doors,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Corridors => write!(f, "corridors"),
            StageKind::Seeding => write!(f, "seeding"),
            StageKind::Growth => write!(f, "growth"),
            StageKind::Scrap => write!(f, "scrap"),
            StageKind::Doors => write!(f, "doors"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StageStatus {
    // The budget ran out, call again to resume
    Yield,
    Complete,
}

/// Work units a stage may still spend before handing control back.
/// A unit is roughly one cell touched.
#[derive(Debug)]
pub(crate) struct WorkBudget {
    remaining: u32,
}

impl WorkBudget {
    pub fn new(units: u32) -> Self {
        WorkBudget { remaining: units }
    }

    pub fn spend(&mut self, units: u32) {
        self.remaining = self.remaining.saturating_sub(units);
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
