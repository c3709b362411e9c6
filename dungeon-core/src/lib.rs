mod algos;
mod constants;
pub mod diagnostics;
mod dungeon;
mod error;
mod grid;
mod types;

use tracing::{Level, span};

pub use algos::{
    CorridorAlgorithm, CorridorConfig, DoorConfig, DoorReport, DungeonBuilder, DungeonStyle,
    GeneratorConfig, GrowthConfig, Progress, ProxyPoint, ScrapAlgorithm, ScrapConfig,
    ScrapSeedPlacement, SeedAlgorithm, SeedConfig, StageKind,
};
pub use dungeon::Dungeon;
pub use error::DungeonError;
pub use grid::{Cell, Grid};
pub use types::{Coord, Direction, EdgeSet, Rect, Room, RoomId, Vector2};

/// Runs the whole pipeline in one go.
pub fn create_dungeon(config: &GeneratorConfig) -> Result<Dungeon, DungeonError> {
    let span = span!(Level::DEBUG, "generate");
    let _guard = span.enter();

    let mut builder = DungeonBuilder::new(config)?;
    builder.run();
    builder.finish()
}
