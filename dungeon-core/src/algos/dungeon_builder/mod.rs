use crate::{
    algos::{StageKind, StageStatus, WorkBudget},
    dungeon::Dungeon,
    error::DungeonError,
    grid::Grid,
    types::Room,
};

use std::collections::VecDeque;

use tracing::{Level, event, info};

pub(crate) mod add_doors;
mod builder_config;
mod carve_corridors;
mod context;
mod fill_scrap;
mod grow_rooms;
mod seed_rooms;

pub use builder_config::{
    CorridorAlgorithm, CorridorConfig, DoorConfig, DungeonStyle, GeneratorConfig, GrowthConfig,
    ProxyPoint, ScrapAlgorithm, ScrapConfig, ScrapSeedPlacement, SeedAlgorithm, SeedConfig,
};
pub(crate) use context::GenContext;

/// One resumable pipeline stage. `step` does at most about a budget's
/// worth of work and reports whether anything is left.
pub(crate) trait Stage {
    fn kind(&self) -> StageKind;

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Progress {
    Working(StageKind),
    Finished,
}

/// Drives the stages in order, one bounded step at a time.
pub struct DungeonBuilder {
    ctx: GenContext,
    stages: VecDeque<Box<dyn Stage>>,
    stage_start: std::time::Instant,
    build_start: std::time::Instant,
}

impl DungeonBuilder {
    pub fn new(config: &GeneratorConfig) -> Result<Self, DungeonError> {
        let ctx = GenContext::new(config)?;
        let config = ctx.config;

        let stages: VecDeque<Box<dyn Stage>> = VecDeque::from([
            carve_corridors::CorridorCarverFactory::carver_for(config.corridors.algorithm),
            seed_rooms::RoomSeederFactory::seeder_for(config.seeding.algorithm),
            Box::new(grow_rooms::RoomGrower::new()) as Box<dyn Stage>,
            fill_scrap::ScrapFillerFactory::filler_for(config.scrap.algorithm),
            Box::new(add_doors::DoorPlanner::new()) as Box<dyn Stage>,
        ]);

        let now = std::time::Instant::now();

        Ok(DungeonBuilder {
            ctx,
            stages,
            stage_start: now,
            build_start: now,
        })
    }

    /// Throws away the current run and starts a fresh one. The previous
    /// state is kept if the new configuration is rejected.
    pub fn regenerate(&mut self, config: &GeneratorConfig) -> Result<(), DungeonError> {
        *self = Self::new(config)?;
        Ok(())
    }

    /// Runs the current stage for one work budget. A step never crosses
    /// into the next stage.
    pub fn step(&mut self) -> Progress {
        let Some(stage) = self.stages.front_mut() else {
            return Progress::Finished;
        };

        let kind = stage.kind();
        let mut budget = WorkBudget::new(self.ctx.config.work_per_step);

        if stage.step(&mut self.ctx, &mut budget) == StageStatus::Complete {
            self.stages.pop_front();
            self.finish_stage(kind);
        }

        match self.stages.front() {
            Some(stage) => Progress::Working(stage.kind()),
            None => Progress::Finished,
        }
    }

    fn finish_stage(&mut self, kind: StageKind) {
        self.ctx.reconcile();

        #[cfg(debug_assertions)]
        self.ctx.log_consistency(kind);

        let now = std::time::Instant::now();
        event!(
            Level::DEBUG,
            "Finished {} stage in {:.2}ms, {} rooms so far",
            kind,
            now.duration_since(self.stage_start).as_millis(),
            self.ctx.rooms.len()
        );
        self.stage_start = now;

        if self.stages.is_empty() {
            info!(
                "Generated dungeon with seed {} in {:.2}ms: {} rooms, {} corridor cells",
                self.ctx.seed,
                now.duration_since(self.build_start).as_millis(),
                self.ctx.rooms.iter().filter(|room| !room.is_corridor()).count(),
                self.ctx.corridors.len()
            );
        }
    }

    /// Steps until every stage is done.
    pub fn run(&mut self) {
        while self.step() != Progress::Finished {}
    }

    pub fn is_finished(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn current_stage(&self) -> Option<StageKind> {
        self.stages.front().map(|stage| stage.kind())
    }

    pub fn seed(&self) -> u64 {
        self.ctx.seed
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.ctx.config
    }

    /// Partial state, only meant for progress displays.
    pub fn grid(&self) -> &Grid {
        &self.ctx.grid
    }

    pub fn rooms(&self) -> &[Room] {
        &self.ctx.rooms
    }

    /// A copy of the finished layout.
    pub fn snapshot(&self) -> Result<Dungeon, DungeonError> {
        if !self.is_finished() {
            return Err(DungeonError::NotFinished);
        }

        Ok(Dungeon::new(
            self.ctx.grid.clone(),
            self.ctx.rooms.clone(),
            self.ctx.seed,
            self.ctx.door_report.clone(),
        ))
    }

    pub fn finish(self) -> Result<Dungeon, DungeonError> {
        if !self.is_finished() {
            return Err(DungeonError::NotFinished);
        }

        let ctx = self.ctx;
        Ok(Dungeon::new(ctx.grid, ctx.rooms, ctx.seed, ctx.door_report))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(seed: u64) -> GeneratorConfig {
        GeneratorConfig::default().with_size(40, 40).with_seed(seed)
    }

    #[test]
    fn test_stages_run_in_order() {
        let mut builder = DungeonBuilder::new(&config(1)).unwrap();
        let mut seen = vec![builder.current_stage().unwrap()];

        while let Progress::Working(kind) = builder.step() {
            if seen.last() != Some(&kind) {
                seen.push(kind);
            }
        }

        assert_eq!(
            seen,
            vec![
                StageKind::Corridors,
                StageKind::Seeding,
                StageKind::Growth,
                StageKind::Scrap,
                StageKind::Doors
            ]
        );
        assert!(builder.is_finished());
    }

    #[test]
    fn test_finish_before_done_fails() {
        let builder = DungeonBuilder::new(&config(1)).unwrap();

        assert!(matches!(builder.snapshot(), Err(DungeonError::NotFinished)));
        assert!(matches!(builder.finish(), Err(DungeonError::NotFinished)));
    }

    #[test]
    fn test_regenerate_starts_over() {
        let mut builder = DungeonBuilder::new(&config(1)).unwrap();
        builder.run();
        assert!(!builder.rooms().is_empty());

        builder.regenerate(&config(2)).unwrap();

        assert_eq!(builder.current_stage(), Some(StageKind::Corridors));
        assert!(builder.rooms().is_empty());
        assert!(builder.grid().iter().all(|cell| cell.is_unclaimed()));
        assert_eq!(builder.seed(), 2);
    }

    #[test]
    fn test_bad_config_keeps_previous_run() {
        let mut builder = DungeonBuilder::new(&config(1)).unwrap();
        builder.run();

        let result = builder.regenerate(&GeneratorConfig::default().with_size(2, 2));

        assert!(matches!(result, Err(DungeonError::InvalidDimensions { .. })));
        assert!(builder.is_finished());
        assert_eq!(builder.seed(), 1);
    }
}
