use crate::{
    constants::{
        MAX_CORRIDOR_WIDTH, MAX_MOAT, MAX_PEEL_ITERATIONS, MAX_SEED_JITTER, MAX_WALKERS, MIN_WORK_PER_STEP,
    },
    error::DungeonError,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DungeonStyle {
    #[default]
    Catacombs,
    Warrens,
    Halls,
}

impl DungeonStyle {
    pub fn try_from_str(style: &str) -> Result<Self, DungeonError> {
        Ok(match style {
            "catacombs" => DungeonStyle::Catacombs,
            "warrens" => DungeonStyle::Warrens,
            "halls" => DungeonStyle::Halls,
            _ => return Err(DungeonError::UnknownStyle(style.to_string())),
        })
    }
}

#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorridorAlgorithm {
    None,
    #[default]
    RandomWalk,
    WanderingMst,
}

#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedAlgorithm {
    #[default]
    AlongCorridors,
    Scattered,
}

#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrapAlgorithm {
    None,
    #[default]
    Voronoi,
    SeedAndGrow,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrapSeedPlacement {
    #[default]
    Scatter,
    Perimeter,
}

// The point of a room scrap cells measure their distance to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyPoint {
    #[default]
    Centroid,
    FirstCell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorridorConfig {
    pub algorithm: CorridorAlgorithm,
    // Side of the square painted around every walker step
    pub width: u32,
    pub walkers: u32,
    // Probability of turning on any step once the minimum run is done
    pub wander: f64,
    pub min_straight: u32,
    // Steps per walker, zero derives it from the playable area
    pub walk_length: u32,
    // Whether every walk ends up in a single corridor room
    pub merge_walks: bool,
    // Wandering MST: steps between sampled waypoints
    pub waypoint_interval: u32,
    // Wandering MST: minimum Manhattan distance between kept waypoints
    pub waypoint_separation: u32,
    pub loop_edge_fraction: f64,
    pub max_loop_edges: u32,
    pub loop_edge_max_length: u32,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        CorridorConfig {
            algorithm: CorridorAlgorithm::RandomWalk,
            width: 1,
            walkers: 1,
            wander: 0.15,
            min_straight: 3,
            walk_length: 0,
            merge_walks: true,
            waypoint_interval: 6,
            waypoint_separation: 5,
            loop_edge_fraction: 0.1,
            max_loop_edges: 4,
            loop_edge_max_length: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub algorithm: SeedAlgorithm,
    // Minimum Manhattan distance between two anchors
    pub spacing: u32,
    // How far an anchor may slide along its corridor
    pub jitter: u32,
    // Probability of taking the opposite side from the previous anchor
    pub alternate_side_prob: f64,
    // Seeds planted by the scattered strategy, zero derives it from spacing
    pub scatter_count: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        SeedConfig {
            algorithm: SeedAlgorithm::AlongCorridors,
            spacing: 7,
            jitter: 2,
            alternate_side_prob: 0.7,
            scatter_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    pub credit_min: u32,
    pub credit_max: u32,
    pub target_aspect: f32,
    // Hard ceiling, growing past it cools down the long axis
    pub max_aspect: f32,
    pub skip_prob: f64,
    pub passes_between_splits: u32,
    pub split_area: u32,
    pub split_aspect: f32,
    pub cooldown_passes: u32,
    pub max_passes: u32,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        GrowthConfig {
            credit_min: 12,
            credit_max: 48,
            target_aspect: 1.6,
            max_aspect: 2.5,
            skip_prob: 0.15,
            passes_between_splits: 6,
            split_area: 64,
            split_aspect: 3.0,
            cooldown_passes: 3,
            max_passes: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapConfig {
    pub algorithm: ScrapAlgorithm,
    pub proxy: ProxyPoint,
    pub peel_iterations: u32,
    pub placement: ScrapSeedPlacement,
    pub seed_spacing: u32,
    // Scrap regions smaller than this are left as rock
    pub min_region: u32,
    pub max_rounds: u32,
}

impl Default for ScrapConfig {
    fn default() -> Self {
        ScrapConfig {
            algorithm: ScrapAlgorithm::Voronoi,
            proxy: ProxyPoint::Centroid,
            peel_iterations: 2,
            placement: ScrapSeedPlacement::Scatter,
            seed_spacing: 5,
            min_region: 4,
            max_rounds: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorConfig {
    // Minimum distance between two candidates on the same room edge
    pub min_spacing: u32,
    pub dead_end_reach: u32,
    pub max_doors_per_room: u32,
    pub loop_fraction: f64,
    pub max_loop_doors: u32,
    // Loop doors between rooms further apart than this are rejected
    pub max_loop_chord: u32,
    // Ignore the per room cap when it is the only thing keeping the layout
    // disconnected
    pub relax_caps: bool,
}

impl Default for DoorConfig {
    fn default() -> Self {
        DoorConfig {
            min_spacing: 3,
            dead_end_reach: 6,
            max_doors_per_room: 4,
            loop_fraction: 0.08,
            max_loop_doors: 12,
            max_loop_chord: 24,
            relax_caps: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub width: u32,
    pub height: u32,
    // Cells closer than this to the map edge are never touched
    pub border: u32,
    pub seed: Option<u64>,
    // Draw a fresh seed even if one is configured
    pub randomize: bool,
    pub moat: u32,
    pub thin_walls: bool,
    // Work units a single scheduler step may spend
    pub work_per_step: u32,
    pub corridors: CorridorConfig,
    pub seeding: SeedConfig,
    pub growth: GrowthConfig,
    pub scrap: ScrapConfig,
    pub doors: DoorConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            width: 64,
            height: 48,
            border: 1,
            seed: None,
            randomize: false,
            moat: 1,
            thin_walls: false,
            work_per_step: 4096,
            corridors: CorridorConfig::default(),
            seeding: SeedConfig::default(),
            growth: GrowthConfig::default(),
            scrap: ScrapConfig::default(),
            doors: DoorConfig::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_style(style: DungeonStyle) -> Self {
        let mut base = Self::default();

        match style {
            DungeonStyle::Catacombs => {}
            DungeonStyle::Warrens => {
                base.corridors.algorithm = CorridorAlgorithm::RandomWalk;
                base.corridors.walkers = 3;
                base.corridors.wander = 0.3;
                base.corridors.min_straight = 2;

                base.seeding.spacing = 5;
                base.seeding.jitter = 1;

                base.growth.credit_min = 6;
                base.growth.credit_max = 24;
                base.growth.split_area = 36;

                base.scrap.algorithm = ScrapAlgorithm::SeedAndGrow;

                base.doors.max_doors_per_room = 3;
                base.doors.loop_fraction = 0.15;
            }
            DungeonStyle::Halls => {
                base.corridors.algorithm = CorridorAlgorithm::WanderingMst;
                base.corridors.width = 2;
                base.corridors.wander = 0.1;
                base.corridors.min_straight = 5;

                base.seeding.spacing = 10;
                base.seeding.jitter = 3;

                base.growth.credit_min = 30;
                base.growth.credit_max = 90;
                base.growth.target_aspect = 1.3;
                base.growth.split_area = 120;

                base.moat = 2;

                base.doors.max_doors_per_room = 6;
                base.doors.loop_fraction = 0.05;
            }
        }

        base
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.randomize = false;
        self
    }

    /// Clearance kept between two different rooms.
    pub fn room_gap(&self) -> u32 {
        if self.thin_walls { 0 } else { self.moat }
    }

    /// Clearance kept between a room and any corridor.
    pub fn corridor_gap(&self) -> u32 {
        self.moat
    }

    /// Returns a copy where every out of range value has been clamped.
    /// Clamping is logged rather than rejected.
    pub fn sanitized(&self) -> Self {
        let mut config = *self;

        config.moat = clamp_u32("moat", config.moat, 0, MAX_MOAT);
        config.work_per_step =
            clamp_u32("work_per_step", config.work_per_step, MIN_WORK_PER_STEP, u32::MAX);

        let corridors = &mut config.corridors;
        corridors.width = clamp_u32("corridors.width", corridors.width, 1, MAX_CORRIDOR_WIDTH);
        corridors.walkers = clamp_u32("corridors.walkers", corridors.walkers, 1, MAX_WALKERS);
        corridors.wander = clamp_prob("corridors.wander", corridors.wander);
        corridors.waypoint_interval =
            clamp_u32("corridors.waypoint_interval", corridors.waypoint_interval, 1, u32::MAX);
        corridors.loop_edge_fraction =
            clamp_prob("corridors.loop_edge_fraction", corridors.loop_edge_fraction);

        let seeding = &mut config.seeding;
        seeding.spacing = clamp_u32("seeding.spacing", seeding.spacing, 1, u32::MAX);
        seeding.jitter = clamp_u32("seeding.jitter", seeding.jitter, 0, MAX_SEED_JITTER);
        seeding.alternate_side_prob =
            clamp_prob("seeding.alternate_side_prob", seeding.alternate_side_prob);

        let growth = &mut config.growth;
        if growth.credit_min > growth.credit_max {
            warn!(
                "growth credit range [{}..={}] is inverted, swapping its bounds",
                growth.credit_min, growth.credit_max
            );
            std::mem::swap(&mut growth.credit_min, &mut growth.credit_max);
        }
        growth.target_aspect = clamp_f32("growth.target_aspect", growth.target_aspect, 1.0, 16.0);
        growth.max_aspect = clamp_f32(
            "growth.max_aspect",
            growth.max_aspect,
            growth.target_aspect,
            16.0,
        );
        growth.skip_prob = clamp_f64("growth.skip_prob", growth.skip_prob, 0.0, 0.9);
        growth.passes_between_splits = clamp_u32(
            "growth.passes_between_splits",
            growth.passes_between_splits,
            1,
            u32::MAX,
        );
        growth.split_aspect = clamp_f32("growth.split_aspect", growth.split_aspect, 1.0, 64.0);
        growth.max_passes = clamp_u32("growth.max_passes", growth.max_passes, 1, 100_000);

        let scrap = &mut config.scrap;
        scrap.peel_iterations =
            clamp_u32("scrap.peel_iterations", scrap.peel_iterations, 1, MAX_PEEL_ITERATIONS);
        scrap.seed_spacing = clamp_u32("scrap.seed_spacing", scrap.seed_spacing, 1, u32::MAX);
        scrap.min_region = clamp_u32("scrap.min_region", scrap.min_region, 1, u32::MAX);

        let doors = &mut config.doors;
        doors.max_doors_per_room =
            clamp_u32("doors.max_doors_per_room", doors.max_doors_per_room, 1, u32::MAX);
        doors.loop_fraction = clamp_prob("doors.loop_fraction", doors.loop_fraction);

        config
    }
}

fn clamp_u32(name: &str, value: u32, min: u32, max: u32) -> u32 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("{} = {} is out of range, clamped to {}", name, value, clamped);
    }
    clamped
}

fn clamp_f64(name: &str, value: f64, min: f64, max: f64) -> f64 {
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        warn!("{} = {} is out of range, clamped to {}", name, value, clamped);
    }
    clamped
}

fn clamp_prob(name: &str, value: f64) -> f64 {
    clamp_f64(name, value, 0.0, 1.0)
}

fn clamp_f32(name: &str, value: f32, min: f32, max: f32) -> f32 {
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        warn!("{} = {} is out of range, clamped to {}", name, value, clamped);
    }
    clamped
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sanitized_clamps_out_of_range_values() {
        let mut config = GeneratorConfig::default();
        config.moat = 40;
        config.corridors.width = 0;
        config.corridors.wander = 3.5;
        config.growth.credit_min = 50;
        config.growth.credit_max = 10;
        config.doors.loop_fraction = -1.0;
        config.seeding.jitter = u32::MAX;

        let config = config.sanitized();

        assert_eq!(config.moat, MAX_MOAT);
        assert_eq!(config.corridors.width, 1);
        assert_eq!(config.corridors.wander, 1.0);
        assert_eq!((config.growth.credit_min, config.growth.credit_max), (10, 50));
        assert_eq!(config.doors.loop_fraction, 0.0);
        assert_eq!(config.seeding.jitter, MAX_SEED_JITTER);
    }

    #[test]
    fn test_sanitized_keeps_defaults() {
        let config = GeneratorConfig::default();

        assert_eq!(config.sanitized(), config);
    }

    #[test]
    fn test_thin_walls_only_affect_room_gap() {
        let mut config = GeneratorConfig::default();
        config.moat = 2;
        config.thin_walls = true;

        assert_eq!(config.room_gap(), 0);
        assert_eq!(config.corridor_gap(), 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GeneratorConfig =
            serde_json::from_str(r#"{ "width": 40, "corridors": { "algorithm": "wandering-mst" } }"#)
                .unwrap();

        assert_eq!(config.width, 40);
        assert_eq!(config.height, GeneratorConfig::default().height);
        assert_eq!(config.corridors.algorithm, CorridorAlgorithm::WanderingMst);
        assert_eq!(config.corridors.walkers, 1);
    }

    #[test]
    fn test_style_from_str() {
        assert_eq!(DungeonStyle::try_from_str("halls"), Ok(DungeonStyle::Halls));
        assert!(DungeonStyle::try_from_str("castle").is_err());
    }
}
