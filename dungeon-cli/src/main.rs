mod preview;

use dungeon_core::{Dungeon, DungeonStyle, GeneratorConfig, diagnostics};

use std::{
    fs::{create_dir_all, read_to_string},
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use clap::Parser;
use rayon::prelude::*;
use svg::save as save_as_svg;
use tracing::{Level, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Procedural dungeon layout generator", long_about = None)]
struct Args {
    /// Number of columns in the map, overrides the configuration
    #[arg(long)]
    width: Option<u32>,

    /// Number of rows in the map, overrides the configuration
    #[arg(long)]
    height: Option<u32>,

    /// Seed for the first layout, further layouts use seed + i
    #[arg(short, long)]
    seed: Option<u64>,

    /// Preset to start from when no configuration file is given
    #[arg(long, value_enum)]
    style: Option<DungeonStyle>,

    /// JSON configuration file, missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the SVG preview
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How many layouts to generate
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,

    /// Print the layout as text
    #[arg(long)]
    ascii: bool,

    /// Run the consistency checks on every layout
    #[arg(long)]
    check: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> anyhow::Result<GeneratorConfig> {
    let mut config = match (&args.config, args.style) {
        (Some(path), style) => {
            if style.is_some() {
                warn!("Both a configuration file and a style were given, ignoring the style");
            }

            let contents = read_to_string(path)
                .with_context(|| format!("Failed to read configuration {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse configuration {}", path.display()))?
        }
        (None, Some(style)) => GeneratorConfig::from_style(style),
        (None, None) => GeneratorConfig::default(),
    };

    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }

    Ok(config)
}

fn output_path(args: &Args, dungeon: &Dungeon) -> PathBuf {
    match &args.output {
        Some(path) if args.count == 1 => path.clone(),
        Some(path) => {
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dungeon".to_string());
            path.with_file_name(format!("{}-{}.svg", stem, dungeon.seed()))
        }
        None => Path::new("generated").join(format!("{}-dungeon.svg", dungeon.seed())),
    }
}

fn check(dungeon: &Dungeon, config: &GeneratorConfig) -> usize {
    let consistency = diagnostics::check_consistency(dungeon.grid(), dungeon.rooms());
    let invariants = diagnostics::check_invariants(dungeon.grid(), dungeon.rooms());
    let components = diagnostics::count_components(dungeon.grid(), dungeon.rooms());

    for issue in consistency.iter() {
        warn!("seed {}: {}", dungeon.seed(), issue);
    }
    for violation in invariants.iter() {
        warn!("seed {}: {}", dungeon.seed(), violation);
    }

    println!(
        "seed {}: {} rooms, {} corridor cells, {} doors, {} component/s, {} issue/s (moat {})",
        dungeon.seed(),
        dungeon.chambers().count(),
        dungeon.corridor_cells().count(),
        dungeon.door_count(),
        components,
        consistency.len() + invariants.len(),
        config.moat
    );

    consistency.len() + invariants.len()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let config = load_config(&args)?;

    let configs = (0..args.count as u64)
        .map(|i| match args.seed {
            Some(seed) => config.with_seed(seed.wrapping_add(i)),
            None => config,
        })
        .collect::<Vec<_>>();

    let dungeons = configs
        .par_iter()
        .map(dungeon_core::create_dungeon)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to generate dungeon")?;

    let mut issues = 0;

    for dungeon in dungeons.iter() {
        let path = output_path(&args, dungeon);

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        info!("Saving dungeon with seed {} as SVG to: {}", dungeon.seed(), path.display());
        save_as_svg(&path, &preview::render_svg(dungeon))
            .with_context(|| format!("Failed to save SVG file {}", path.display()))?;

        if args.ascii {
            println!("{}", preview::render_ascii(dungeon));
        }

        if args.check {
            issues += check(dungeon, &config);
        }
    }

    if issues > 0 {
        bail!("Found {} consistency issue/s", issues);
    }

    Ok(())
}
