#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that drives the NaSch traffic model and reports its
//! windowed measurements.

mod report;

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use nasch_core::{
    Command, Density, Event, PlayMode, RoadConfig, SimRng, SlowdownProbability, Speed,
    CANONICAL_LENGTH, CANONICAL_MAX_SPEED,
};
use nasch_system_measurement::{Config as MeasurementConfig, Measurement};
use nasch_world::{self as world, query, Road};

use crate::report::{MeasurementLine, OutputFormat, Reporter, Summary};

const DEFAULT_SEED: u64 = 0x4e61_5363;

/// Runs the Nagel-Schreckenberg traffic model on a circular single-lane road.
#[derive(Debug, Parser)]
#[command(name = "nasch", version)]
struct Args {
    /// Number of cells on the road.
    #[arg(long, default_value_t = CANONICAL_LENGTH)]
    length: usize,
    /// Highest speed a vehicle may reach, in cells per step.
    #[arg(long, default_value_t = CANONICAL_MAX_SPEED.get())]
    max_speed: u8,
    /// Initial density, also used as the target unless `--target-density` is given.
    #[arg(long, default_value_t = 0.20)]
    density: f64,
    /// Density the vehicle count is matched to before every step.
    #[arg(long)]
    target_density: Option<f64>,
    /// Probability that a moving vehicle randomly slows down.
    #[arg(long, default_value_t = 0.50)]
    slowdown: f64,
    /// Number of steps to run.
    #[arg(long, default_value_t = 1_000)]
    steps: u64,
    /// Completed steps between measurements; zero disables them.
    #[arg(long, default_value_t = 2)]
    sample_interval: u32,
    /// Maximum number of fundamental-diagram points retained.
    #[arg(long, default_value_t = 2_048)]
    diagram_capacity: usize,
    /// Seed for the random source.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Pause the road after this many steps and stop driving it.
    #[arg(long)]
    pause_after: Option<u64>,
    /// Output format for measurements and the summary.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Validated run parameters.
#[derive(Clone, Copy, Debug)]
struct Settings {
    road: RoadConfig,
    initial_density: Density,
    target_density: Density,
    slowdown: SlowdownProbability,
    steps: u64,
    measurement: MeasurementConfig,
    seed: u64,
    pause_after: Option<u64>,
    format: OutputFormat,
}

impl TryFrom<&Args> for Settings {
    type Error = anyhow::Error;

    fn try_from(args: &Args) -> Result<Self> {
        let road = RoadConfig::new(args.length, Speed::new(args.max_speed))
            .context("invalid road dimensions")?;
        let initial_density = Density::new(args.density).context("invalid --density")?;
        let target_density = match args.target_density {
            Some(value) => Density::new(value).context("invalid --target-density")?,
            None => initial_density,
        };
        let _ = road
            .vehicles_for(target_density)
            .context("target density leaves no free cell")?;
        let slowdown = SlowdownProbability::new(args.slowdown).context("invalid --slowdown")?;

        Ok(Self {
            road,
            initial_density,
            target_density,
            slowdown,
            steps: args.steps,
            measurement: MeasurementConfig::new(args.sample_interval, args.diagram_capacity),
            seed: args.seed,
            pause_after: args.pause_after,
            format: args.format,
        })
    }
}

/// Entry point for the NaSch command-line interface.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let settings = Settings::try_from(&args)?;
    let stdout = io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), settings.format);
    run(&settings, &mut reporter)
}

fn run<W: Write>(settings: &Settings, reporter: &mut Reporter<W>) -> Result<()> {
    let mut rng = SimRng::from_seed_u64(settings.seed);
    let mut road = Road::new(settings.road, settings.initial_density, &mut rng)
        .context("failed to build road")?;
    let mut measurement = Measurement::new(settings.measurement);
    info!(
        "running {} steps on a road of {} cells with {} vehicles",
        settings.steps,
        settings.road.length(),
        query::vehicle_count(&road)
    );

    let step = Command::Step {
        slowdown: settings.slowdown,
        target_density: settings.target_density,
    };

    for completed in 0..settings.steps {
        if settings.pause_after == Some(completed) {
            let mut events = Vec::new();
            world::apply(
                &mut road,
                Command::SetPlayMode {
                    mode: PlayMode::Paused,
                },
                &mut rng,
                &mut events,
            );
        }
        if query::play_mode(&road) == PlayMode::Paused {
            info!("paused after {completed} steps");
            break;
        }

        let mut events = Vec::new();
        world::apply(&mut road, step, &mut rng, &mut events);

        let mut published = Vec::new();
        measurement.handle(
            &events,
            &[step],
            query::cell_view(&road),
            settings.road.max_speed(),
            &mut published,
        );

        for event in events.iter().chain(&published) {
            match event {
                Event::StepRejected { reason } => bail!("step {completed} rejected: {reason}"),
                Event::MeasurementTaken { stats } => {
                    reporter.measurement(&MeasurementLine::capture(&road, *stats))?;
                }
                _ => {}
            }
        }
    }

    reporter.summary(&Summary::capture(&road, &measurement))
}
