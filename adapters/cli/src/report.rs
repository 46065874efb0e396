use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use nasch_core::{PlayMode, WindowStats};
use nasch_system_measurement::{DiagramPoint, Measurement};
use nasch_world::{query, Road};
use serde::Serialize;

/// Number of leading gap bins included in the run summary.
const SUMMARY_GAP_BINS: usize = 10;

/// Rendering used for measurement lines and the final summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Single measurement published while the road runs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub(crate) struct MeasurementLine {
    pub(crate) tick: u64,
    pub(crate) vehicles: usize,
    #[serde(flatten)]
    pub(crate) stats: WindowStats,
    pub(crate) normalized_velocity: f64,
}

impl MeasurementLine {
    pub(crate) fn capture(road: &Road, stats: WindowStats) -> Self {
        let point = DiagramPoint::from_stats(stats, query::config(road).max_speed());
        Self {
            tick: query::tick(road),
            vehicles: query::vehicle_count(road),
            stats,
            normalized_velocity: point.normalized_velocity,
        }
    }
}

/// State of the road once the driver stops.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Summary {
    pub(crate) tick: u64,
    pub(crate) vehicles: usize,
    pub(crate) play_mode: PlayMode,
    pub(crate) velocity_histogram: Vec<f64>,
    pub(crate) gap_histogram: Vec<f64>,
    pub(crate) diagram_points: usize,
}

impl Summary {
    pub(crate) fn capture(road: &Road, measurement: &Measurement) -> Self {
        Self {
            tick: query::tick(road),
            vehicles: query::vehicle_count(road),
            play_mode: query::play_mode(road),
            velocity_histogram: query::velocity_histogram(road).as_slice().to_vec(),
            gap_histogram: query::gap_histogram(road)
                .iter()
                .take(SUMMARY_GAP_BINS)
                .map(|(_, frequency)| frequency)
                .collect(),
            diagram_points: measurement.diagram().len(),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Measurement(&'a MeasurementLine),
    Summary(&'a Summary),
}

/// Writes measurement lines and the summary in the selected format.
#[derive(Debug)]
pub(crate) struct Reporter<W> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    pub(crate) fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub(crate) fn measurement(&mut self, line: &MeasurementLine) -> Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(
                self.out,
                "tick {:>6}  vehicles {:>4}  density {:.3}  velocity {:.3}  flow {:.3}",
                line.tick,
                line.vehicles,
                line.stats.local_density,
                line.stats.mean_velocity,
                line.stats.flow
            )?,
            OutputFormat::Json => self.json(&Record::Measurement(line))?,
        }
        Ok(())
    }

    pub(crate) fn summary(&mut self, summary: &Summary) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                let mode = match summary.play_mode {
                    PlayMode::Running => "running",
                    PlayMode::Paused => "paused",
                };
                writeln!(
                    self.out,
                    "completed {} steps with {} vehicles ({mode})",
                    summary.tick, summary.vehicles
                )?;
                writeln!(
                    self.out,
                    "velocity histogram: {}",
                    format_bins(&summary.velocity_histogram)
                )?;
                writeln!(
                    self.out,
                    "gap histogram: {}",
                    format_bins(&summary.gap_histogram)
                )?;
                writeln!(
                    self.out,
                    "fundamental diagram: {} points",
                    summary.diagram_points
                )?;
            }
            OutputFormat::Json => self.json(&Record::Summary(summary))?,
        }
        self.out.flush()?;
        Ok(())
    }

    fn json(&mut self, record: &Record<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        writeln!(self.out)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

fn format_bins(bins: &[f64]) -> String {
    bins.iter()
        .enumerate()
        .map(|(bin, frequency)| format!("{bin}:{frequency:.3}"))
        .collect::<Vec<_>>()
        .join(" ")
}
