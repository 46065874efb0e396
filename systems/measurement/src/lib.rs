#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic measurement system that samples the road's measurement window
//! and accumulates fundamental-diagram series.

mod window;

use std::collections::VecDeque;

use log::debug;
use nasch_core::{CellView, Command, Event, Speed, WindowStats};
use serde::{Deserialize, Serialize};

pub use window::{measure, MeasurementWindow};

const DEFAULT_SAMPLE_INTERVAL: u32 = 2;
const DEFAULT_DIAGRAM_CAPACITY: usize = 2_048;

/// Configuration parameters required to construct the measurement system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    sample_interval: u32,
    diagram_capacity: usize,
}

impl Config {
    /// Creates a configuration that samples every `sample_interval` completed
    /// steps and keeps at most `diagram_capacity` diagram points.
    ///
    /// An interval of zero disables automatic sampling.
    #[must_use]
    pub const fn new(sample_interval: u32, diagram_capacity: usize) -> Self {
        Self {
            sample_interval,
            diagram_capacity,
        }
    }

    /// Number of completed steps between automatic samples.
    #[must_use]
    pub const fn sample_interval(&self) -> u32 {
        self.sample_interval
    }

    /// Maximum number of points retained by the fundamental diagram.
    #[must_use]
    pub const fn diagram_capacity(&self) -> usize {
        self.diagram_capacity
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL, DEFAULT_DIAGRAM_CAPACITY)
    }
}

/// Single fundamental-diagram sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramPoint {
    /// Local density of the measurement window.
    pub density: f64,
    /// Flow through the measurement window.
    pub flow: f64,
    /// Mean velocity divided by the speed limit, in `[0, 1]`.
    pub normalized_velocity: f64,
}

impl DiagramPoint {
    /// Builds a diagram point from window statistics and the road's speed limit.
    #[must_use]
    pub fn from_stats(stats: WindowStats, max_speed: Speed) -> Self {
        let normalized_velocity = if max_speed == Speed::ZERO {
            0.0
        } else {
            stats.mean_velocity / f64::from(max_speed.get())
        };

        Self {
            density: stats.local_density,
            flow: stats.flow,
            normalized_velocity,
        }
    }
}

/// Bounded series of diagram points, oldest first.
#[derive(Clone, Debug, Default)]
pub struct FundamentalDiagram {
    points: VecDeque<DiagramPoint>,
    capacity: usize,
}

impl FundamentalDiagram {
    /// Creates an empty diagram retaining at most `capacity` points.
    ///
    /// Storage grows on demand; only the default capacity is reserved up front.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity.min(DEFAULT_DIAGRAM_CAPACITY)),
            capacity,
        }
    }

    /// Maximum number of retained points.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Reports whether the diagram holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Appends a point, evicting the oldest ones once the capacity is reached.
    pub fn push(&mut self, point: DiagramPoint) {
        if self.capacity == 0 {
            return;
        }
        while self.points.len() >= self.capacity {
            let _ = self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// Drops every retained point.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Returns an iterator over the retained points, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DiagramPoint> + '_ {
        self.points.iter()
    }

    /// `(density, flow)` pairs.
    pub fn flow_density(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().map(|point| (point.density, point.flow))
    }

    /// `(density, normalized velocity)` pairs.
    pub fn velocity_density(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points
            .iter()
            .map(|point| (point.density, point.normalized_velocity))
    }

    /// `(flow, normalized velocity)` pairs.
    pub fn velocity_flow(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points
            .iter()
            .map(|point| (point.flow, point.normalized_velocity))
    }
}

/// Pure measurement system that samples the window on a fixed step cadence.
#[derive(Debug)]
pub struct Measurement {
    sample_interval: u32,
    steps_since_sample: u32,
    last_stats: Option<WindowStats>,
    diagram: FundamentalDiagram,
}

impl Measurement {
    /// Creates a new measurement system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            sample_interval: config.sample_interval,
            steps_since_sample: 0,
            last_stats: None,
            diagram: FundamentalDiagram::with_capacity(config.diagram_capacity),
        }
    }

    /// Statistics from the most recent sample, if any has been taken.
    #[must_use]
    pub fn last_stats(&self) -> Option<WindowStats> {
        self.last_stats
    }

    /// Fundamental-diagram points accumulated so far.
    #[must_use]
    pub fn diagram(&self) -> &FundamentalDiagram {
        &self.diagram
    }

    /// Consumes world events and applied commands to publish measurements.
    ///
    /// Clear requests are honoured before new samples, and at most one sample
    /// is taken per call, read from the provided cell view.
    pub fn handle(
        &mut self,
        events: &[Event],
        commands: &[Command],
        cells: CellView<'_>,
        max_speed: Speed,
        out: &mut Vec<Event>,
    ) {
        if commands
            .iter()
            .any(|command| matches!(command, Command::ClearDiagrams))
        {
            self.diagram.clear();
            out.push(Event::DiagramsCleared);
        }

        if self.sample_interval == 0 {
            return;
        }

        let mut sample_due = false;
        for event in events {
            if matches!(event, Event::StepCompleted { .. }) {
                self.steps_since_sample += 1;
                if self.steps_since_sample >= self.sample_interval {
                    self.steps_since_sample = 0;
                    sample_due = true;
                }
            }
        }

        if sample_due {
            let _ = self.measure_now(cells, max_speed, out);
        }
    }

    /// Samples the window immediately, regardless of the cadence.
    pub fn measure_now(
        &mut self,
        cells: CellView<'_>,
        max_speed: Speed,
        out: &mut Vec<Event>,
    ) -> WindowStats {
        let stats = measure(cells);
        debug!(
            "measured density {:.3}, velocity {:.3}, flow {:.3}",
            stats.local_density, stats.mean_velocity, stats.flow
        );

        self.last_stats = Some(stats);
        self.diagram.push(DiagramPoint::from_stats(stats, max_speed));
        out.push(Event::MeasurementTaken { stats });
        stats
    }
}

impl Default for Measurement {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
