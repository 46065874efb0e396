#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the NaSch traffic engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative road, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the road executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! views such as [`CellView`] and [`HistogramView`], and respond exclusively
//! with new events or command batches.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of cells on the canonical circular road.
pub const CANONICAL_LENGTH: usize = 300;

/// Highest speed reachable on the canonical road, in cells per step.
pub const CANONICAL_MAX_SPEED: Speed = Speed::new(5);

/// Smallest road that still leaves a non-empty measurement window.
pub const MIN_ROAD_LENGTH: usize = 3;

/// Describes whether the driver should keep advancing the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayMode {
    /// Steps are accepted and the road advances.
    #[default]
    Running,
    /// Steps are rejected until the simulation is resumed.
    Paused,
}

/// Commands that express all permissible road mutations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Advances the automaton by exactly one discrete time step.
    Step {
        /// Probability that a moving vehicle randomly loses one unit of speed.
        slowdown: SlowdownProbability,
        /// Global density the vehicle count is matched to before updating.
        target_density: Density,
    },
    /// Requests that the road transition to the provided play mode.
    SetPlayMode {
        /// Mode the road should activate.
        mode: PlayMode,
    },
    /// Discards every fundamental-diagram point collected so far.
    ClearDiagrams,
}

/// Events broadcast after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Vehicles were taken off the road to match a lower target density.
    VehiclesRemoved {
        /// Number of vehicles removed.
        count: usize,
    },
    /// Vehicles were put on the road to match a higher target density.
    VehiclesInserted {
        /// Number of vehicles inserted, each starting at the speed limit.
        count: usize,
    },
    /// Confirms that both update passes finished for a step.
    StepCompleted {
        /// Number of steps completed since the road was created.
        tick: u64,
        /// Vehicles on the road after the step.
        vehicles: usize,
    },
    /// Reports that a step request was refused without touching the road.
    StepRejected {
        /// Specific reason the step was refused.
        reason: StepRejection,
    },
    /// Announces that the simulation entered a new play mode.
    PlayModeChanged {
        /// Mode that became active after processing commands.
        mode: PlayMode,
    },
    /// Publishes a fresh windowed measurement.
    MeasurementTaken {
        /// Statistics captured over the measurement window.
        stats: WindowStats,
    },
    /// Confirms that the fundamental-diagram series was emptied.
    DiagramsCleared,
}

/// Reasons a step request may be rejected.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum StepRejection {
    /// The simulation is paused, so steps are disabled.
    #[error("simulation is paused")]
    Paused,
    /// The requested parameters do not fit the road.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Out-of-range configuration values.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The density would fill every cell, leaving no room to move.
    #[error("density implies {vehicles} vehicles on a road of {length} cells")]
    DensityOutOfRange {
        /// Vehicles the density would require.
        vehicles: usize,
        /// Number of cells on the road.
        length: usize,
    },
    /// The density is not a finite fraction in `[0, 1)`.
    #[error("density {0} is outside [0, 1)")]
    InvalidDensity(f64),
    /// The slowdown probability is not a finite value in `[0, 1]`.
    #[error("slowdown probability {0} is outside [0, 1]")]
    InvalidSlowdown(f64),
    /// The road is too short to hold a measurement window.
    #[error("road length {length} is below the minimum of {MIN_ROAD_LENGTH} cells")]
    RoadTooShort {
        /// Requested number of cells.
        length: usize,
    },
    /// A speed limit of zero would freeze every vehicle.
    #[error("speed limit must be at least one cell per step")]
    ZeroSpeedLimit,
    /// A prepared layout does not match the configured road length.
    #[error("layout holds {actual} cells but the road has {expected}")]
    CellCountMismatch {
        /// Cells the configured road holds.
        expected: usize,
        /// Cells supplied by the layout.
        actual: usize,
    },
    /// A prepared layout contains a vehicle faster than the speed limit.
    #[error("speed {speed} at cell {index} exceeds the limit of {max_speed}")]
    SpeedAboveLimit {
        /// Offending cell.
        index: usize,
        /// Speed stored in the cell.
        speed: u8,
        /// Configured speed limit.
        max_speed: u8,
    },
}

/// Integer vehicle speed measured in cells per step.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Speed(u8);

impl Speed {
    /// A stationary vehicle.
    pub const ZERO: Self = Self(0);

    /// Creates a new speed with the provided number of cells per step.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the speed.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// Distance covered in one step, usable for index arithmetic.
    #[must_use]
    pub const fn cells(&self) -> usize {
        self.0 as usize
    }

    /// Returns the speed one unit higher, capped at `limit`.
    #[must_use]
    pub fn accelerate(self, limit: Speed) -> Self {
        Self(self.0.saturating_add(1).min(limit.0))
    }

    /// Returns the speed one unit lower, never dropping below zero.
    #[must_use]
    pub const fn decelerate(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Highest speed that cannot close a gap of `gap` empty cells.
    ///
    /// Gaps wider than `u8::MAX` saturate; callers only brake when the gap is
    /// no wider than the current speed.
    #[must_use]
    pub fn within_gap(gap: usize) -> Self {
        Self(u8::try_from(gap).unwrap_or(u8::MAX))
    }
}

/// Fraction of occupied cells, validated to lie in `[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Density(f64);

impl Density {
    /// An empty road.
    pub const ZERO: Self = Self(0.0);

    /// Validates a density fraction.
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && (0.0..1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidDensity(value))
        }
    }

    /// Retrieves the underlying fraction.
    #[must_use]
    pub const fn get(&self) -> f64 {
        self.0
    }

    /// Number of vehicles the density describes on a road of `length` cells,
    /// rounded down.
    #[must_use]
    pub fn vehicles_on(&self, length: usize) -> usize {
        (self.0 * length as f64).floor() as usize
    }
}

/// Probability that a moving vehicle randomly brakes, validated to `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct SlowdownProbability(f64);

impl SlowdownProbability {
    /// Deterministic driving: vehicles never brake at random.
    pub const NEVER: Self = Self(0.0);

    /// Validates a slowdown probability.
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidSlowdown(value))
        }
    }

    /// Retrieves the underlying probability.
    #[must_use]
    pub const fn get(&self) -> f64 {
        self.0
    }
}

/// Static dimensions of a circular road.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoadConfig {
    length: usize,
    max_speed: Speed,
}

impl RoadConfig {
    /// Creates a road description after validating its dimensions.
    pub fn new(length: usize, max_speed: Speed) -> Result<Self, ConfigError> {
        if length < MIN_ROAD_LENGTH {
            return Err(ConfigError::RoadTooShort { length });
        }
        if max_speed == Speed::ZERO {
            return Err(ConfigError::ZeroSpeedLimit);
        }

        Ok(Self { length, max_speed })
    }

    /// Number of cells on the road.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Highest speed any vehicle may reach.
    #[must_use]
    pub const fn max_speed(&self) -> Speed {
        self.max_speed
    }

    /// Number of cells covered by the measurement window.
    #[must_use]
    pub const fn window_length(&self) -> usize {
        self.length / 3
    }

    /// Last cell of the measurement window.
    #[must_use]
    pub const fn measure_point(&self) -> usize {
        self.length - 1
    }

    /// Resolves a density into a vehicle count that leaves at least one free
    /// cell on the road.
    pub fn vehicles_for(&self, density: Density) -> Result<usize, ConfigError> {
        let vehicles = density.vehicles_on(self.length);
        if vehicles >= self.length {
            return Err(ConfigError::DensityOutOfRange {
                vehicles,
                length: self.length,
            });
        }
        Ok(vehicles)
    }
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            length: CANONICAL_LENGTH,
            max_speed: CANONICAL_MAX_SPEED,
        }
    }
}

/// Local statistics captured over the measurement window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    /// Occupied fraction of the window, in vehicles per cell.
    pub local_density: f64,
    /// Mean speed of the vehicles inside the window, in cells per step.
    pub mean_velocity: f64,
    /// Product of density and mean velocity, in vehicles per step.
    pub flow: f64,
}

/// Read-only view into the ordered cells of the road.
#[derive(Clone, Copy, Debug)]
pub struct CellView<'a> {
    cells: &'a [Option<Speed>],
}

impl<'a> CellView<'a> {
    /// Captures a new cell view backed by the provided slice.
    #[must_use]
    pub fn new(cells: &'a [Option<Speed>]) -> Self {
        Self { cells }
    }

    /// Number of cells on the road.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Reports whether the view covers no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Speed of the vehicle in `index`, or `None` for an empty or unknown cell.
    #[must_use]
    pub fn speed(&self, index: usize) -> Option<Speed> {
        self.cells.get(index).copied().flatten()
    }

    /// Returns an iterator over all cells in road order.
    pub fn iter(&self) -> impl Iterator<Item = Option<Speed>> + 'a {
        self.cells.iter().copied()
    }

    /// Returns an iterator over occupied cells paired with their speeds.
    pub fn vehicles(&self) -> impl Iterator<Item = (usize, Speed)> + 'a {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(index, cell)| cell.map(|speed| (index, speed)))
    }

    /// Cells encoded as signed speeds with `-1` marking an empty cell.
    pub fn signed_speeds(&self) -> impl Iterator<Item = i16> + 'a {
        self.cells
            .iter()
            .map(|cell| cell.map_or(-1, |speed| i16::from(speed.get())))
    }

    /// Underlying cell slice.
    #[must_use]
    pub fn as_slice(&self) -> &'a [Option<Speed>] {
        self.cells
    }
}

/// Read-only view into a weighted frequency histogram.
#[derive(Clone, Copy, Debug)]
pub struct HistogramView<'a> {
    bins: &'a [f64],
}

impl<'a> HistogramView<'a> {
    /// Captures a new histogram view backed by the provided bins.
    #[must_use]
    pub fn new(bins: &'a [f64]) -> Self {
        Self { bins }
    }

    /// Number of bins in the histogram.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Reports whether the histogram has no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Frequency recorded for `bin`; bins outside the histogram read as zero.
    #[must_use]
    pub fn frequency(&self, bin: usize) -> f64 {
        self.bins.get(bin).copied().unwrap_or(0.0)
    }

    /// Returns an iterator over `(bin, frequency)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        self.bins.iter().copied().enumerate()
    }

    /// Sum of all frequencies.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.bins.iter().sum()
    }

    /// Underlying bin slice.
    #[must_use]
    pub fn as_slice(&self) -> &'a [f64] {
        self.bins
    }
}

/// Source of randomness injected into every stochastic operation.
///
/// The engine holds no random state of its own, so replaying the same source
/// against the same command sequence reproduces the same road.
pub trait RandomSource {
    /// Uniform draw from `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Uniform index in `0..bound`. Callers never pass a zero bound.
    fn index_below(&mut self, bound: usize) -> usize;
}

/// Deterministic [`RandomSource`] backed by any [`rand::Rng`].
///
/// Defaults to `ChaCha8Rng`, which produces the same stream on every platform.
#[derive(Clone, Debug)]
pub struct SimRng<R = ChaCha8Rng>(pub R);

impl SimRng {
    /// Creates a ChaCha-backed source seeded from the given `u64` value.
    #[must_use]
    pub fn from_seed_u64(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomSource for SimRng<R> {
    fn uniform(&mut self) -> f64 {
        self.0.gen::<f64>()
    }

    fn index_below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0, "index_below requires a non-empty range");
        self.0.gen_range(0..bound)
    }
}
