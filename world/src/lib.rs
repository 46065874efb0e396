#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative road state for the NaSch traffic engine.
//!
//! The [`Road`] owns the circular cell array, the occupancy pools used for
//! density matching, and the weighted gap and velocity histograms. It is only
//! mutated through [`apply`]; everything else reads it through [`query`].

mod pool;
mod update;

use log::{trace, warn};
use nasch_core::{
    Command, ConfigError, Density, Event, PlayMode, RandomSource, RoadConfig, Speed,
    StepRejection,
};

use crate::pool::IndexPool;

/// Represents a single circular lane and the statistics of its latest step.
#[derive(Clone, Debug)]
pub struct Road {
    config: RoadConfig,
    cells: Vec<Option<Speed>>,
    occupied: IndexPool,
    free: IndexPool,
    gap_histogram: Vec<f64>,
    velocity_histogram: Vec<f64>,
    play_mode: PlayMode,
    tick: u64,
}

impl Road {
    /// Creates a road and scatters `floor(initial_density * length)` stationary
    /// vehicles over uniformly drawn cells.
    pub fn new<R>(
        config: RoadConfig,
        initial_density: Density,
        rng: &mut R,
    ) -> Result<Self, ConfigError>
    where
        R: RandomSource + ?Sized,
    {
        let vehicles = config.vehicles_for(initial_density)?;
        let mut road = Self::empty(config);
        for _ in 0..vehicles {
            if road.insert_random_vehicle(Speed::ZERO, rng).is_none() {
                break;
            }
        }
        debug_assert!(road.invariants_hold(), "freshly built road is inconsistent");
        Ok(road)
    }

    /// Creates a road from a prepared layout, one entry per cell.
    ///
    /// The layout must match the configured length, respect the speed limit,
    /// and leave at least one cell free.
    pub fn from_cells(config: RoadConfig, cells: &[Option<Speed>]) -> Result<Self, ConfigError> {
        if cells.len() != config.length() {
            return Err(ConfigError::CellCountMismatch {
                expected: config.length(),
                actual: cells.len(),
            });
        }

        let limit = config.max_speed();
        let mut road = Self::empty(config);
        for (index, cell) in cells.iter().enumerate() {
            let Some(speed) = *cell else {
                continue;
            };
            if speed > limit {
                return Err(ConfigError::SpeedAboveLimit {
                    index,
                    speed: speed.get(),
                    max_speed: limit.get(),
                });
            }
            road.occupy(index, speed);
        }

        if road.free.is_empty() {
            return Err(ConfigError::DensityOutOfRange {
                vehicles: road.vehicle_count(),
                length: config.length(),
            });
        }

        Ok(road)
    }

    fn empty(config: RoadConfig) -> Self {
        let length = config.length();
        Self {
            config,
            cells: vec![None; length],
            occupied: IndexPool::empty(length),
            free: IndexPool::full(length),
            gap_histogram: vec![0.0; length],
            velocity_histogram: vec![0.0; config.max_speed().cells() + 1],
            play_mode: PlayMode::Running,
            tick: 0,
        }
    }

    fn vehicle_count(&self) -> usize {
        self.occupied.len()
    }

    /// Histogram weight of a single vehicle, `None` while the road is empty.
    fn vehicle_weight(&self) -> Option<f64> {
        match self.vehicle_count() {
            0 => None,
            count => Some(1.0 / count as f64),
        }
    }

    fn occupy(&mut self, index: usize, speed: Speed) {
        self.cells[index] = Some(speed);
        let _ = self.free.remove(index);
        self.occupied.insert(index);
    }

    fn insert_random_vehicle<R>(&mut self, speed: Speed, rng: &mut R) -> Option<usize>
    where
        R: RandomSource + ?Sized,
    {
        let index = self.free.take_random(rng)?;
        self.cells[index] = Some(speed);
        self.occupied.insert(index);
        Some(index)
    }

    fn remove_random_vehicle<R>(&mut self, rng: &mut R) -> Option<usize>
    where
        R: RandomSource + ?Sized,
    {
        let index = self.occupied.take_random(rng)?;
        self.cells[index] = None;
        self.free.insert(index);
        Some(index)
    }

    fn relocate(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        debug_assert!(self.cells[to].is_none(), "vehicle moved onto occupied cell {to}");
        self.cells[to] = self.cells[from].take();
        self.occupied.replace(from, to);
        self.free.replace(to, from);
    }

    fn first_vehicle(&self) -> Option<usize> {
        self.cells.iter().position(Option::is_some)
    }

    /// Number of empty cells between `index` and the next vehicle ahead.
    ///
    /// A lone vehicle sees the whole rest of the ring, `length - 1` cells.
    fn gap_ahead(&self, index: usize) -> usize {
        let length = self.cells.len();
        (1..length)
            .map(|offset| (index + offset) % length)
            .take_while(|&cell| self.cells[cell].is_none())
            .count()
    }

    /// Unwrapped position of the first vehicle strictly after `position`.
    fn next_vehicle_after(&self, position: usize) -> Option<usize> {
        let length = self.cells.len();
        (position + 1..=position + length).find(|&cell| self.cells[cell % length].is_some())
    }

    fn reset_histograms(&mut self) {
        self.gap_histogram.fill(0.0);
        self.velocity_histogram.fill(0.0);
    }

    fn invariants_hold(&self) -> bool {
        let limit = self.config.max_speed();
        let occupied_cells = self.cells.iter().filter(|cell| cell.is_some()).count();

        self.cells.len() == self.config.length()
            && self.cells.iter().flatten().all(|speed| *speed <= limit)
            && self.occupied.len() == occupied_cells
            && self.free.len() == self.cells.len() - occupied_cells
            && self.occupied.iter().all(|index| self.cells[index].is_some())
            && self.free.iter().all(|index| self.cells[index].is_none())
            && self.occupied.iter().all(|index| !self.free.contains(index))
    }
}

/// Applies the provided command to the road, mutating state deterministically.
pub fn apply<R>(road: &mut Road, command: Command, rng: &mut R, out_events: &mut Vec<Event>)
where
    R: RandomSource + ?Sized,
{
    match command {
        Command::Step {
            slowdown,
            target_density,
        } => {
            if road.play_mode == PlayMode::Paused {
                warn!("step rejected: simulation is paused");
                out_events.push(Event::StepRejected {
                    reason: StepRejection::Paused,
                });
                return;
            }

            let target = match road.config.vehicles_for(target_density) {
                Ok(target) => target,
                Err(error) => {
                    warn!("step rejected: {error}");
                    out_events.push(Event::StepRejected {
                        reason: error.into(),
                    });
                    return;
                }
            };

            update::step(road, slowdown, target, rng, out_events);
            debug_assert!(road.invariants_hold(), "road inconsistent after step");
            trace!(
                "step {} completed with {} vehicles",
                road.tick,
                road.vehicle_count()
            );
            out_events.push(Event::StepCompleted {
                tick: road.tick,
                vehicles: road.vehicle_count(),
            });
        }
        Command::SetPlayMode { mode } => {
            if road.play_mode != mode {
                road.play_mode = mode;
                out_events.push(Event::PlayModeChanged { mode });
            }
        }
        Command::ClearDiagrams => {}
    }
}

/// Query functions that provide read-only access to the road state.
pub mod query {
    use super::Road;
    use nasch_core::{CellView, HistogramView, PlayMode, RoadConfig};

    /// Dimensions the road was created with.
    #[must_use]
    pub fn config(road: &Road) -> RoadConfig {
        road.config
    }

    /// Captures a read-only view of every cell in road order.
    #[must_use]
    pub fn cell_view(road: &Road) -> CellView<'_> {
        CellView::new(&road.cells)
    }

    /// Velocity frequencies accumulated during the latest step, one bin per
    /// speed from zero to the limit.
    #[must_use]
    pub fn velocity_histogram(road: &Road) -> HistogramView<'_> {
        HistogramView::new(&road.velocity_histogram)
    }

    /// Gap frequencies accumulated during the latest step, one bin per gap
    /// length from zero to `length - 1`.
    #[must_use]
    pub fn gap_histogram(road: &Road) -> HistogramView<'_> {
        HistogramView::new(&road.gap_histogram)
    }

    /// Number of vehicles currently on the road.
    #[must_use]
    pub fn vehicle_count(road: &Road) -> usize {
        road.vehicle_count()
    }

    /// Histogram weight contributed by each vehicle, `None` on an empty road.
    #[must_use]
    pub fn vehicle_weight(road: &Road) -> Option<f64> {
        road.vehicle_weight()
    }

    /// Number of steps completed since the road was created.
    #[must_use]
    pub fn tick(road: &Road) -> u64 {
        road.tick
    }

    /// Mode the driver should honour when deciding whether to step.
    #[must_use]
    pub fn play_mode(road: &Road) -> PlayMode {
        road.play_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nasch_core::{SimRng, SlowdownProbability};

    fn config(length: usize) -> RoadConfig {
        RoadConfig::new(length, Speed::new(5)).expect("valid road")
    }

    #[test]
    fn new_places_stationary_vehicles() {
        let mut rng = SimRng::from_seed_u64(11);
        let density = Density::new(0.2).expect("valid density");
        let road = Road::new(RoadConfig::default(), density, &mut rng).expect("road builds");

        assert_eq!(query::vehicle_count(&road), 60);
        assert!(query::cell_view(&road)
            .vehicles()
            .all(|(_, speed)| speed == Speed::ZERO));
        assert!(road.invariants_hold());
        assert_eq!(query::tick(&road), 0);
        assert_eq!(query::play_mode(&road), PlayMode::Running);
    }

    #[test]
    fn empty_road_has_no_weight() {
        let mut rng = SimRng::from_seed_u64(3);
        let road = Road::new(config(10), Density::ZERO, &mut rng).expect("road builds");
        assert_eq!(query::vehicle_count(&road), 0);
        assert_eq!(query::vehicle_weight(&road), None);
    }

    #[test]
    fn from_cells_validates_layout() {
        assert_eq!(
            Road::from_cells(config(4), &[None, None]).err(),
            Some(ConfigError::CellCountMismatch {
                expected: 4,
                actual: 2
            })
        );
        assert_eq!(
            Road::from_cells(config(3), &[Some(Speed::new(6)), None, None]).err(),
            Some(ConfigError::SpeedAboveLimit {
                index: 0,
                speed: 6,
                max_speed: 5
            })
        );
        assert_eq!(
            Road::from_cells(config(3), &[Some(Speed::ZERO); 3]).err(),
            Some(ConfigError::DensityOutOfRange {
                vehicles: 3,
                length: 3
            })
        );
    }

    #[test]
    fn lone_vehicle_sees_whole_ring() {
        let mut cells = vec![None; 10];
        cells[7] = Some(Speed::ZERO);
        let road = Road::from_cells(config(10), &cells).expect("valid layout");
        assert_eq!(road.gap_ahead(7), 9);
        assert_eq!(road.next_vehicle_after(7), Some(17));
    }

    #[test]
    fn relocate_keeps_pools_in_sync() {
        let mut road =
            Road::from_cells(config(5), &[Some(Speed::new(2)), None, None, None, None])
                .expect("valid layout");
        road.relocate(0, 2);
        assert_eq!(road.cells[2], Some(Speed::new(2)));
        assert!(road.cells[0].is_none());
        assert!(road.invariants_hold());
    }

    #[test]
    fn paused_road_rejects_steps() {
        let mut rng = SimRng::from_seed_u64(5);
        let density = Density::new(0.3).expect("valid density");
        let mut road = Road::new(config(20), density, &mut rng).expect("road builds");
        let before = query::cell_view(&road).as_slice().to_vec();

        let mut events = Vec::new();
        apply(
            &mut road,
            Command::SetPlayMode {
                mode: PlayMode::Paused,
            },
            &mut rng,
            &mut events,
        );
        apply(
            &mut road,
            Command::Step {
                slowdown: SlowdownProbability::NEVER,
                target_density: density,
            },
            &mut rng,
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::PlayModeChanged {
                    mode: PlayMode::Paused
                },
                Event::StepRejected {
                    reason: StepRejection::Paused
                },
            ]
        );
        assert_eq!(query::cell_view(&road).as_slice(), before.as_slice());
        assert_eq!(query::tick(&road), 0);
    }

    #[test]
    fn repeated_play_mode_is_silent() {
        let mut rng = SimRng::from_seed_u64(5);
        let mut road = Road::new(config(10), Density::ZERO, &mut rng).expect("road builds");
        let mut events = Vec::new();
        apply(
            &mut road,
            Command::SetPlayMode {
                mode: PlayMode::Running,
            },
            &mut rng,
            &mut events,
        );
        apply(&mut road, Command::ClearDiagrams, &mut rng, &mut events);
        assert!(events.is_empty());
    }
}
