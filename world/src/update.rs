//! The Nagel–Schreckenberg update rule.
//!
//! A step runs three phases against the same road: the vehicle count is
//! matched to the target density, every vehicle picks its new speed from the
//! gap ahead (accelerate, brake, random slowdown), and finally every vehicle
//! moves by the speed chosen in the previous phase. Both scans start at the
//! first occupied cell and walk towards higher indices, stopping once they run
//! past the end of the array.

use log::debug;
use nasch_core::{Event, RandomSource, SlowdownProbability, Speed};

use crate::Road;

/// Adds or removes vehicles until the road holds `target` of them.
///
/// Removed vehicles are drawn uniformly from the occupied cells; inserted
/// vehicles land on uniformly drawn free cells travelling at the speed limit.
pub(crate) fn match_density<R>(
    road: &mut Road,
    target: usize,
    rng: &mut R,
    out_events: &mut Vec<Event>,
) where
    R: RandomSource + ?Sized,
{
    let current = road.vehicle_count();
    if target < current {
        let mut removed = 0;
        while removed < current - target && road.remove_random_vehicle(rng).is_some() {
            removed += 1;
        }
        debug!("removed {removed} vehicles to match {target}");
        out_events.push(Event::VehiclesRemoved { count: removed });
    } else if target > current {
        let speed = road.config.max_speed();
        let mut inserted = 0;
        while inserted < target - current && road.insert_random_vehicle(speed, rng).is_some() {
            inserted += 1;
        }
        debug!("inserted {inserted} vehicles to match {target}");
        out_events.push(Event::VehiclesInserted { count: inserted });
    }
}

/// First pass: assigns every vehicle its speed for this step and accumulates
/// the gap and velocity histograms.
pub(crate) fn compute_speeds<R>(road: &mut Road, slowdown: SlowdownProbability, rng: &mut R)
where
    R: RandomSource + ?Sized,
{
    let length = road.cells.len();
    let limit = road.config.max_speed();
    let weight = road.vehicle_weight();

    let Some(mut index) = road.first_vehicle() else {
        return;
    };

    while index < length {
        let gap = road.gap_ahead(index);
        let Some(current) = road.cells[index] else {
            debug_assert!(false, "scan landed on empty cell {index}");
            break;
        };

        if let Some(weight) = weight {
            road.gap_histogram[gap] += weight;
        }

        let mut speed = if gap > current.cells() {
            current.accelerate(limit)
        } else {
            Speed::within_gap(gap)
        };

        if speed > Speed::ZERO && rng.uniform() <= slowdown.get() {
            speed = speed.decelerate();
        }

        if let Some(weight) = weight {
            road.velocity_histogram[speed.cells()] += weight;
        }

        road.cells[index] = Some(speed);
        index += gap + 1;
    }
}

/// Second pass: moves every vehicle by the speed fixed in the first pass.
///
/// The scan resumes just past each vehicle's unwrapped destination, so cells
/// vacated behind it are skipped and a vehicle that wraps to the front of the
/// array is never visited a second time.
pub(crate) fn move_vehicles(road: &mut Road) {
    let length = road.cells.len();

    let Some(mut index) = road.first_vehicle() else {
        return;
    };

    while index < length {
        let Some(speed) = road.cells[index] else {
            debug_assert!(false, "scan landed on empty cell {index}");
            break;
        };

        let destination = index + speed.cells();
        road.relocate(index, destination % length);

        match road.next_vehicle_after(destination) {
            Some(next) => index = next,
            None => break,
        }
    }
}

/// Runs a full step once the vehicle target has been validated.
pub(crate) fn step<R>(
    road: &mut Road,
    slowdown: SlowdownProbability,
    target: usize,
    rng: &mut R,
    out_events: &mut Vec<Event>,
) where
    R: RandomSource + ?Sized,
{
    match_density(road, target, rng, out_events);
    road.reset_histograms();
    compute_speeds(road, slowdown, rng);
    move_vehicles(road);
    road.tick = road.tick.saturating_add(1);
}
