use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use nasch_core::{
    Command, Density, Event, PlayMode, RoadConfig, SimRng, SlowdownProbability,
};
use nasch_world::{self as world, query, Road};

#[test]
fn deterministic_replay_produces_identical_runs() {
    let first = replay(0x0ddb_a11, scripted_commands());
    let second = replay(0x0ddb_a11, scripted_commands());

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(first.tick, 120);
    assert_eq!(first.gap_histogram.len(), 300);
    assert_eq!(first.gap_histogram, second.gap_histogram);
}

#[test]
fn different_seeds_diverge() {
    let first = replay(1, scripted_commands());
    let second = replay(2, scripted_commands());

    assert_ne!(
        first.cells, second.cells,
        "independent seeds produced the same road"
    );
}

fn replay(seed: u64, commands: Vec<Command>) -> ReplayOutcome {
    let mut rng = SimRng::from_seed_u64(seed);
    let density = Density::new(0.2).expect("valid density");
    let mut road = Road::new(RoadConfig::default(), density, &mut rng).expect("road builds");
    let mut log = Vec::new();

    for command in commands {
        let mut events = Vec::new();
        world::apply(&mut road, command, &mut rng, &mut events);
        log.extend(events.iter().map(EventRecord::from));
    }

    let cells = query::cell_view(&road)
        .iter()
        .map(|cell| cell.map(|speed| speed.get()))
        .collect();
    let velocity_histogram = query::velocity_histogram(&road)
        .iter()
        .map(|(_, frequency)| frequency.to_bits())
        .collect();
    let gap_histogram = query::gap_histogram(&road)
        .iter()
        .map(|(_, frequency)| frequency.to_bits())
        .collect();

    ReplayOutcome {
        cells,
        velocity_histogram,
        gap_histogram,
        tick: query::tick(&road),
        events: log,
    }
}

fn scripted_commands() -> Vec<Command> {
    let slowdown = SlowdownProbability::new(0.5).expect("valid probability");
    let mut commands = Vec::new();

    for (steps, target) in [(40, 0.2), (30, 0.45), (10, 0.05)] {
        let target_density = Density::new(target).expect("valid density");
        commands.extend((0..steps).map(|_| Command::Step {
            slowdown,
            target_density,
        }));
    }

    commands.push(Command::SetPlayMode {
        mode: PlayMode::Paused,
    });
    commands.push(Command::Step {
        slowdown,
        target_density: Density::ZERO,
    });
    commands.push(Command::SetPlayMode {
        mode: PlayMode::Running,
    });

    let target_density = Density::new(0.3).expect("valid density");
    commands.extend((0..40).map(|_| Command::Step {
        slowdown,
        target_density,
    }));
    commands
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ReplayOutcome {
    cells: Vec<Option<u8>>,
    velocity_histogram: Vec<u64>,
    gap_histogram: Vec<u64>,
    tick: u64,
    events: Vec<EventRecord>,
}

impl ReplayOutcome {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum EventRecord {
    Removed(usize),
    Inserted(usize),
    Completed { tick: u64, vehicles: usize },
    Rejected(String),
    PlayMode(PlayMode),
    Other,
}

impl From<&Event> for EventRecord {
    fn from(event: &Event) -> Self {
        match event {
            Event::VehiclesRemoved { count } => Self::Removed(*count),
            Event::VehiclesInserted { count } => Self::Inserted(*count),
            Event::StepCompleted { tick, vehicles } => Self::Completed {
                tick: *tick,
                vehicles: *vehicles,
            },
            Event::StepRejected { reason } => Self::Rejected(reason.to_string()),
            Event::PlayModeChanged { mode } => Self::PlayMode(*mode),
            Event::MeasurementTaken { .. } | Event::DiagramsCleared => Self::Other,
        }
    }
}
