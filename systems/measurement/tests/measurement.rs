use nasch_core::{
    Command, Density, Event, PlayMode, RoadConfig, SimRng, SlowdownProbability, Speed,
    WindowStats,
};
use nasch_system_measurement::{measure, Config, DiagramPoint, Measurement};
use nasch_world::{self as world, query, Road};

struct Harness {
    road: Road,
    rng: SimRng,
    measurement: Measurement,
}

impl Harness {
    fn new(seed: u64, density: f64, config: Config) -> Self {
        let mut rng = SimRng::from_seed_u64(seed);
        let density = Density::new(density).expect("valid density");
        let road = Road::new(RoadConfig::default(), density, &mut rng).expect("road builds");
        Self {
            road,
            rng,
            measurement: Measurement::new(config),
        }
    }

    fn run(&mut self, command: Command) -> Vec<Event> {
        let mut events = Vec::new();
        world::apply(&mut self.road, command, &mut self.rng, &mut events);

        let mut emitted = Vec::new();
        self.measurement.handle(
            &events,
            &[command],
            query::cell_view(&self.road),
            query::config(&self.road).max_speed(),
            &mut emitted,
        );
        events.extend(emitted);
        events
    }

    fn step(&mut self, target: f64) -> Vec<Event> {
        self.run(Command::Step {
            slowdown: SlowdownProbability::new(0.5).expect("valid probability"),
            target_density: Density::new(target).expect("valid density"),
        })
    }
}

fn measurements(events: &[Event]) -> Vec<WindowStats> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::MeasurementTaken { stats } => Some(*stats),
            _ => None,
        })
        .collect()
}

#[test]
fn samples_every_second_step_by_default() {
    let mut harness = Harness::new(17, 0.2, Config::default());
    let mut taken = Vec::new();

    for _ in 0..10 {
        taken.extend(measurements(&harness.step(0.2)));
    }

    assert_eq!(taken.len(), 5);
    assert_eq!(harness.measurement.diagram().len(), 5);
    assert_eq!(harness.measurement.last_stats(), taken.last().copied());

    let latest = measure(query::cell_view(&harness.road));
    assert_eq!(harness.measurement.last_stats(), Some(latest));
}

#[test]
fn measured_values_stay_in_physical_range() {
    let mut harness = Harness::new(5, 0.35, Config::new(1, 64));

    for _ in 0..100 {
        let _ = harness.step(0.35);
    }

    assert_eq!(harness.measurement.diagram().len(), 64);
    for point in harness.measurement.diagram().iter() {
        assert!((0.0..=1.0).contains(&point.density));
        assert!((0.0..=1.0).contains(&point.normalized_velocity));
        assert!(point.flow >= 0.0 && point.flow <= 5.0);
        assert!((point.flow - point.density * point.normalized_velocity * 5.0).abs() < 1e-9);
    }
}

#[test]
fn clear_diagrams_leaves_road_untouched() {
    let mut harness = Harness::new(23, 0.2, Config::new(1, 16));
    for _ in 0..4 {
        let _ = harness.step(0.2);
    }
    let before = query::cell_view(&harness.road).as_slice().to_vec();

    let events = harness.run(Command::ClearDiagrams);

    assert_eq!(events, vec![Event::DiagramsCleared]);
    assert!(harness.measurement.diagram().is_empty());
    assert_eq!(query::cell_view(&harness.road).as_slice(), before.as_slice());
    assert_eq!(query::tick(&harness.road), 4);
}

#[test]
fn paused_road_takes_no_measurements() {
    let mut harness = Harness::new(31, 0.2, Config::new(1, 16));
    let _ = harness.run(Command::SetPlayMode {
        mode: PlayMode::Paused,
    });

    for _ in 0..3 {
        let events = harness.step(0.2);
        assert!(measurements(&events).is_empty());
    }
    assert!(harness.measurement.last_stats().is_none());
}

#[test]
fn empty_road_measures_zero() {
    let mut harness = Harness::new(3, 0.3, Config::new(1, 16));
    let _ = harness.step(0.3);
    let events = harness.step(0.0);

    assert_eq!(measurements(&events), vec![WindowStats::default()]);
    assert_eq!(
        harness.measurement.diagram().iter().last(),
        Some(&DiagramPoint::default())
    );
}

#[test]
fn free_flow_window_reports_speed_limit() {
    let config = RoadConfig::new(30, Speed::new(5)).expect("valid road");
    let mut cells = vec![None; 30];
    cells[25] = Some(Speed::new(5));
    let road = Road::from_cells(config, &cells).expect("valid layout");

    let stats = measure(query::cell_view(&road));
    assert_eq!(stats.local_density, 0.1);
    assert_eq!(stats.mean_velocity, 5.0);
    assert_eq!(DiagramPoint::from_stats(stats, config.max_speed()).normalized_velocity, 1.0);
}

#[test]
fn diagram_points_serialise_with_field_names() {
    let point = DiagramPoint {
        density: 0.25,
        flow: 0.5,
        normalized_velocity: 0.4,
    };
    let json = serde_json::to_value(point).expect("serialises");
    assert_eq!(json["density"], 0.25);
    assert_eq!(json["flow"], 0.5);
    assert_eq!(json["normalized_velocity"], 0.4);
}
