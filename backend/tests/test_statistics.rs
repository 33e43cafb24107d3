//! Statistics Tests
//!
//! Collectors on their own, fed by a Record component, and the reporting
//! accessors consumed by outer layers.

use proptest::prelude::*;
use simkernel_core::{
    Component, Counter, Create, Dispose, Model, Record, Simulation, StatisticsCollector, TimeUnit, TimeWeighted,
};

// ============================================================================
// Collectors
// ============================================================================

#[test]
fn test_ten_twenty_thirty() {
    let mut collector = StatisticsCollector::new();
    for value in [10.0, 20.0, 30.0] {
        collector.collect(value);
    }
    assert_eq!(collector.average(), 20.0);
    assert_eq!(collector.num_elements(), 3);
    assert_eq!(collector.min(), 10.0);
    assert_eq!(collector.max(), 30.0);
    assert_eq!(collector.variance(), 100.0);
    assert_eq!(collector.std_deviation(), 10.0);
    assert!((collector.variation_coef() - 0.5).abs() < 1e-12);
    // t(0.975, 2) = 4.303
    let half_width = collector.half_width_confidence_interval();
    assert!((half_width - 4.303 * 10.0 / 3f64.sqrt()).abs() < 0.01, "{half_width}");
}

#[test]
fn test_counter_goes_both_ways() {
    let mut counter = Counter::new();
    counter.increment(5);
    counter.decrement(2);
    assert_eq!(counter.value(), 3);
}

#[test]
fn test_time_weighted_level() {
    // level 0 on [0,2), 2 on [2,6), 1 on [6,10)
    let mut level = TimeWeighted::new(0.0, 0.0);
    level.update(2.0, 2.0);
    level.update(1.0, 6.0);
    assert_eq!(level.average(10.0), (0.0 * 2.0 + 2.0 * 4.0 + 1.0 * 4.0) / 10.0);
    assert_eq!(level.max(), 2.0);
}

// ============================================================================
// Record component
// ============================================================================

#[test]
fn test_record_collects_each_entity() {
    let mut model = Model::new("record");
    model.config.replication_length = 100.0;
    let stat = model.new_statistics("Arrival.Time").unwrap();
    let create = model
        .insert_component(
            "Create_1",
            Component::Create(
                Create::new("Part", "10", TimeUnit::Second)
                    .with_first_creation(10.0)
                    .with_max_creations(3),
            ),
        )
        .unwrap();
    let record = model
        .insert_component("Record_1", Component::Record(Record::new("tnow", stat)))
        .unwrap();
    let dispose = model.insert_component("Dispose_1", Component::Dispose(Dispose)).unwrap();
    model.connect(create, record).unwrap();
    model.connect(record, dispose).unwrap();

    let mut simulation = Simulation::new(model).unwrap();
    let report = simulation.start().unwrap();
    let summary = &report.replications()[0].statistics["Arrival.Time"];
    assert_eq!(summary.num_elements, 3);
    assert_eq!(summary.average, 20.0);
    assert_eq!(summary.min, 10.0);
    assert_eq!(summary.max, 30.0);

    // Dispose records time in system per entity type (zero here)
    let in_system = &report.replications()[0].statistics["Part.TimeInSystem"];
    assert_eq!(in_system.num_elements, 3);
    assert_eq!(in_system.max, 0.0);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_moments_are_consistent(values in prop::collection::vec(-1e6f64..1e6, 1..300)) {
        let mut collector = StatisticsCollector::new();
        for v in &values {
            collector.collect(*v);
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        prop_assert_eq!(collector.num_elements(), values.len() as u64);
        prop_assert!(collector.min() <= collector.average() + 1e-6);
        prop_assert!(collector.average() <= collector.max() + 1e-6);
        prop_assert!((collector.average() - mean).abs() <= 1e-6 * mean.abs().max(1.0));
        prop_assert!(collector.variance() >= 0.0);
        prop_assert!(collector.half_width_confidence_interval() >= 0.0);
    }
}
