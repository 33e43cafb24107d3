//! Invariant Tests
//!
//! Properties checked after every single step of randomly parameterised
//! runs:
//! - busy units never exceed capacity
//! - busy units equal the units entities hold
//! - waiting entities hold nothing
//! - the clock never runs backwards within a replication

use proptest::prelude::*;
use simkernel_core::{
    AllocationType, Component, Create, DataDefinition, Delay, Dispose, Model, Process, SeizableItem, Seize,
    SelectionRule, Simulation, StepOutcome, TimeUnit,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn random_shop(seed: u64, capacities: (u32, u32), operators: u32, transfer: bool) -> Model {
    let mut model = Model::new("random shop");
    model.config.replication_length = 120.0;
    model.config.number_of_replications = 2;
    model.config.rng_seed = seed;

    let m1 = model.new_resource("M1", capacities.0).unwrap();
    let m2 = model.new_resource("M2", capacities.1).unwrap();
    let operator = model.new_resource("Operator", operators).unwrap();
    let machines = model.new_set("Machines", vec![m1, m2]).unwrap();
    let allocation = if transfer {
        AllocationType::Transfer
    } else {
        AllocationType::Direct
    };

    let create = model
        .insert_component("Arrivals", Component::Create(Create::new("Part", "expo(2)", TimeUnit::Second)))
        .unwrap();
    let setup = model
        .insert_component(
            "Setup",
            Component::Process(Process::new(
                Seize::new(vec![SeizableItem::resource(operator)]).with_allocation_type(allocation),
                Delay::new("unif(0.5, 1.5)", TimeUnit::Second),
            )),
        )
        .unwrap();
    let machining = model
        .insert_component(
            "Machining",
            Component::Process(Process::new(
                Seize::new(vec![
                    SeizableItem::set(machines, SelectionRule::LargestRemainingCapacity).with_quantity("unif(1, 2)"),
                    SeizableItem::resource(operator),
                ])
                .with_allocation_type(allocation),
                Delay::new("expo(3)", TimeUnit::Second),
            )),
        )
        .unwrap();
    let dispose = model.insert_component("Exit", Component::Dispose(Dispose)).unwrap();
    model.connect(create, setup).unwrap();
    model.connect(setup, machining).unwrap();
    model.connect(machining, dispose).unwrap();
    model
}

fn assert_consistent(simulation: &Simulation) -> Result<(), TestCaseError> {
    let data = simulation.model().data();
    let held = simulation.holdings().totals();
    for (id, definition) in data.iter() {
        match definition {
            DataDefinition::Resource(resource) => {
                prop_assert!(resource.busy() <= resource.capacity(), "{} over capacity", resource.name());
                prop_assert_eq!(
                    resource.busy(),
                    held.get(&id).copied().unwrap_or(0),
                    "{} busy differs from holdings",
                    resource.name()
                );
                prop_assert!(!resource.in_release_window());
            }
            DataDefinition::Queue(queue) => {
                for waiting in queue.entries() {
                    prop_assert!(simulation.holdings().of(waiting.entity).is_empty());
                    prop_assert!(simulation.entities().get(waiting.entity).is_some());
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_state_is_consistent_after_every_step(
        seed in any::<u64>(),
        capacities in (2u32..4, 2u32..4),
        operators in 1u32..3,
        transfer in any::<bool>(),
    ) {
        let mut simulation = Simulation::new(random_shop(seed, capacities, operators, transfer)).unwrap();
        let mut last = 0.0;
        let mut steps = 0;
        while !simulation.is_finished() {
            match simulation.step().unwrap() {
                StepOutcome::Dispatched { time, .. } => {
                    prop_assert!(time >= last, "clock went from {} to {}", last, time);
                    last = time;
                }
                StepOutcome::ReplicationEnded { .. } => last = 0.0,
            }
            assert_consistent(&simulation)?;
            steps += 1;
            prop_assert!(steps < 100_000, "run does not end");
        }

        for summary in simulation.report().replications() {
            for (name, s) in &summary.statistics {
                if s.num_elements > 0 {
                    prop_assert!(s.min <= s.average + 1e-9, "{}: min above average", name);
                    prop_assert!(s.average <= s.max + 1e-9, "{}: average above max", name);
                }
                prop_assert!(s.variance >= 0.0);
            }
            let busy = &summary.statistics["Operator.NumberBusy"];
            prop_assert!(busy.average <= operators as f64 + 1e-9);
            prop_assert!(summary.counters["Operator.SeizedUnits"] >= summary.counters["Operator.ReleasedUnits"]);
        }
    }

    #[test]
    fn prop_same_seed_same_digest(seed in any::<u64>()) {
        let digest = |seed: u64| {
            let mut simulation = Simulation::new(random_shop(seed, (2, 3), 2, false)).unwrap();
            simulation.enable_event_log();
            simulation.start().unwrap();
            simulation.event_log().unwrap().digest()
        };
        prop_assert_eq!(digest(seed), digest(seed));
    }
}
