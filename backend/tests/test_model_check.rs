//! Model Check Tests
//!
//! Check collects every structural problem in one pass; errors stop a run
//! before it starts, warnings do not.

use simkernel_core::{
    Component, ComponentId, Create, Delay, Dispose, EndReason, Model, OrderRule, Process, Record, Release,
    SeizableItem, Seize, SelectionRule, Simulation, SimulationError, TimeUnit,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Create -> `middle` -> Dispose
fn around(model: &mut Model, middle: Component) -> ComponentId {
    let create = model
        .insert_component("Create_1", Component::Create(Create::new("Part", "5", TimeUnit::Second)))
        .unwrap();
    let id = model.insert_component("Middle", middle).unwrap();
    let dispose = model.insert_component("Dispose_1", Component::Dispose(Dispose)).unwrap();
    model.connect(create, id).unwrap();
    model.connect(id, dispose).unwrap();
    id
}

fn messages(model: &mut Model, component: &str) -> Vec<String> {
    model
        .check()
        .errors_for(component)
        .iter()
        .map(|issue| issue.message.clone())
        .collect()
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn test_all_errors_reported_together() {
    let mut model = Model::new("broken");
    model
        .insert_component("Lonely Create", Component::Create(Create::new("Part", "5", TimeUnit::Second)))
        .unwrap();
    let unbound = Record {
        expression: "tnow".to_string(),
        statistics: None,
    };
    let record = model.insert_component("Record_1", Component::Record(unbound)).unwrap();
    let delay = model
        .insert_component("Delay_1", Component::Delay(Delay::new("expo(", TimeUnit::Second)))
        .unwrap();
    let dispose = model.insert_component("Dispose_1", Component::Dispose(Dispose)).unwrap();
    model.connect(record, delay).unwrap();
    model.connect(delay, dispose).unwrap();

    let report = model.check();
    assert!(!report.is_ok());
    assert_eq!(report.errors_for("Lonely Create").len(), 1);
    assert_eq!(report.errors_for("Record_1").len(), 1);
    assert_eq!(report.errors_for("Delay_1").len(), 1);
    assert!(report.errors.len() >= 3);

    let text = report.to_string();
    assert!(text.contains("error: [Lonely Create]"));

    match Simulation::new(model) {
        Err(SimulationError::InvalidModel(failed)) => assert_eq!(failed, report),
        other => panic!("expected InvalidModel, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_warnings_do_not_block() {
    let mut model = Model::new("absorbing");
    let create = model
        .insert_component("Create_1", Component::Create(Create::new("Part", "5", TimeUnit::Second)))
        .unwrap();
    let delay = model
        .insert_component("Delay_1", Component::Delay(Delay::new("1", TimeUnit::Second)))
        .unwrap();
    model.connect(create, delay).unwrap();

    let report = model.validate().unwrap();
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].component, "Delay_1");

    let simulation = Simulation::new(model).unwrap();
    assert_eq!(simulation.check_report().warnings.len(), 1);
}

#[test]
fn test_unconnected_delay_absorbs_entities() {
    let mut model = Model::new("absorbing");
    model.config.replication_length = 100.0;
    let create = model
        .insert_component(
            "Create_1",
            Component::Create(Create::new("Part", "1", TimeUnit::Second).with_max_creations(3)),
        )
        .unwrap();
    let delay = model
        .insert_component("Delay_1", Component::Delay(Delay::new("2", TimeUnit::Second)))
        .unwrap();
    model.connect(create, delay).unwrap();

    let mut simulation = Simulation::new(model).unwrap();
    simulation.enable_event_log();
    simulation.start().unwrap();

    let log = simulation.event_log().unwrap();
    let absorbed = log.events_of_type("Absorbed");
    assert_eq!(absorbed.len(), 3);
    assert!(absorbed.iter().all(|event| event.component() == Some("Delay_1")));
    assert!(log.events_of_type("Fatal").is_empty());
    for entity in absorbed.iter().filter_map(|event| event.entity()) {
        assert!(simulation.entities().get(entity).is_none(), "{entity} still alive");
    }
    assert!(simulation.entities().is_empty());

    let report = simulation.report();
    assert_eq!(report.replications().len(), 1);
    assert_eq!(report.replications()[0].reason, EndReason::CalendarEmpty);
}

// ============================================================================
// Graph
// ============================================================================

#[test]
fn test_connection_to_unknown_component() {
    let mut model = Model::new("dangling");
    let id = around(&mut model, Component::Delay(Delay::new("1", TimeUnit::Second)));
    model
        .component_mut(id)
        .unwrap()
        .connections
        .insert(ComponentId::new(99));
    let errors = messages(&mut model, "Middle");
    assert!(errors.iter().any(|m| m.contains("unknown")), "{errors:?}");
}

#[test]
fn test_duplicate_names_rejected() {
    let mut model = Model::new("dupes");
    let m1 = model.new_resource("M1", 1).unwrap();
    model
        .insert_component(
            "P",
            Component::Process(Process::new(
                Seize::new(vec![SeizableItem::resource(m1)]),
                Delay::new("1", TimeUnit::Second),
            )),
        )
        .unwrap();
    for name in ["P", "P.Seize", "P.Release"] {
        let result = model.insert_component(name, Component::Dispose(Dispose));
        assert!(
            matches!(result, Err(SimulationError::DuplicateName { kind: "component", .. })),
            "{name} accepted twice"
        );
    }
    assert!(matches!(
        model.new_resource("M1", 2),
        Err(SimulationError::DuplicateName { .. })
    ));
}

// ============================================================================
// Requests
// ============================================================================

#[test]
fn test_set_release_needs_save_attribute() {
    let mut model = Model::new("set release");
    let m1 = model.new_resource("M1", 1).unwrap();
    let set = model.new_set("Machines", vec![m1]).unwrap();
    around(
        &mut model,
        Component::Release(Release::new(vec![SeizableItem::set(set, SelectionRule::SpecificMember)])),
    );
    let errors = messages(&mut model, "Middle");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("save attribute"));
}

#[test]
fn test_empty_set_is_an_error() {
    let mut model = Model::new("empty set");
    let set = model.new_set("Nobody", vec![]).unwrap();
    around(
        &mut model,
        Component::Seize(Seize::new(vec![SeizableItem::set(set, SelectionRule::PreferredOrder)])),
    );
    let errors = messages(&mut model, "Middle");
    assert!(errors.iter().any(|m| m.contains("'Nobody' has no members")), "{errors:?}");
}

#[test]
fn test_request_exceeding_capacity() {
    let mut model = Model::new("too big");
    let m1 = model.new_resource("M1", 2).unwrap();
    around(
        &mut model,
        Component::Seize(Seize::new(vec![SeizableItem::resource(m1).with_quantity("3")])),
    );
    let errors = messages(&mut model, "Middle");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("capacity 2"));

    // Items on one resource are summed across the list
    let mut model = Model::new("two halves");
    let m1 = model.new_resource("M1", 2).unwrap();
    around(
        &mut model,
        Component::Seize(Seize::new(vec![
            SeizableItem::resource(m1).with_quantity("2"),
            SeizableItem::resource(m1).with_quantity("1"),
        ])),
    );
    let errors = messages(&mut model, "Middle");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("requests 3 unit(s)"), "{errors:?}");

    let mut model = Model::new("fits");
    let m1 = model.new_resource("M1", 2).unwrap();
    around(
        &mut model,
        Component::Seize(Seize::new(vec![SeizableItem::resource(m1), SeizableItem::resource(m1)])),
    );
    assert!(messages(&mut model, "Middle").is_empty());
}

#[test]
fn test_process_request_total_exceeding_capacity() {
    let mut model = Model::new("doubled");
    let m1 = model.new_resource("M1", 1).unwrap();
    let seize = Seize::new(vec![SeizableItem::resource(m1), SeizableItem::resource(m1)]);
    around(
        &mut model,
        Component::Process(Process::new(seize, Delay::new("5", TimeUnit::Second))),
    );
    let errors = messages(&mut model, "Middle.Seize");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("capacity 1"));
    assert!(matches!(Simulation::new(model), Err(SimulationError::InvalidModel(_))));
}

#[test]
fn test_set_requests_sharing_save_attribute() {
    let mut model = Model::new("shared");
    let m1 = model.new_resource("M1", 1).unwrap();
    let m2 = model.new_resource("M2", 1).unwrap();
    let machines = model.new_set("Machines", vec![m1, m2]).unwrap();
    around(
        &mut model,
        Component::Seize(Seize::new(vec![
            SeizableItem::set(machines, SelectionRule::PreferredOrder).with_save_attribute("Machine"),
            SeizableItem::set(machines, SelectionRule::PreferredOrder).with_save_attribute("Machine"),
        ])),
    );
    let errors = messages(&mut model, "Middle");
    assert!(
        errors.iter().any(|m| m.contains("save attribute 'Machine' records more than one")),
        "{errors:?}"
    );
}

#[test]
fn test_wrong_definition_kind() {
    let mut model = Model::new("kinds");
    let queue = model.new_queue("Q", OrderRule::Fifo).unwrap();
    around(
        &mut model,
        Component::Seize(Seize::new(vec![SeizableItem::resource(queue)])),
    );
    let errors = messages(&mut model, "Middle");
    assert!(errors.iter().any(|m| m.contains("'Q' is a Queue, not a Resource")), "{errors:?}");
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_bad_termination_condition() {
    let mut model = Model::new("ends badly");
    around(&mut model, Component::Delay(Delay::new("1", TimeUnit::Second)));
    model.config.termination_condition = Some("tnow >=".to_string());
    let report = model.check();
    assert_eq!(report.errors_for("ends badly").len(), 1);
}

#[test]
fn test_invalid_config_rejected_before_check() {
    let mut model = Model::new("no time");
    around(&mut model, Component::Delay(Delay::new("1", TimeUnit::Second)));
    model.config.replication_length = 0.0;
    assert!(matches!(Simulation::new(model), Err(SimulationError::InvalidConfig(_))));
}
