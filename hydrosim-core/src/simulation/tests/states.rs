//! Model state snapshots, memory states and state initialisers.

use super::{builder, linear_catchment};
use crate::component::ComponentKind;
use crate::example_components::LinearStore;
use crate::parameters::{
    ElementSelector, Hypercube, ParameterSpace, ScalingParameterSpace, StateInitParameterSpace,
};
use crate::state::{MemoryStates, ModelState};
use is_close::is_close;

#[test]
fn snapshots_restore_state_without_rerunning() {
    let mut simulation = builder()
        .with_routing_model(LinearStore::ID)
        .build()
        .unwrap();
    simulation.play_values("subarea.l1.P", &[4.0; 5]).unwrap();
    simulation.record("node.n3.OutflowRate").unwrap();
    simulation.execute(true).unwrap();
    let snapshot = simulation.snapshot_states();
    assert_eq!(
        snapshot
            .get("subarea.l1", ComponentKind::Runoff)
            .unwrap()
            .get("StepCount"),
        Some(5.0)
    );

    // Continuing from the end of the first run
    let mut continued = simulation.clone();
    continued.execute(false).unwrap();
    let expected = continued.get_recorded("node.n3.OutflowRate").unwrap();

    simulation.reset_states().unwrap();
    assert_eq!(simulation.get_variable("link.l1.Storage").unwrap(), 0.0);
    simulation.apply_states(&snapshot).unwrap();
    simulation.execute(false).unwrap();
    let restored = simulation.get_recorded("node.n3.OutflowRate").unwrap();
    assert_eq!(restored, expected);
}

#[test]
fn snapshots_carry_element_flows() {
    let mut simulation = builder()
        .with_routing_model(LinearStore::ID)
        .build()
        .unwrap();
    simulation.play_values("subarea.l1.P", &[4.0, 8.0, 0.0, 2.0, 6.0]).unwrap();
    simulation.execute(true).unwrap();
    let outflow = simulation.get_variable("link.l1.OutflowRate").unwrap();
    let lateral = simulation.get_variable("link.l1.LateralInflowRate").unwrap();
    assert!(outflow > 0.0);
    let snapshot = simulation.snapshot_states();
    assert_eq!(snapshot.flows("link.l1").unwrap().outflow, outflow);

    let mut restored = simulation.clone();
    restored.reset_states().unwrap();
    assert_eq!(restored.get_variable("link.l1.OutflowRate").unwrap(), 0.0);
    restored.apply_states(&snapshot).unwrap();
    assert_eq!(restored.get_variable("link.l1.OutflowRate").unwrap(), outflow);
    assert_eq!(
        restored.get_variable("link.l1.LateralInflowRate").unwrap(),
        lateral
    );
    assert_eq!(
        restored.get_variable("node.n3.OutflowRate").unwrap(),
        simulation.get_variable("node.n3.OutflowRate").unwrap()
    );

    // A restored run is indistinguishable from the continued one, from its first step
    restored.record("link.l1.OutflowRate").unwrap();
    simulation.record("link.l1.OutflowRate").unwrap();
    restored.execute(false).unwrap();
    simulation.execute(false).unwrap();
    assert_eq!(
        restored.get_recorded("link.l1.OutflowRate").unwrap(),
        simulation.get_recorded("link.l1.OutflowRate").unwrap()
    );

    let mut unknown = MemoryStates::new();
    unknown.insert_flows("link.zz", Default::default());
    assert!(restored.apply_states(&unknown).is_err());
}

#[test]
fn memory_states_are_applied_on_reset() {
    let mut simulation = builder()
        .with_routing_model(LinearStore::ID)
        .build()
        .unwrap();
    simulation.play_values("subarea.l1.P", &[0.0; 5]).unwrap();
    simulation.record("link.l1.OutflowRate").unwrap();

    let mut states = MemoryStates::new();
    states.insert(
        "link.l1",
        ComponentKind::Routing,
        ModelState::new().with("Storage", 16.0),
    );
    simulation.set_memory_states(states);
    simulation.execute(true).unwrap();
    assert_eq!(
        simulation.get_recorded("link.l1.OutflowRate").unwrap().to_vec(),
        vec![8.0, 4.0, 2.0, 1.0, 0.5]
    );

    simulation.clear_memory_states();
    simulation.execute(true).unwrap();
    assert!(simulation
        .get_recorded("link.l1.OutflowRate")
        .unwrap()
        .to_vec()
        .iter()
        .all(|v| *v == 0.0));
}

#[test]
fn states_for_missing_elements_are_rejected() {
    let mut simulation = linear_catchment();
    let mut states = MemoryStates::new();
    states.insert(
        "link.l1",
        ComponentKind::Routing,
        ModelState::new().with("Storage", 1.0),
    );
    // l1 has no routing model
    assert!(simulation.apply_states(&states).is_err());

    let mut states = MemoryStates::new();
    states.insert("link.zz", ComponentKind::Routing, ModelState::new());
    assert!(simulation.apply_states(&states).is_err());
}

#[test]
fn state_initialisers_run_after_every_reset() {
    let mut simulation = linear_catchment();
    simulation.play_values("subarea.l1.P", &[1.0; 5]).unwrap();

    let mut initial = Hypercube::new();
    initial
        .add_parameter("subarea.l1.StepCount", 0.0, 1000.0, 100.0)
        .unwrap();
    let initializer = StateInitParameterSpace::new("initial counts", Box::new(initial));
    initializer.apply(&mut simulation).unwrap();
    assert_eq!(simulation.state_initializer_ids(), vec!["initial counts"]);
    // Registering does not touch the current state
    assert_eq!(simulation.get_variable("subarea.l1.StepCount").unwrap(), 0.0);

    simulation.execute(true).unwrap();
    assert_eq!(simulation.get_variable("subarea.l1.StepCount").unwrap(), 105.0);
    simulation.execute(true).unwrap();
    assert_eq!(simulation.get_variable("subarea.l1.StepCount").unwrap(), 105.0);

    simulation.remove_state_initializer("initial counts").unwrap();
    simulation.execute(true).unwrap();
    assert_eq!(simulation.get_variable("subarea.l1.StepCount").unwrap(), 5.0);
}

#[test]
fn scaled_initial_states() {
    let mut simulation = builder()
        .with_routing_model(LinearStore::ID)
        .build()
        .unwrap();
    simulation.set_parameter_value("k", 0.25).unwrap();

    let mut scaling = ScalingParameterSpace::new(ElementSelector::Links);
    scaling
        .add_linear_scaling("storage_factor", "Storage", "k", 0.0, 100.0, 40.0, 2.0)
        .unwrap();
    scaling.apply(&mut simulation).unwrap();
    // 40 * 0.25 + 2
    assert!(is_close!(simulation.get_variable("link.l1.Storage").unwrap(), 12.0));
    assert!(is_close!(simulation.get_variable("link.l2.Storage").unwrap(), 12.0));

    let mut bad = ScalingParameterSpace::new(ElementSelector::Links);
    bad.add_linear_scaling("f", "Storage", "x1", 0.0, 1.0, 0.5, 0.0)
        .unwrap();
    assert!(bad.apply(&mut simulation).is_err());
    assert!(ElementSelector::from_name("each subarea").is_ok());
    assert!(ElementSelector::from_name("reservoirs").is_err());
}
