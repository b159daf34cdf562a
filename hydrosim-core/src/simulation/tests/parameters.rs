//! Applying parameter spaces to simulations.

use super::{builder, linear_catchment};
use crate::errors::HydroError;
use crate::example_components::LinearStore;
use crate::parameters::{
    ApplyMode, CompositeParameterSpace, FilteringParameterSpace, Hypercube, NameSelector,
    ParameterSpace, PrefixingParameterSpace, Transform, TransformParameterSpace,
};
use is_close::is_close;

fn scale(value: f64) -> Hypercube {
    let mut hypercube = Hypercube::new();
    hypercube.add_parameter("scale", 0.0, 10.0, value).unwrap();
    hypercube
}

#[test]
fn applied_values_change_the_outputs() {
    let mut simulation = linear_catchment();
    simulation.play_values("subarea.l1.P", &[2.0; 5]).unwrap();
    simulation.record("node.n3.OutflowRate").unwrap();

    scale(1.5).apply(&mut simulation).unwrap();
    assert_eq!(simulation.get_parameter_value("scale").unwrap(), 1.5);
    simulation.execute(true).unwrap();
    let outflow = simulation.get_recorded("node.n3.OutflowRate").unwrap();
    assert!(outflow.to_vec().iter().all(|v| is_close!(*v, 3.0)));
}

#[test]
fn unknown_names_fail_before_anything_is_written() {
    let mut simulation = linear_catchment();
    let mut hypercube = scale(4.0);
    hypercube.add_parameter("x1", 0.0, 10.0, 1.0).unwrap();

    let result = hypercube.apply(&mut simulation);
    assert!(matches!(result, Err(HydroError::Binding(name)) if name == "x1"));
    assert_eq!(simulation.get_parameter_value("scale").unwrap(), 1.0);

    let mut qualified = Hypercube::new();
    qualified
        .add_parameter("subarea.zz.scale", 0.0, 10.0, 1.0)
        .unwrap();
    assert!(matches!(
        qualified.apply(&mut simulation),
        Err(HydroError::Binding(_))
    ));
}

#[test]
fn statistic_parameters_are_not_applied() {
    let mut simulation = linear_catchment();
    let mut statistics = Hypercube::new().with_apply_mode(ApplyMode::None);
    statistics.add_parameter("sigma", 0.0, 10.0, 1.0).unwrap();
    statistics.apply(&mut simulation).unwrap();

    let mut composite = CompositeParameterSpace::new();
    composite.add(Box::new(scale(2.0))).unwrap();
    composite.add(Box::new(statistics)).unwrap();
    composite.apply(&mut simulation).unwrap();
    assert_eq!(simulation.get_parameter_value("scale").unwrap(), 2.0);
}

#[test]
fn prefixed_names_address_one_element() {
    let mut simulation = builder()
        .with_routing_model(LinearStore::ID)
        .build()
        .unwrap();
    let mut routing = Hypercube::new();
    routing.add_parameter("k", 0.0, 1.0, 0.2).unwrap();
    let prefixed = PrefixingParameterSpace::new("link.l2.", Box::new(routing));
    assert_eq!(prefixed.names(), vec!["link.l2.k"]);

    prefixed.apply(&mut simulation).unwrap();
    assert_eq!(simulation.get_variable("link.l2.k").unwrap(), 0.2);
    assert_eq!(simulation.get_variable("link.l1.k").unwrap(), 0.5);
}

#[test]
fn transformed_and_filtered_spaces_apply_base_values() {
    let mut simulation = linear_catchment();
    let mut transformed = TransformParameterSpace::new(Box::new(scale(1.0)));
    transformed
        .add_transform("log10_scale", "scale", Transform::Log10)
        .unwrap_err();

    let mut hypercube = Hypercube::new();
    hypercube.add_parameter("scale", 0.1, 10.0, 1.0).unwrap();
    let mut transformed = TransformParameterSpace::new(Box::new(hypercube));
    transformed
        .add_transform("log10_scale", "scale", Transform::Log10)
        .unwrap();
    transformed.set_value("log10_scale", 0.5).unwrap();

    let mut filtered = FilteringParameterSpace::new(Box::new(transformed));
    filtered
        .hide(&NameSelector::Names(vec!["log10_scale".to_string()]), true)
        .unwrap();
    assert!(filtered.is_empty());

    filtered.apply(&mut simulation).unwrap();
    assert!(is_close!(
        simulation.get_parameter_value("scale").unwrap(),
        10f64.sqrt()
    ));
}
