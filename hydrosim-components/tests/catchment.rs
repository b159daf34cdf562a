//! Simulations of a small catchment with the standard models.
//!
//! The subarea covers 86.4 km2, so on a daily step a runoff depth of 1 mm is a flow of 1 m3/s.

use chrono::NaiveDate;
use hydrosim_components::standard_registry;
use hydrosim_core::parameters::{
    feasible_muskingum_bounds, Hypercube, MuskingumConstraint, ParameterSpace,
};
use hydrosim_core::simulation::{Simulation, SimulationBuilder};
use hydrosim_core::timeseries::Instant;
use is_close::is_close;
use std::sync::Arc;

fn date(day: u32) -> Instant {
    NaiveDate::from_ymd_opt(2010, 1, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn catchment(runoff_model: &str) -> Simulation {
    let mut builder = SimulationBuilder::new(Arc::new(standard_registry()));
    builder
        .with_node("n1", "Headwater")
        .with_node("n2", "Outlet")
        .with_link("l1", "Reach", Some("n1"), Some("n2"))
        .with_subarea("s1", "Subarea", "l1", 86.4)
        .with_runoff_model(runoff_model)
        .with_routing_model("NoRouting")
        .with_span(date(1), date(20));
    builder.build().unwrap()
}

fn rainfall() -> Vec<f64> {
    (0..20)
        .map(|i| if i % 5 == 0 { 30.0 } else { 2.0 })
        .collect()
}

#[test]
fn gr4j_catchment_conserves_water() {
    let mut simulation = catchment("GR4J");
    simulation.set_parameter_value("x1", 200.0).unwrap();
    simulation.set_parameter_value("x4", 2.5).unwrap();
    let rain = rainfall();
    simulation.play_values("subarea.s1.P", &rain).unwrap();
    simulation.play_values("subarea.s1.E", &[3.0; 20]).unwrap();
    simulation.record("Catchment.StreamflowRate").unwrap();
    simulation.record("subarea.s1.S").unwrap();

    simulation.execute(true).unwrap();

    let flow = simulation
        .get_recorded("Catchment.StreamflowRate")
        .unwrap()
        .to_vec();
    assert_eq!(flow.len(), 20);
    assert!(flow.iter().all(|q| q.is_finite() && *q >= 0.0));
    assert!(flow.iter().sum::<f64>() > 0.0);
    // Without groundwater exchange the outflow cannot exceed the rainfall
    assert!(flow.iter().sum::<f64>() < rain.iter().sum::<f64>());

    let production = simulation.get_recorded("subarea.s1.S").unwrap().to_vec();
    assert!(production.iter().all(|s| (0.0..=200.0).contains(s)));
}

#[test]
fn gr4j_runs_are_repeatable_after_reset() {
    let mut simulation = catchment("GR4J");
    simulation.play_values("subarea.s1.P", &rainfall()).unwrap();
    simulation.play_values("subarea.s1.E", &[3.0; 20]).unwrap();
    simulation.record("node.n2.OutflowRate").unwrap();

    simulation.execute(true).unwrap();
    let first = simulation.get_recorded("node.n2.OutflowRate").unwrap().to_vec();
    simulation.execute(true).unwrap();
    let second = simulation.get_recorded("node.n2.OutflowRate").unwrap().to_vec();
    assert_eq!(first, second);
}

#[test]
fn preprocessor_scales_rainfall() {
    let mut simulation = catchment("UnitRunoff");
    simulation
        .set_preprocessing_model("InputScaling", &[])
        .unwrap();
    simulation
        .set_parameter_value("subarea.s1.preprocessor.RainfallFactor", 0.5)
        .unwrap();
    simulation
        .play_values("subarea.s1.preprocessor.P", &[10.0; 20])
        .unwrap();
    simulation.record("node.n2.OutflowRate").unwrap();

    simulation.execute(true).unwrap();

    let flow = simulation.get_recorded("node.n2.OutflowRate").unwrap().to_vec();
    assert!(flow.iter().all(|q| is_close!(*q, 5.0)));
}

#[test]
fn error_correction_moves_flow_towards_observations() {
    let mut simulation = catchment("UnitRunoff");
    simulation
        .set_error_correction_model("ERRIS", "node.n2")
        .unwrap();
    simulation.play_values("subarea.s1.P", &[10.0; 20]).unwrap();
    simulation
        .play_values("node.n2.ec.Observation", &[20.0; 20])
        .unwrap();
    simulation.record("node.n2.OutflowRate").unwrap();

    simulation.execute(true).unwrap();

    let flow = simulation.get_recorded("node.n2.OutflowRate").unwrap().to_vec();
    assert!(is_close!(flow[0], 10.0, rel_tol = 1e-6));
    assert!(flow[1..].iter().all(|q| *q > 10.0 && *q <= 20.0 + 1e-6));
}

#[test]
fn muskingum_attenuates_a_flood() {
    let mut simulation = catchment("UnitRunoff");
    simulation.set_routing_model("Muskingum", &[]).unwrap();
    let mut rain = vec![0.0; 20];
    rain[0] = 50.0;
    simulation.play_values("subarea.s1.P", &rain).unwrap();
    simulation.record("link.l1.OutflowRate").unwrap();

    simulation.execute(true).unwrap();

    let flow = simulation.get_recorded("link.l1.OutflowRate").unwrap().to_vec();
    let peak = flow.iter().cloned().fold(f64::MIN, f64::max);
    assert!(peak < 50.0);
    assert!(is_close!(flow.iter().sum::<f64>(), 50.0, rel_tol = 1e-2));
}

#[test]
fn muskingum_constraint_keeps_routing_stable() {
    let mut builder = SimulationBuilder::new(Arc::new(standard_registry()));
    builder
        .with_node("n1", "Headwater")
        .with_node("n2", "Junction")
        .with_node("n3", "Outlet")
        .with_link("l1", "Upper reach", Some("n1"), Some("n2"))
        .with_link("l2", "Lower reach", Some("n2"), Some("n3"))
        .with_subarea("s1", "Subarea", "l1", 86.4)
        .with_runoff_model("UnitRunoff")
        .with_routing_model("Muskingum")
        .with_span(date(1), date(20));
    let mut simulation = builder.build().unwrap();
    simulation.set_variable("link.l1.Length", 2.0).unwrap();
    simulation.set_variable("link.l2.Length", 8.0).unwrap();
    simulation.play_values("subarea.s1.P", &rainfall()).unwrap();
    simulation.record("node.n3.OutflowRate").unwrap();

    let bounds = feasible_muskingum_bounds(&simulation, 24.0).unwrap();
    assert_eq!(bounds.min_length, 2.0);
    assert_eq!(bounds.max_length, 8.0);

    let mut routing = Hypercube::new();
    routing.add_parameter("K", 1.0, 20.0, 2.0).unwrap();
    routing.add_parameter("X", 0.0, 0.4, 0.3).unwrap();
    // The unconstrained starting point cannot be solved
    let mut unstable = simulation.clone();
    routing.apply(&mut unstable).unwrap();
    assert!(unstable.execute(true).unwrap_err().is_numeric_failure());

    let constrained =
        MuskingumConstraint::new(Box::new(routing), 24.0, "K", "X", &simulation).unwrap();
    let k = constrained.get("K").unwrap();
    let x = constrained.get("X").unwrap();
    for k_value in [k.min, k.max] {
        for x_value in [x.min, x.max] {
            let mut corner = constrained.clone();
            corner.set_value("K", k_value).unwrap();
            corner.set_value("X", x_value).unwrap();
            corner.apply(&mut simulation).unwrap();
            simulation.execute(true).unwrap();
            let flow = simulation.get_recorded("node.n3.OutflowRate").unwrap().to_vec();
            assert!(flow.iter().all(|q| *q >= 0.0), "K = {}, X = {}", k_value, x_value);
        }
    }

    let mut norouting = catchment("UnitRunoff");
    assert!(MuskingumConstraint::new(
        Box::new(Hypercube::new()),
        24.0,
        "K",
        "X",
        &norouting
    )
    .is_err());
    norouting.set_routing_model("Muskingum", &[]).unwrap();
    // Links without an explicit length count as 1 km
    assert_eq!(feasible_muskingum_bounds(&norouting, 24.0).unwrap().max_length, 1.0);
}
