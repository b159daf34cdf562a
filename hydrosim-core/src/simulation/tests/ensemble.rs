use super::{builder, date};
use crate::example_components::LinearStore;
use crate::simulation::{EnsembleForecastSimulation, Simulation};
use ndarray::Array2;

fn ten_days(routing: bool) -> Simulation {
    let mut builder = builder();
    builder.with_span(date(2020, 1, 1), date(2020, 1, 10));
    if routing {
        builder.with_routing_model(LinearStore::ID);
    }
    let mut simulation = builder.build().unwrap();
    simulation.play_values("subarea.l1.P", &[4.0; 10]).unwrap();
    simulation
}

/// Member `m` receives `m + 1` mm at every lead time.
fn member_inputs(members: usize, lead_time: usize, forecasts: usize) -> Vec<Array2<f64>> {
    (0..forecasts)
        .map(|_| Array2::from_shape_fn((members, lead_time), |(m, _)| (m + 1) as f64))
        .collect()
}

#[test]
fn members_are_driven_by_their_own_inputs() {
    let template = ten_days(false);
    let mut ensemble =
        EnsembleForecastSimulation::new(&template, date(2020, 1, 3), 3, 4, 2, 2).unwrap();
    ensemble
        .play_ensemble_input("subarea.l1.P", member_inputs(3, 4, 2))
        .unwrap();
    ensemble.record("node.n3.OutflowRate").unwrap();
    ensemble.execute().unwrap();

    for forecast in 0..2 {
        let result = ensemble
            .get_ensemble_recorded("node.n3.OutflowRate", forecast)
            .unwrap();
        assert_eq!(result.dim(), (3, 4));
        for ((member, _), value) in result.indexed_iter() {
            assert_eq!(*value, (member + 1) as f64);
        }
    }
    assert_eq!(
        ensemble
            .get_recorded_value("node.n3.OutflowRate", 1, 3, 2)
            .unwrap(),
        3.0
    );
    assert!(ensemble
        .get_recorded_value("node.n3.OutflowRate", 1, 4, 2)
        .is_err());
    assert!(ensemble
        .get_ensemble_recorded("node.n3.OutflowRate", 2)
        .is_err());

    let single = ensemble
        .get_single_recorded("node.n3.OutflowRate", 1, 0)
        .unwrap();
    assert_eq!(single.start(), date(2020, 1, 5));
    assert_eq!(single.to_vec(), vec![1.0; 4]);
    assert_eq!(ensemble.forecast_origin(1).unwrap(), date(2020, 1, 5));
}

#[test]
fn forecasts_start_from_the_warmed_up_state() {
    let template = ten_days(true);
    let mut ensemble =
        EnsembleForecastSimulation::new(&template, date(2020, 1, 3), 2, 2, 1, 0).unwrap();
    let zeros = vec![Array2::zeros((2, 2))];
    ensemble.play_ensemble_input("subarea.l1.P", zeros).unwrap();
    ensemble.record("link.l1.OutflowRate").unwrap();
    ensemble.execute().unwrap();

    // Two warm-up days of 4 mm leave 3 units in the store of l1
    let result = ensemble
        .get_ensemble_recorded("link.l1.OutflowRate", 0)
        .unwrap();
    for member in 0..2 {
        assert_eq!(result.row(member).to_vec(), vec![1.5, 0.75]);
    }
}

#[test]
fn invalid_ensembles_are_rejected() {
    let template = ten_days(false);
    assert!(EnsembleForecastSimulation::new(&template, date(2020, 1, 3), 0, 4, 1, 1).is_err());
    assert!(EnsembleForecastSimulation::new(&template, date(2020, 1, 3), 2, 4, 2, 0).is_err());
    assert!(EnsembleForecastSimulation::new(&template, date(2019, 12, 1), 2, 4, 1, 1).is_err());

    let mut ensemble =
        EnsembleForecastSimulation::new(&template, date(2020, 1, 3), 2, 4, 1, 1).unwrap();
    let wrong_shape = vec![Array2::zeros((4, 2))];
    assert!(ensemble
        .play_ensemble_input("subarea.l1.P", wrong_shape)
        .is_err());
    assert!(ensemble.record("node.n9.OutflowRate").is_err());
}

#[test]
fn every_recorded_variable_fills_each_member() {
    let template = ten_days(true);
    let mut ensemble =
        EnsembleForecastSimulation::new(&template, date(2020, 1, 3), 3, 3, 2, 1).unwrap();
    ensemble
        .play_ensemble_input("subarea.l1.P", member_inputs(3, 3, 2))
        .unwrap();
    ensemble.record("link.l1.OutflowRate").unwrap();
    ensemble.record("subarea.l1.OutflowRate").unwrap();
    ensemble.execute().unwrap();

    for forecast in 0..2 {
        for variable in ["link.l1.OutflowRate", "subarea.l1.OutflowRate"] {
            let result = ensemble.get_ensemble_recorded(variable, forecast).unwrap();
            assert_eq!(result.dim(), (3, 3));
            assert!(result.iter().all(|v| v.is_finite()), "{} {}", variable, forecast);
        }
        let runoff = ensemble
            .get_ensemble_recorded("subarea.l1.OutflowRate", forecast)
            .unwrap();
        assert_eq!(runoff.row(2).to_vec(), vec![3.0; 3]);
    }
}
