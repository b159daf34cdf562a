//! Objectives on a one-subarea catchment whose flow is the scaled rainfall.
//!
//! The subarea covers 86.4 km2, so on a daily step a runoff depth of 1 mm is a flow of 1 m3/s.
//! Observations are half the rainfall: a rainfall factor of 0.5 fits them exactly.

use chrono::NaiveDate;
use hydrosim_calibrate::objectives::{
    CompositeObjective, MultisiteObjective, ObjectiveEvaluator, SingleObjective, SiteDefinition,
};
use hydrosim_calibrate::sce::{MaxEvaluations, SceOptimizer, SceParameters};
use hydrosim_components::standard_registry;
use hydrosim_core::config::SystemConfig;
use hydrosim_core::parameters::{Hypercube, ParameterSpace};
use hydrosim_core::simulation::{Simulation, SimulationBuilder};
use hydrosim_core::timeseries::{Instant, TimeSeries, TimeStep};
use is_close::is_close;
use std::sync::Arc;

const FACTOR: &str = "subarea.s1.preprocessor.RainfallFactor";
const DAYS: usize = 30;

fn date(day: u32) -> Instant {
    NaiveDate::from_ymd_opt(2010, 1, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn rainfall() -> Vec<f64> {
    (0..DAYS)
        .map(|i| match i % 7 {
            0 => 25.0,
            1 => 12.0,
            3 => 4.0,
            _ => 1.0,
        })
        .collect()
}

fn observed() -> TimeSeries {
    TimeSeries::from_vec(
        date(1),
        TimeStep::DAILY,
        rainfall().iter().map(|p| 0.5 * p).collect(),
    )
}

fn catchment() -> Simulation {
    let mut builder = SimulationBuilder::new(Arc::new(standard_registry()));
    builder
        .with_node("n1", "Headwater")
        .with_node("n2", "Outlet")
        .with_link("l1", "Reach", Some("n1"), Some("n2"))
        .with_subarea("s1", "Subarea", "l1", 86.4)
        .with_runoff_model("UnitRunoff")
        .with_routing_model("NoRouting")
        .with_span(date(1), date(DAYS as u32));
    let mut simulation = builder.build().unwrap();
    simulation
        .set_preprocessing_model("InputScaling", &[])
        .unwrap();
    simulation
        .play_values("subarea.s1.preprocessor.P", &rainfall())
        .unwrap();
    simulation
}

fn factor(value: f64) -> Hypercube {
    let mut parameters = Hypercube::new();
    parameters.add_parameter(FACTOR, 0.0, 2.0, value).unwrap();
    parameters
}

#[test]
fn single_objective_scores_the_fit() {
    let mut objective =
        SingleObjective::new(catchment(), "node.n2.OutflowRate", &observed(), "NSE", None)
            .unwrap();
    assert!(objective.is_maximizable());

    let exact = objective
        .evaluate_score_for_parameters(&factor(0.5))
        .unwrap();
    assert!(is_close!(exact.value(), 1.0, abs_tol = 1e-9));
    assert_eq!(exact.parameters().value(FACTOR).unwrap(), 0.5);

    let high = objective
        .evaluate_score_for_parameters(&factor(1.0))
        .unwrap();
    assert!(high.value() < exact.value());

    // The evaluator keeps the last parameters applied
    let current = objective.evaluate_score().unwrap();
    assert_eq!(current.value(), high.value());
    assert_eq!(
        objective.simulation().get_parameter_value(FACTOR).unwrap(),
        1.0
    );
}

#[test]
fn single_objective_over_a_window() {
    let mut observed = observed();
    // Wrong observations outside the window do not count
    observed.set(0, 1000.0).unwrap();
    let mut objective = SingleObjective::new(
        catchment(),
        "Catchment.StreamflowRate",
        &observed,
        "RMSE",
        Some((date(2), date(DAYS as u32))),
    )
    .unwrap();
    assert!(!objective.is_maximizable());
    let scores = objective
        .evaluate_score_for_parameters(&factor(0.5))
        .unwrap();
    assert!(is_close!(scores.value(), 0.0, abs_tol = 1e-9));

    assert!(SingleObjective::new(
        catchment(),
        "Catchment.StreamflowRate",
        &observed,
        "RMSE",
        Some((date(2), date(31))),
    )
    .is_err());
    assert!(
        SingleObjective::new(catchment(), "node.n2.OutflowRate", &observed, "R2D2", None).is_err()
    );
}

#[test]
fn multisite_objective_mixes_sites() {
    let sites = vec![
        SiteDefinition {
            id: "outlet".to_string(),
            variable_id: "node.n2.OutflowRate".to_string(),
            statistic: "NSE".to_string(),
            observed: observed(),
            window: None,
            weight: 3.0,
        },
        SiteDefinition {
            id: "catchment".to_string(),
            variable_id: "Catchment.StreamflowRate".to_string(),
            statistic: "KGE".to_string(),
            observed: observed(),
            window: Some((date(5), date(25))),
            weight: 1.0,
        },
    ];
    let mut objective = MultisiteObjective::new(catchment(), sites, "weighted-average").unwrap();

    let exact = objective
        .evaluate_score_for_parameters(&factor(0.5))
        .unwrap();
    assert!(is_close!(exact.value(), 1.0, abs_tol = 1e-9));
    assert_eq!(exact.scores().len(), 3);
    assert!(is_close!(exact.score("outlet").unwrap(), 1.0, abs_tol = 1e-9));

    let off = objective
        .evaluate_score_for_parameters(&factor(0.8))
        .unwrap();
    let nse = off.score("outlet").unwrap();
    let kge = off.score("catchment").unwrap();
    assert!(is_close!(off.value(), (3.0 * nse + kge) / 4.0, rel_tol = 1e-9));

    let mixed_directions = vec![
        SiteDefinition {
            id: "a".to_string(),
            variable_id: "node.n2.OutflowRate".to_string(),
            statistic: "NSE".to_string(),
            observed: observed(),
            window: None,
            weight: 1.0,
        },
        SiteDefinition {
            id: "b".to_string(),
            variable_id: "node.n2.OutflowRate".to_string(),
            statistic: "RMSE".to_string(),
            observed: observed(),
            window: None,
            weight: 1.0,
        },
    ];
    assert!(MultisiteObjective::new(catchment(), mixed_directions, "weighted-average").is_err());
}

#[test]
fn composite_objective_weights_components() {
    let nse = SingleObjective::new(catchment(), "node.n2.OutflowRate", &observed(), "NSE", None)
        .unwrap();
    let kge = SingleObjective::new(catchment(), "node.n2.OutflowRate", &observed(), "KGE", None)
        .unwrap();
    let rmse = SingleObjective::new(catchment(), "node.n2.OutflowRate", &observed(), "RMSE", None)
        .unwrap();
    let mut composite = CompositeObjective::new("fit");
    composite.add("nse", 1.0, Box::new(nse)).unwrap();
    composite.add("kge", 2.0, Box::new(kge)).unwrap();
    assert!(composite.add("nse", 1.0, Box::new(rmse.clone())).is_err());
    assert!(composite.add("rmse", 1.0, Box::new(rmse)).is_err());
    assert_eq!(composite.score_names(), vec!["fit", "nse", "kge"]);

    let scores = composite
        .evaluate_score_for_parameters(&factor(0.7))
        .unwrap();
    let expected = (scores.score("nse").unwrap() + 2.0 * scores.score("kge").unwrap()) / 3.0;
    assert!(is_close!(scores.value(), expected, rel_tol = 1e-9));
    assert_eq!(scores.primary_name(), "fit");
}

#[test]
fn sce_recovers_the_rainfall_factor() {
    let objective =
        SingleObjective::new(catchment(), "node.n2.OutflowRate", &observed(), "NSE", None)
            .unwrap();
    let mut sce = SceOptimizer::new(Box::new(objective), Box::new(factor(1.0)))
        .with_parameters(SceParameters::for_free_parameters(1))
        .with_termination(Box::new(MaxEvaluations {
            max_evaluations: 400,
        }))
        .with_config(SystemConfig::current().with_seed(3).with_max_threads(2));
    let result = sce.run().unwrap();

    let best = result.best_parameters().value(FACTOR).unwrap();
    assert!((best - 0.5).abs() < 0.01, "best factor {}", best);
    assert!(result.best.value() > 0.99);
}
