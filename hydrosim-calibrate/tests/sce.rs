//! Shuffled complex evolution on objectives with a known optimum.

use hydrosim_calibrate::objectives::{ObjectiveEvaluator, ObjectiveScores};
use hydrosim_calibrate::sce::{
    CancellationToken, LogLevel, MaxEvaluations, OptimizerStatus, RelativeStdDev, SceOptimizer,
    SceParameters,
};
use hydrosim_calibrate::{CalibrationError, CalibrationResult};
use hydrosim_core::config::SystemConfig;
use hydrosim_core::errors::HydroError;
use hydrosim_core::parameters::{self, ApplyMode, Hypercube, ParameterSpace};
use indexmap::IndexMap;

/// Squared distance to (1, -2).
#[derive(Debug, Clone)]
struct Bowl;

impl Bowl {
    fn scores(parameters: &dyn ParameterSpace) -> CalibrationResult<ObjectiveScores> {
        let x = parameters.value("x")?;
        let y = parameters.value("y")?;
        let value = (x - 1.0).powi(2) + (y + 2.0).powi(2);
        ObjectiveScores::new(
            IndexMap::from([("distance".to_string(), value)]),
            parameters.to_hypercube()?,
            false,
        )
    }
}

impl ObjectiveEvaluator for Bowl {
    fn is_maximizable(&self) -> bool {
        false
    }

    fn score_names(&self) -> Vec<String> {
        vec!["distance".to_string()]
    }

    fn evaluate_score(&mut self) -> CalibrationResult<ObjectiveScores> {
        Self::scores(&template())
    }

    fn evaluate_score_for_parameters(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        Self::scores(parameters)
    }

    fn box_clone(&self) -> Box<dyn ObjectiveEvaluator> {
        Box::new(self.clone())
    }
}

/// The bowl over `y <= 0`, with a simulation that breaks down above.
#[derive(Debug, Clone)]
struct HalfBowl;

impl ObjectiveEvaluator for HalfBowl {
    fn is_maximizable(&self) -> bool {
        false
    }

    fn score_names(&self) -> Vec<String> {
        vec!["distance".to_string()]
    }

    fn evaluate_score(&mut self) -> CalibrationResult<ObjectiveScores> {
        self.evaluate_score_for_parameters(&template())
    }

    fn evaluate_score_for_parameters(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        if parameters.value("y")? > 0.0 {
            return Err(CalibrationError::Core(HydroError::simulation(
                "subarea.s1",
                "negative storage",
            )));
        }
        Bowl::scores(parameters)
    }

    fn box_clone(&self) -> Box<dyn ObjectiveEvaluator> {
        Box::new(self.clone())
    }
}

/// The bowl, for an evaluator that must stay on one thread.
#[derive(Debug, Clone)]
struct LocalBowl;

impl ObjectiveEvaluator for LocalBowl {
    fn is_maximizable(&self) -> bool {
        false
    }

    fn score_names(&self) -> Vec<String> {
        vec!["distance".to_string()]
    }

    fn evaluate_score(&mut self) -> CalibrationResult<ObjectiveScores> {
        Bowl::scores(&template())
    }

    fn evaluate_score_for_parameters(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        Bowl::scores(parameters)
    }

    fn box_clone(&self) -> Box<dyn ObjectiveEvaluator> {
        Box::new(self.clone())
    }

    fn supports_thread_safe_cloning(&self) -> bool {
        false
    }
}

fn template() -> Hypercube {
    let mut template = Hypercube::new().with_apply_mode(ApplyMode::None);
    template.add_parameter("x", -5.0, 5.0, 0.0).unwrap();
    template.add_parameter("y", -5.0, 5.0, 0.0).unwrap();
    template
}

fn optimizer(threads: usize) -> SceOptimizer {
    SceOptimizer::new(Box::new(Bowl), Box::new(template()))
        .with_parameters(SceParameters::for_free_parameters(2))
        .with_termination(Box::new(MaxEvaluations {
            max_evaluations: 3000,
        }))
        .with_config(SystemConfig::current().with_seed(42).with_max_threads(threads))
}

#[test]
fn converges_to_the_minimum() {
    let mut sce = optimizer(1);
    let result = sce.run().unwrap();

    assert!(result.status.is_terminal());
    assert_eq!(sce.status(), result.status);
    let best = result.best_parameters();
    assert!((best.value("x").unwrap() - 1.0).abs() < 0.01);
    assert!((best.value("y").unwrap() + 2.0).abs() < 0.01);
    assert!(result.best.value() < 1e-3);
    assert!(result.evaluations > 0);
    assert!(!sce.log().is_empty());
}

#[test]
fn seeded_runs_are_reproducible_across_thread_counts() {
    let serial = optimizer(1).run().unwrap();
    let parallel = optimizer(2).run().unwrap();
    let again = optimizer(2).run().unwrap();

    assert_eq!(parallel.best.value(), again.best.value());
    assert_eq!(serial.best.value(), parallel.best.value());
    assert_eq!(serial.evaluations, parallel.evaluations);
    assert_eq!(
        serial.best_parameters().values().unwrap(),
        parallel.best_parameters().values().unwrap()
    );
}

#[test]
fn stops_on_convergence() {
    let mut sce = SceOptimizer::new(Box::new(Bowl), Box::new(template()))
        .with_termination(Box::new(RelativeStdDev {
            tolerance: 1e-3,
            max_hours: 0.05,
        }))
        .with_config(SystemConfig::current().with_seed(7).with_max_threads(1));
    let result = sce.run().unwrap();
    assert!(matches!(
        result.status,
        OptimizerStatus::Converged | OptimizerStatus::MaxIterations
    ));
    assert!(result.best.value() < 0.1);
}

#[test]
fn cancelled_before_the_first_generation() {
    let token = CancellationToken::new();
    let mut sce = optimizer(1).with_cancellation_token(token.clone());
    token.cancel();
    let result = sce.run().unwrap();
    assert_eq!(result.status, OptimizerStatus::Cancelled);
    assert_eq!(result.generations, 0);
}

#[test]
fn rejects_a_space_without_free_parameters() {
    let mut fixed = Hypercube::new().with_apply_mode(ApplyMode::None);
    fixed.add_parameter("x", 1.0, 1.0, 1.0).unwrap();
    fixed.add_parameter("y", -2.0, -2.0, -2.0).unwrap();
    let mut sce = SceOptimizer::new(Box::new(Bowl), Box::new(fixed));
    assert!(sce.run().is_err());
    assert_eq!(sce.status(), OptimizerStatus::Configured);
}

#[test]
fn failed_simulations_are_scored_as_dominated() {
    let mut sce = SceOptimizer::new(Box::new(HalfBowl), Box::new(template()))
        .with_parameters(SceParameters::for_free_parameters(2))
        .with_termination(Box::new(MaxEvaluations {
            max_evaluations: 3000,
        }))
        .with_log_level(LogLevel::Detailed)
        .with_config(SystemConfig::current().with_seed(42).with_max_threads(2));
    let result = sce.run().unwrap();

    let best = result.best_parameters();
    assert!((best.value("x").unwrap() - 1.0).abs() < 0.05);
    assert!((best.value("y").unwrap() + 2.0).abs() < 0.05);
    let distances = sce.log().numeric_column("distance").unwrap();
    assert!(distances.iter().any(|d| *d == f64::INFINITY));
    assert!(result.best.value().is_finite());
}

#[test]
fn rejects_a_template_out_of_bounds() {
    // Loading skips the bound checks made on every write
    let json = r#"{
        "type": "Hypercube",
        "parameters": {
            "x": {"name": "x", "value": 7.0, "min": -5.0, "max": 5.0},
            "y": {"name": "y", "value": 0.0, "min": -5.0, "max": 5.0}
        },
        "apply_mode": "None"
    }"#;
    let loaded = parameters::from_json_str(json).unwrap();
    assert!(!loaded.is_within_bounds());

    let mut sce = SceOptimizer::new(Box::new(Bowl), loaded)
        .with_config(SystemConfig::current().with_seed(42).with_max_threads(1));
    assert!(matches!(sce.run(), Err(CalibrationError::Optimizer(_))));
    assert_eq!(sce.status(), OptimizerStatus::Configured);
    assert!(sce.log().is_empty());
}

#[test]
fn evaluators_bound_to_one_thread_run_serially() {
    let pooled = optimizer(2).run().unwrap();
    let serial = SceOptimizer::new(Box::new(LocalBowl), Box::new(template()))
        .with_parameters(SceParameters::for_free_parameters(2))
        .with_termination(Box::new(MaxEvaluations {
            max_evaluations: 3000,
        }))
        .with_config(SystemConfig::current().with_seed(42).with_max_threads(2))
        .run()
        .unwrap();

    assert_eq!(serial.best.value(), pooled.best.value());
    assert_eq!(serial.evaluations, pooled.evaluations);
    assert_eq!(
        serial.best_parameters().values().unwrap(),
        pooled.best_parameters().values().unwrap()
    );
}

#[test]
fn shuffle_count_caps_the_run() {
    let mut parameters = SceParameters::for_free_parameters(2);
    parameters.max_shuffles = 3;
    let mut sce = SceOptimizer::new(Box::new(Bowl), Box::new(template()))
        .with_parameters(parameters)
        .with_termination(Box::new(MaxEvaluations {
            max_evaluations: 1_000_000,
        }))
        .with_config(SystemConfig::current().with_seed(5).with_max_threads(1));
    let result = sce.run().unwrap();
    assert_eq!(result.status, OptimizerStatus::MaxIterations);
    assert_eq!(result.generations, 3);
}
