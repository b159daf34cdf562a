//! Termination criteria, checked once per generation.

use super::OptimizerStatus;
use crate::{CalibrationError, CalibrationResult};
use std::fmt::Debug;
use std::time::Duration;

/// State of a run at the end of a generation.
#[derive(Debug, Clone)]
pub struct Progress<'a> {
    pub generation: usize,
    pub evaluations: usize,
    pub elapsed: Duration,
    /// Cost of the best point, lower is better.
    pub best_cost: f64,
    /// Values of the free parameters of every point in the population.
    pub points: &'a [Vec<f64>],
    /// Feasible range `max - min` of every free parameter.
    pub ranges: &'a [f64],
}

/// A rule deciding when an optimiser stops.
pub trait TerminationCondition: Debug + Send + Sync {
    /// The terminal status if the run should stop.
    fn check(&mut self, progress: &Progress) -> Option<OptimizerStatus>;

    /// Forget what was learned from a previous run.
    fn reset(&mut self) {}

    fn box_clone(&self) -> Box<dyn TerminationCondition>;
}

impl Clone for Box<dyn TerminationCondition> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

fn hours(duration: Duration) -> f64 {
    duration.as_secs_f64() / 3600.0
}

/// Stop once a number of objective evaluations has been spent.
#[derive(Debug, Clone)]
pub struct MaxEvaluations {
    pub max_evaluations: usize,
}

impl Default for MaxEvaluations {
    fn default() -> Self {
        Self {
            max_evaluations: 1000,
        }
    }
}

impl TerminationCondition for MaxEvaluations {
    fn check(&mut self, progress: &Progress) -> Option<OptimizerStatus> {
        (progress.evaluations >= self.max_evaluations).then_some(OptimizerStatus::MaxIterations)
    }

    fn box_clone(&self) -> Box<dyn TerminationCondition> {
        Box::new(self.clone())
    }
}

/// Stop after a wall-clock budget.
#[derive(Debug, Clone)]
pub struct MaxRuntime {
    pub max_hours: f64,
}

impl TerminationCondition for MaxRuntime {
    fn check(&mut self, progress: &Progress) -> Option<OptimizerStatus> {
        (hours(progress.elapsed) >= self.max_hours).then_some(OptimizerStatus::MaxRuntime)
    }

    fn box_clone(&self) -> Box<dyn TerminationCondition> {
        Box::new(self.clone())
    }
}

/// Stop when the best cost improved by less than `tolerance` over the last `patience`
/// generations, or after `max_hours`.
#[derive(Debug, Clone)]
pub struct Marginal {
    pub tolerance: f64,
    pub patience: usize,
    pub max_hours: f64,
    history: Vec<f64>,
}

impl Marginal {
    pub fn new(tolerance: f64, patience: usize, max_hours: f64) -> Self {
        Self {
            tolerance,
            patience: patience.max(1),
            max_hours,
            history: Vec::new(),
        }
    }
}

impl Default for Marginal {
    fn default() -> Self {
        Self::new(1e-6, 10, 0.05)
    }
}

impl TerminationCondition for Marginal {
    fn check(&mut self, progress: &Progress) -> Option<OptimizerStatus> {
        self.history.push(progress.best_cost);
        if hours(progress.elapsed) >= self.max_hours {
            return Some(OptimizerStatus::MaxRuntime);
        }
        let n = self.history.len();
        if n <= self.patience {
            return None;
        }
        let improvement = self.history[n - 1 - self.patience] - self.history[n - 1];
        // Infinite costs give a NaN improvement, which never converges
        (improvement < self.tolerance).then_some(OptimizerStatus::Converged)
    }

    fn reset(&mut self) {
        self.history.clear();
    }

    fn box_clone(&self) -> Box<dyn TerminationCondition> {
        Box::new(self.clone())
    }
}

/// Stop when, for every parameter, the standard deviation of the population relative to
/// the feasible range falls below `tolerance`, or after `max_hours`.
#[derive(Debug, Clone)]
pub struct RelativeStdDev {
    pub tolerance: f64,
    pub max_hours: f64,
}

impl Default for RelativeStdDev {
    fn default() -> Self {
        Self {
            tolerance: 0.002,
            max_hours: 0.05,
        }
    }
}

/// Largest standard deviation of a parameter relative to its range.
pub fn relative_dispersion(points: &[Vec<f64>], ranges: &[f64]) -> f64 {
    if points.is_empty() {
        return f64::NAN;
    }
    let n = points.len() as f64;
    ranges
        .iter()
        .enumerate()
        .map(|(j, range)| {
            let mean = points.iter().map(|p| p[j]).sum::<f64>() / n;
            let variance = points.iter().map(|p| (p[j] - mean).powi(2)).sum::<f64>() / n;
            if *range > 0.0 {
                variance.sqrt() / range
            } else {
                0.0
            }
        })
        .fold(0.0, f64::max)
}

impl TerminationCondition for RelativeStdDev {
    fn check(&mut self, progress: &Progress) -> Option<OptimizerStatus> {
        if hours(progress.elapsed) >= self.max_hours {
            return Some(OptimizerStatus::MaxRuntime);
        }
        (relative_dispersion(progress.points, progress.ranges) < self.tolerance)
            .then_some(OptimizerStatus::Converged)
    }

    fn box_clone(&self) -> Box<dyn TerminationCondition> {
        Box::new(self.clone())
    }
}

/// Stops as soon as any of its conditions does.
#[derive(Debug, Clone, Default)]
pub struct CompositeTermination {
    conditions: Vec<Box<dyn TerminationCondition>>,
}

impl CompositeTermination {
    pub fn new(conditions: Vec<Box<dyn TerminationCondition>>) -> Self {
        Self { conditions }
    }

    pub fn add(&mut self, condition: Box<dyn TerminationCondition>) {
        self.conditions.push(condition);
    }
}

impl TerminationCondition for CompositeTermination {
    fn check(&mut self, progress: &Progress) -> Option<OptimizerStatus> {
        // Every condition sees every generation, so stateful ones keep their history
        let mut status = None;
        for condition in self.conditions.iter_mut() {
            let result = condition.check(progress);
            if status.is_none() {
                status = result;
            }
        }
        status
    }

    fn reset(&mut self) {
        self.conditions.iter_mut().for_each(|c| c.reset());
    }

    fn box_clone(&self) -> Box<dyn TerminationCondition> {
        Box::new(self.clone())
    }
}

pub fn known_termination_ids() -> Vec<&'static str> {
    vec![
        "maximum evaluations",
        "max runtime",
        "marginal",
        "relative standard deviation",
        "composite",
    ]
}

fn argument<T: std::str::FromStr>(
    kind: &str,
    arguments: &[&str],
    index: usize,
    default: Option<T>,
) -> CalibrationResult<T> {
    match arguments.get(index).map(|a| a.trim()) {
        Some(text) if !text.is_empty() => text.parse().map_err(|_| {
            CalibrationError::Configuration(format!(
                "argument {} of '{}' termination is not valid: '{}'",
                index + 1,
                kind,
                text
            ))
        }),
        _ => default.ok_or_else(|| {
            CalibrationError::Configuration(format!(
                "'{}' termination requires argument {}",
                kind,
                index + 1
            ))
        }),
    }
}

/// Create a termination condition by name.
///
/// Arguments are positional:
/// - `"maximum evaluations"`: count (default 1000)
/// - `"max runtime"`: hours
/// - `"marginal"`: tolerance, patience, hours (defaults 1e-6, 10, 0.05)
/// - `"relative standard deviation"`: tolerance, hours (defaults 0.002, 0.05)
/// - `"composite"`: one `"<name>:<comma separated arguments>"` per condition
pub fn create_termination(
    kind: &str,
    arguments: &[&str],
) -> CalibrationResult<Box<dyn TerminationCondition>> {
    let kind = kind.trim().to_lowercase();
    let condition: Box<dyn TerminationCondition> = match kind.as_str() {
        "maximum evaluations" | "max evaluations" => Box::new(MaxEvaluations {
            max_evaluations: argument(&kind, arguments, 0, Some(1000))?,
        }),
        "max runtime" => Box::new(MaxRuntime {
            max_hours: argument(&kind, arguments, 0, None)?,
        }),
        "marginal" => Box::new(Marginal::new(
            argument(&kind, arguments, 0, Some(1e-6))?,
            argument(&kind, arguments, 1, Some(10))?,
            argument(&kind, arguments, 2, Some(0.05))?,
        )),
        "relative standard deviation" => Box::new(RelativeStdDev {
            tolerance: argument(&kind, arguments, 0, Some(0.002))?,
            max_hours: argument(&kind, arguments, 1, Some(0.05))?,
        }),
        "composite" => {
            let mut composite = CompositeTermination::default();
            for &definition in arguments {
                let (name, rest) = definition.split_once(':').unwrap_or((definition, ""));
                let inner: Vec<&str> = rest.split(',').filter(|a| !a.trim().is_empty()).collect();
                composite.add(create_termination(name, &inner)?);
            }
            Box::new(composite)
        }
        _ => {
            return Err(CalibrationError::Configuration(format!(
                "unknown termination '{}', expected one of {:?}",
                kind,
                known_termination_ids()
            )))
        }
    };
    Ok(condition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress<'a>(generation: usize, evaluations: usize, best_cost: f64) -> Progress<'a> {
        Progress {
            generation,
            evaluations,
            elapsed: Duration::from_secs(1),
            best_cost,
            points: &[],
            ranges: &[],
        }
    }

    #[test]
    fn max_evaluations() {
        let mut condition = MaxEvaluations::default();
        assert_eq!(condition.check(&progress(1, 999, 0.0)), None);
        assert_eq!(
            condition.check(&progress(2, 1000, 0.0)),
            Some(OptimizerStatus::MaxIterations)
        );
    }

    #[test]
    fn max_runtime() {
        let mut condition = MaxRuntime { max_hours: 0.0 };
        assert_eq!(
            condition.check(&progress(1, 1, 0.0)),
            Some(OptimizerStatus::MaxRuntime)
        );
    }

    #[test]
    fn marginal_waits_for_patience() {
        let mut condition = Marginal::new(1e-3, 2, 1.0);
        assert_eq!(condition.check(&progress(1, 10, 5.0)), None);
        assert_eq!(condition.check(&progress(2, 20, 4.0)), None);
        assert_eq!(condition.check(&progress(3, 30, 3.0)), None);
        assert_eq!(condition.check(&progress(4, 40, 3.0)), None);
        assert_eq!(
            condition.check(&progress(5, 50, 3.0)),
            Some(OptimizerStatus::Converged)
        );

        condition.reset();
        assert_eq!(condition.check(&progress(1, 10, 3.0)), None);
    }

    #[test]
    fn marginal_never_converges_on_failures() {
        let mut condition = Marginal::new(1e-3, 1, 1.0);
        condition.check(&progress(1, 10, f64::INFINITY));
        assert_eq!(condition.check(&progress(2, 20, f64::INFINITY)), None);
    }

    #[test]
    fn dispersion_of_a_collapsed_population() {
        let points = vec![vec![1.0, 5.0], vec![1.0, 5.0], vec![1.0, 5.001]];
        let ranges = [10.0, 10.0];
        let dispersion = relative_dispersion(&points, &ranges);
        assert!(dispersion > 0.0 && dispersion < 0.002);

        let mut condition = RelativeStdDev::default();
        let p = Progress {
            points: &points,
            ranges: &ranges,
            ..progress(1, 1, 0.0)
        };
        assert_eq!(condition.check(&p), Some(OptimizerStatus::Converged));

        let spread = vec![vec![0.0, 0.0], vec![10.0, 10.0]];
        assert_eq!(relative_dispersion(&spread, &ranges), 0.5);
    }

    #[test]
    fn factory() {
        assert!(create_termination("Maximum Evaluations", &["50"]).is_ok());
        assert!(create_termination("max runtime", &[]).is_err());
        assert!(create_termination("marginal", &["abc"]).is_err());
        assert!(create_termination("forever", &[]).is_err());

        let mut composite =
            create_termination("composite", &["maximum evaluations:50", "max runtime:1"]).unwrap();
        assert_eq!(composite.check(&progress(1, 10, 0.0)), None);
        assert_eq!(
            composite.check(&progress(2, 60, 0.0)),
            Some(OptimizerStatus::MaxIterations)
        );
    }
}
