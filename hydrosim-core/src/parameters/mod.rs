//! Parameter spaces: named, bounded scalar parameters applied to simulations.
//!
//! A [`Hypercube`] stores parameters. Decorators wrap one inner space and present a different
//! view of it while delegating storage:
//!
//! - [`PrefixingParameterSpace`] renames every parameter with a prefix.
//! - [`FilteringParameterSpace`] hides a subset of the parameters.
//! - [`TransformParameterSpace`] exposes transformed parameters, e.g. `log10_x4` for `x4`.
//! - [`StateInitParameterSpace`] registers its inner space as a state initialiser.
//!
//! [`CompositeParameterSpace`] joins independent spaces and [`ScalingParameterSpace`] derives
//! states from other element variables. [`MuskingumConstraint`] narrows routing parameters to
//! values that are stable on every reach. Decorators may be stacked; each holds its inner space
//! so the order of the stack is explicit.
//!
//! Values are checked against their bounds on every write. An out of range write fails and
//! leaves the previous value in place.

mod aggregation;
mod composite;
mod filtering;
mod hypercube;
mod muskingum;
mod prefixing;
mod scaling;
mod state_init;
mod transform;

pub use aggregation::{aggregate_parameter_spaces, known_aggregation_strategies, AggregationStrategy};
pub use composite::CompositeParameterSpace;
pub use filtering::{FilteringParameterSpace, NameSelector};
pub use hypercube::{ApplyMode, Hypercube};
pub use muskingum::{feasible_muskingum_bounds, MuskingumConstraint, MuskingumFeasibility};
pub use prefixing::PrefixingParameterSpace;
pub use scaling::{known_selector_types, ElementSelector, LinearScaling, ScalingParameterSpace};
pub use state_init::StateInitParameterSpace;
pub use transform::{known_transforms, Transform, TransformParameterSpace};

use crate::errors::{HydroError, HydroResult};
use crate::simulation::Simulation;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

/// A named scalar with its bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl Parameter {
    /// Create a parameter, checking `min <= value <= max`.
    pub fn new(name: &str, value: f64, min: f64, max: f64) -> HydroResult<Self> {
        let parameter = Self {
            name: name.to_string(),
            value,
            min,
            max,
        };
        if !(min <= max) {
            return Err(HydroError::Configuration(format!(
                "parameter '{}' has a minimum {} above its maximum {}",
                name, min, max
            )));
        }
        parameter.check(value)?;
        Ok(parameter)
    }

    pub fn is_within_bounds(&self) -> bool {
        self.min <= self.value && self.value <= self.max
    }

    /// Check that `value` may be assigned to the parameter.
    pub fn check(&self, value: f64) -> HydroResult<()> {
        if !(self.min <= value && value <= self.max) {
            return Err(HydroError::BoundViolation {
                name: self.name.clone(),
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// A set of named, bounded parameters that can be applied to a simulation.
#[typetag::serde(tag = "type")]
pub trait ParameterSpace: Debug + Send + Sync {
    /// Names of the visible parameters, in order.
    fn names(&self) -> Vec<String>;

    fn get(&self, name: &str) -> HydroResult<Parameter>;

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()>;

    /// Set the lower bound. Fails if the current value would fall below it.
    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()>;

    /// Set the upper bound. Fails if the current value would exceed it.
    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()>;

    fn box_clone(&self) -> Box<dyn ParameterSpace>;

    /// Insert or replace the definition of a parameter.
    fn set_definition(&mut self, name: &str, min: f64, max: f64, value: f64) -> HydroResult<()> {
        let _ = (min, max, value);
        Err(HydroError::Usage(format!(
            "parameter '{}' cannot be defined on this parameter space",
            name
        )))
    }

    /// Whether the values are written to the simulation when applied.
    ///
    /// Spaces holding statistic or error-model parameters are never applied.
    fn applies_to_model(&self) -> bool {
        true
    }

    /// Write every parameter value to the matching variables of the simulation.
    ///
    /// All names are resolved before any value is written.
    fn apply(&self, simulation: &mut Simulation) -> HydroResult<()> {
        if !self.applies_to_model() {
            return Ok(());
        }
        apply_parameters(&self.parameters()?, simulation)
    }

    /// Whether clones of this space may be used from several threads at once.
    fn supports_thread_safe_cloning(&self) -> bool {
        true
    }

    fn len(&self) -> usize {
        self.names().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|n| n == name)
    }

    fn name_at(&self, index: usize) -> HydroResult<String> {
        self.names().into_iter().nth(index).ok_or_else(|| {
            HydroError::UnknownParameter(format!("index {} of {}", index, self.len()))
        })
    }

    fn value(&self, name: &str) -> HydroResult<f64> {
        Ok(self.get(name)?.value)
    }

    fn min_value(&self, name: &str) -> HydroResult<f64> {
        Ok(self.get(name)?.min)
    }

    fn max_value(&self, name: &str) -> HydroResult<f64> {
        Ok(self.get(name)?.max)
    }

    fn parameters(&self) -> HydroResult<Vec<Parameter>> {
        self.names().iter().map(|n| self.get(n)).collect()
    }

    fn values(&self) -> HydroResult<Vec<f64>> {
        Ok(self.parameters()?.into_iter().map(|p| p.value).collect())
    }

    /// Assign every value in order. All values are checked before any is written.
    fn set_values(&mut self, values: &[f64]) -> HydroResult<()> {
        let parameters = self.parameters()?;
        if parameters.len() != values.len() {
            return Err(HydroError::Configuration(format!(
                "{} values given for {} parameters",
                values.len(),
                parameters.len()
            )));
        }
        for (p, v) in parameters.iter().zip(values) {
            p.check(*v)?;
        }
        for (p, v) in parameters.iter().zip(values) {
            self.set_value(&p.name, *v)?;
        }
        Ok(())
    }

    fn is_within_bounds(&self) -> bool {
        self.parameters()
            .map(|ps| ps.iter().all(Parameter::is_within_bounds))
            .unwrap_or(false)
    }

    /// A plain hypercube with the visible parameters and their current values.
    fn to_hypercube(&self) -> HydroResult<Hypercube> {
        let mut hypercube = Hypercube::new();
        if !self.applies_to_model() {
            hypercube = hypercube.with_apply_mode(ApplyMode::None);
        }
        for p in self.parameters()? {
            hypercube.add_parameter(&p.name, p.min, p.max, p.value)?;
        }
        Ok(hypercube)
    }
}

impl Clone for Box<dyn ParameterSpace> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Write parameters to a simulation, resolving every name first.
pub(crate) fn apply_parameters(
    parameters: &[Parameter],
    simulation: &mut Simulation,
) -> HydroResult<()> {
    for p in parameters {
        simulation.check_parameter(&p.name)?;
    }
    for p in parameters {
        simulation.set_parameter_value(&p.name, p.value)?;
    }
    Ok(())
}

/// Unknown parameter error.
pub(crate) fn unknown_parameter(name: &str) -> HydroError {
    HydroError::UnknownParameter(name.to_string())
}

/// Serialise any parameter space to self-describing JSON.
pub fn to_json_string(space: &dyn ParameterSpace) -> HydroResult<String> {
    Ok(serde_json::to_string_pretty(space)?)
}

pub fn from_json_str(content: &str) -> HydroResult<Box<dyn ParameterSpace>> {
    Ok(serde_json::from_str(content)?)
}

pub fn save_json(space: &dyn ParameterSpace, path: impl AsRef<Path>) -> HydroResult<()> {
    std::fs::write(path, to_json_string(space)?)?;
    Ok(())
}

pub fn load_json(path: impl AsRef<Path>) -> HydroResult<Box<dyn ParameterSpace>> {
    from_json_str(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_bounds() {
        assert!(Parameter::new("x", 5.0, 0.0, 10.0).is_ok());
        assert!(Parameter::new("x", 11.0, 0.0, 10.0).is_err());
        assert!(Parameter::new("x", 1.0, 2.0, 0.0).is_err());
        assert!(Parameter::new("x", f64::NAN, 0.0, 10.0).is_err());
    }

    #[test]
    fn decorated_spaces_round_trip_through_json() {
        let mut hypercube = Hypercube::new();
        hypercube.add_parameter("x1", 1.0, 3000.0, 350.0).unwrap();
        hypercube.add_parameter("x4", 0.5, 10.0, 1.5).unwrap();
        let mut transformed = TransformParameterSpace::new(Box::new(hypercube));
        transformed
            .add_transform("log10_x4", "x4", Transform::Log10)
            .unwrap();
        let prefixed = PrefixingParameterSpace::new("subarea.a.", Box::new(transformed));

        let json = to_json_string(&prefixed).unwrap();
        let loaded = from_json_str(&json).unwrap();

        assert_eq!(loaded.names(), prefixed.names());
        assert_eq!(
            loaded.names(),
            vec!["subarea.a.x1".to_string(), "subarea.a.log10_x4".to_string()]
        );
        assert!(
            (loaded.value("subarea.a.log10_x4").unwrap() - 1.5f64.log10()).abs() < 1e-12
        );
    }

    #[test]
    fn save_and_load_from_disk() {
        let mut hypercube = Hypercube::new();
        hypercube.add_parameter("k", 0.0, 1.0, 0.25).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parameters.json");
        save_json(&hypercube, &path).unwrap();
        let loaded = load_json(&path).unwrap();
        assert_eq!(loaded.get("k").unwrap(), hypercube.get("k").unwrap());
    }

    #[test]
    fn set_values_is_all_or_nothing() {
        let mut hypercube = Hypercube::new();
        hypercube.add_parameter("a", 0.0, 1.0, 0.5).unwrap();
        hypercube.add_parameter("b", 0.0, 1.0, 0.5).unwrap();
        assert!(hypercube.set_values(&[0.1, 2.0]).is_err());
        assert_eq!(hypercube.values().unwrap(), vec![0.5, 0.5]);
        hypercube.set_values(&[0.1, 0.9]).unwrap();
        assert_eq!(hypercube.values().unwrap(), vec![0.1, 0.9]);
    }
}
