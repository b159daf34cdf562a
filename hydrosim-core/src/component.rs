//! Sub-models attached to the elements of a catchment network.
//!
//! Every element carries one or more components: subareas a runoff model and optionally an
//! input preprocessor, links an optional routing model, nodes an optional reservoir. Nodes and
//! links may also carry an error-correction model applied to their outflow.
//!
//! Components are variable bags: parameters, states, inputs and outputs are all read and
//! written by name, which is what lets parameter spaces, played inputs and recorders address
//! them uniformly. Flow between elements uses the conventional names in [`names`].

use crate::errors::{HydroError, HydroResult};
use crate::interpolate::PiecewiseLinear;
use crate::state::ModelState;
use crate::timeseries::Instant;
use crate::variable::{VariableDefinition, VariableType};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// Conventional variable names used to pass flows between elements and components.
pub mod names {
    /// Rainfall depth over the step (mm).
    pub const RAINFALL: &str = "P";
    /// Potential evapotranspiration depth over the step (mm).
    pub const EVAPOTRANSPIRATION: &str = "E";
    /// Runoff depth produced by a runoff model (mm).
    pub const RUNOFF: &str = "runoff";
    /// Flow rate entering a routing, reservoir or error-correction model (m3/s).
    pub const INFLOW: &str = "Inflow";
    /// Flow rate leaving a routing, reservoir or error-correction model (m3/s).
    pub const OUTFLOW: &str = "Outflow";
    /// Observed flow rate used by error-correction models (m3/s).
    pub const OBSERVATION: &str = "Observation";
}

/// The slot a component occupies on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    Preprocessing,
    Runoff,
    Routing,
    Reservoir,
    ErrorCorrection,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Preprocessing,
        ComponentKind::Runoff,
        ComponentKind::Routing,
        ComponentKind::Reservoir,
        ComponentKind::ErrorCorrection,
    ];

    /// Short tag used to qualify variable identifiers.
    pub fn tag(&self) -> &'static str {
        match self {
            ComponentKind::Preprocessing => "preprocessor",
            ComponentKind::Runoff => "runoff",
            ComponentKind::Routing => "routing",
            ComponentKind::Reservoir => "reservoir",
            ComponentKind::ErrorCorrection => "ec",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

impl Display for ComponentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Curves accepted by reservoir components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservoirCurve {
    /// Storage (m3) as a function of level (m).
    LevelStorage,
    /// Surface area (m2) as a function of level (m).
    LevelArea,
    /// Minimum discharge (m3/s) as a function of level (m).
    MinDischarge,
    /// Maximum discharge (m3/s) as a function of level (m).
    MaxDischarge,
    /// Operational release (m3/s) as a function of level (m).
    OpsRelease,
}

/// Information about the step being solved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    /// Index of the step within the simulation span.
    pub time_index: usize,
    /// Start of the step.
    pub time: Instant,
    /// Length of the step in seconds.
    pub dt_seconds: f64,
    /// Seed of the simulation, for stochastic components.
    pub seed: u64,
}

/// A sub-model bound to an element.
///
/// Implementations hold their own state and are stepped once per time step by the element
/// that owns them. `set_variable` must leave the component unchanged when it returns an error.
#[typetag::serde(tag = "model")]
pub trait Component: Debug + Send + Sync {
    /// Identifier under which the model is registered in the catalog.
    fn model_id(&self) -> &'static str;

    fn kind(&self) -> ComponentKind;

    /// Every variable the component exposes.
    fn definitions(&self) -> Vec<VariableDefinition>;

    fn get_variable(&self, name: &str) -> Option<f64>;

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()>;

    /// Advance the component by one time step.
    fn step(&mut self, context: &StepContext) -> HydroResult<()>;

    fn get_state(&self) -> ModelState;

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()>;

    /// Return the internal state to its initial condition. Parameters are kept.
    fn reset(&mut self);

    fn box_clone(&self) -> Box<dyn Component>;

    /// Inputs handed over to the next component on the same element after stepping.
    ///
    /// Used by input preprocessors to feed their processed forcings into the runoff model.
    fn forwarded_inputs(&self) -> Vec<(String, f64)> {
        Vec::new()
    }

    /// Set a piecewise relationship. Only reservoirs accept curves.
    fn set_curve(&mut self, curve: ReservoirCurve, _values: PiecewiseLinear) -> HydroResult<()> {
        Err(HydroError::Configuration(format!(
            "model '{}' does not accept a {:?} curve",
            self.model_id(),
            curve
        )))
    }

    fn variable_ids(&self) -> Vec<String> {
        self.definitions().into_iter().map(|d| d.name).collect()
    }

    fn definition(&self, name: &str) -> Option<VariableDefinition> {
        self.definitions().into_iter().find(|d| d.name == name)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.definition(name).is_some()
    }

    fn variable_type(&self, name: &str) -> Option<VariableType> {
        self.definition(name).map(|d| d.variable_type)
    }
}

impl Clone for Box<dyn Component> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Error for a write to a variable the component does not have.
pub fn unknown_variable(component: &dyn Component, name: &str) -> HydroError {
    HydroError::UnknownVariable(format!("{} (model {})", name, component.model_id()))
}

/// Error for a write to a read-only variable.
pub fn read_only_variable(component: &dyn Component, name: &str) -> HydroError {
    HydroError::Configuration(format!(
        "variable '{}' of model {} is read only",
        name,
        component.model_id()
    ))
}

/// Check that `value` lies in `[min, max]`.
pub fn check_range(name: &str, value: f64, min: f64, max: f64) -> HydroResult<()> {
    if !(min..=max).contains(&value) {
        return Err(HydroError::BoundViolation {
            name: name.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in ComponentKind::ALL {
            assert_eq!(ComponentKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ComponentKind::from_tag("x1"), None);
    }

    #[test]
    fn range_check() {
        assert!(check_range("x", 1.0, 0.0, 2.0).is_ok());
        assert!(matches!(
            check_range("x", 3.0, 0.0, 2.0),
            Err(HydroError::BoundViolation { .. })
        ));
        assert!(check_range("x", f64::NAN, 0.0, 2.0).is_err());
    }
}
