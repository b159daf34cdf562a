use crate::errors::{HydroError, HydroResult};
use crate::simulation::Simulation;
use crate::variable::ElementKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Hypercube, Parameter, ParameterSpace};

/// Elements a scaling parameter space is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementSelector {
    Subareas,
    Links,
    Nodes,
}

pub fn known_selector_types() -> Vec<&'static str> {
    vec!["subareas", "links", "nodes"]
}

impl ElementSelector {
    pub fn from_name(name: &str) -> HydroResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "subareas" | "each subarea" => Ok(ElementSelector::Subareas),
            "links" | "each link" => Ok(ElementSelector::Links),
            "nodes" | "each node" => Ok(ElementSelector::Nodes),
            other => Err(HydroError::Configuration(format!(
                "unknown selector type '{}', expected one of {:?}",
                other,
                known_selector_types()
            ))),
        }
    }

    fn kind(&self) -> ElementKind {
        match self {
            ElementSelector::Subareas => ElementKind::Subarea,
            ElementSelector::Links => ElementKind::Link,
            ElementSelector::Nodes => ElementKind::Node,
        }
    }
}

/// `target = parameter * scaling_variable + intercept`, evaluated per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearScaling {
    pub target: String,
    pub scaling_variable: String,
    pub intercept: f64,
}

/// Sets element variables, usually initial states, from other variables of the same element.
///
/// For instance the initial soil store of each subarea can be set as a fraction of its
/// capacity `x1`, with the fraction being the calibrated parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingParameterSpace {
    selector: ElementSelector,
    parameters: Hypercube,
    scalings: IndexMap<String, LinearScaling>,
}

impl ScalingParameterSpace {
    pub fn new(selector: ElementSelector) -> Self {
        Self {
            selector,
            parameters: Hypercube::new(),
            scalings: IndexMap::new(),
        }
    }

    /// Add a parameter `name` setting `target = name * scaling_variable + intercept`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_linear_scaling(
        &mut self,
        name: &str,
        target: &str,
        scaling_variable: &str,
        min: f64,
        max: f64,
        value: f64,
        intercept: f64,
    ) -> HydroResult<()> {
        self.parameters.add_parameter(name, min, max, value)?;
        self.scalings.insert(
            name.to_string(),
            LinearScaling {
                target: target.to_string(),
                scaling_variable: scaling_variable.to_string(),
                intercept,
            },
        );
        Ok(())
    }

    pub fn selector(&self) -> ElementSelector {
        self.selector
    }
}

#[typetag::serde]
impl ParameterSpace for ScalingParameterSpace {
    fn names(&self) -> Vec<String> {
        self.parameters.names()
    }

    fn get(&self, name: &str) -> HydroResult<Parameter> {
        self.parameters.get(name)
    }

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        self.parameters.set_value(name, value)
    }

    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()> {
        self.parameters.set_min(name, min)
    }

    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()> {
        self.parameters.set_max(name, max)
    }

    fn box_clone(&self) -> Box<dyn ParameterSpace> {
        Box::new(self.clone())
    }

    /// Compute every target on every selected element, then write them.
    fn apply(&self, simulation: &mut Simulation) -> HydroResult<()> {
        let kind = self.selector.kind();
        let mut updates = Vec::new();
        for element in simulation.network().elements_of(kind) {
            for (name, scaling) in &self.scalings {
                if !element.is_writable(&scaling.target, None) {
                    return Err(HydroError::Binding(format!(
                        "{}.{}",
                        element.key(),
                        scaling.target
                    )));
                }
                let base = element
                    .get_variable(&scaling.scaling_variable, None)
                    .map_err(|_| {
                        HydroError::Binding(format!(
                            "{}.{}",
                            element.key(),
                            scaling.scaling_variable
                        ))
                    })?;
                let value = self.parameters.value(name)? * base + scaling.intercept;
                updates.push((element.key(), scaling.target.clone(), value));
            }
        }
        for (key, target, value) in updates {
            simulation
                .network_mut()
                .element_mut(&key)?
                .set_variable(&target, None, value)?;
        }
        Ok(())
    }
}
