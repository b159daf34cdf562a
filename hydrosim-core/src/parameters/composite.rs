use crate::errors::{HydroError, HydroResult};
use crate::simulation::Simulation;
use serde::{Deserialize, Serialize};

use super::{unknown_parameter, Parameter, ParameterSpace};

/// Several independent spaces presented as one.
///
/// Parameter names must be unique across the children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositeParameterSpace {
    children: Vec<Box<dyn ParameterSpace>>,
}

impl CompositeParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child space. Fails if one of its names is already used.
    pub fn add(&mut self, child: Box<dyn ParameterSpace>) -> HydroResult<()> {
        let existing = self.names();
        if let Some(name) = child.names().into_iter().find(|n| existing.contains(n)) {
            return Err(HydroError::DuplicateParameter(name));
        }
        self.children.push(child);
        Ok(())
    }

    pub fn children(&self) -> &[Box<dyn ParameterSpace>] {
        &self.children
    }

    fn child_index(&self, name: &str) -> HydroResult<usize> {
        self.children
            .iter()
            .position(|c| c.contains(name))
            .ok_or_else(|| unknown_parameter(name))
    }
}

#[typetag::serde]
impl ParameterSpace for CompositeParameterSpace {
    fn names(&self) -> Vec<String> {
        self.children.iter().flat_map(|c| c.names()).collect()
    }

    fn get(&self, name: &str) -> HydroResult<Parameter> {
        self.children[self.child_index(name)?].get(name)
    }

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        let i = self.child_index(name)?;
        self.children[i].set_value(name, value)
    }

    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()> {
        let i = self.child_index(name)?;
        self.children[i].set_min(name, min)
    }

    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()> {
        let i = self.child_index(name)?;
        self.children[i].set_max(name, max)
    }

    fn box_clone(&self) -> Box<dyn ParameterSpace> {
        Box::new(self.clone())
    }

    fn apply(&self, simulation: &mut Simulation) -> HydroResult<()> {
        let mut parameters = Vec::new();
        for child in self.children.iter().filter(|c| c.applies_to_model()) {
            parameters.extend(child.parameters()?);
        }
        super::apply_parameters(&parameters, simulation)
    }

    fn supports_thread_safe_cloning(&self) -> bool {
        self.children.iter().all(|c| c.supports_thread_safe_cloning())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{ApplyMode, Hypercube};

    #[test]
    fn children_are_joined_without_collisions() {
        let mut hydrology = Hypercube::new();
        hydrology.add_parameter("x1", 1.0, 3000.0, 350.0).unwrap();
        let mut error_model = Hypercube::new().with_apply_mode(ApplyMode::None);
        error_model.add_parameter("Rho", 0.0, 1.0, 0.5).unwrap();

        let mut composite = CompositeParameterSpace::new();
        composite.add(Box::new(hydrology.clone())).unwrap();
        composite.add(Box::new(error_model)).unwrap();
        assert_eq!(composite.names(), vec!["x1", "Rho"]);

        composite.set_value("Rho", 0.9).unwrap();
        assert_eq!(composite.children()[1].value("Rho").unwrap(), 0.9);

        assert!(matches!(
            composite.add(Box::new(hydrology)),
            Err(HydroError::DuplicateParameter(_))
        ));
        assert_eq!(composite.children().len(), 2);
    }
}
