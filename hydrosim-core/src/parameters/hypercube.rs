use crate::errors::{HydroError, HydroResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{unknown_parameter, Parameter, ParameterSpace};

/// Whether the values of a hypercube are written to a simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyMode {
    /// Parameters are model variables.
    #[default]
    Model,
    /// Parameters are read by objective evaluators only, e.g. error-model parameters.
    None,
}

/// An ordered set of uniquely named parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hypercube {
    parameters: IndexMap<String, Parameter>,
    #[serde(default)]
    apply_mode: ApplyMode,
}

impl Hypercube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply_mode(mut self, apply_mode: ApplyMode) -> Self {
        self.apply_mode = apply_mode;
        self
    }

    pub fn apply_mode(&self) -> ApplyMode {
        self.apply_mode
    }

    pub fn from_parameters(parameters: Vec<Parameter>) -> HydroResult<Self> {
        let mut hypercube = Self::new();
        for p in parameters {
            hypercube.add_parameter(&p.name, p.min, p.max, p.value)?;
        }
        Ok(hypercube)
    }

    /// Add a new parameter. Fails if the name is taken or the value is out of bounds.
    pub fn add_parameter(&mut self, name: &str, min: f64, max: f64, value: f64) -> HydroResult<()> {
        if self.parameters.contains_key(name) {
            return Err(HydroError::DuplicateParameter(name.to_string()));
        }
        let parameter = Parameter::new(name, value, min, max)?;
        self.parameters.insert(name.to_string(), parameter);
        Ok(())
    }

    pub fn remove_parameter(&mut self, name: &str) -> HydroResult<Parameter> {
        self.parameters
            .shift_remove(name)
            .ok_or_else(|| unknown_parameter(name))
    }

    fn parameter_mut(&mut self, name: &str) -> HydroResult<&mut Parameter> {
        self.parameters
            .get_mut(name)
            .ok_or_else(|| unknown_parameter(name))
    }
}

#[typetag::serde]
impl ParameterSpace for Hypercube {
    fn names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> HydroResult<Parameter> {
        self.parameters
            .get(name)
            .cloned()
            .ok_or_else(|| unknown_parameter(name))
    }

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        let parameter = self.parameter_mut(name)?;
        parameter.check(value)?;
        parameter.value = value;
        Ok(())
    }

    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()> {
        let parameter = self.parameter_mut(name)?;
        if !(min <= parameter.value) {
            return Err(HydroError::BoundViolation {
                name: name.to_string(),
                value: parameter.value,
                min,
                max: parameter.max,
            });
        }
        parameter.min = min;
        Ok(())
    }

    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()> {
        let parameter = self.parameter_mut(name)?;
        if !(max >= parameter.value) {
            return Err(HydroError::BoundViolation {
                name: name.to_string(),
                value: parameter.value,
                min: parameter.min,
                max,
            });
        }
        parameter.max = max;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn ParameterSpace> {
        Box::new(self.clone())
    }

    fn set_definition(&mut self, name: &str, min: f64, max: f64, value: f64) -> HydroResult<()> {
        let parameter = Parameter::new(name, value, min, max)?;
        self.parameters.insert(name.to_string(), parameter);
        Ok(())
    }

    fn applies_to_model(&self) -> bool {
        self.apply_mode == ApplyMode::Model
    }

    fn len(&self) -> usize {
        self.parameters.len()
    }

    fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hypercube() -> Hypercube {
        let mut hypercube = Hypercube::new();
        hypercube.add_parameter("x", 0.0, 10.0, 5.0).unwrap();
        hypercube.add_parameter("y", -1.0, 1.0, 0.0).unwrap();
        hypercube
    }

    #[test]
    fn names_keep_insertion_order() {
        let hypercube = hypercube();
        assert_eq!(hypercube.names(), vec!["x", "y"]);
        assert_eq!(hypercube.name_at(1).unwrap(), "y");
        assert!(hypercube.name_at(2).is_err());
    }

    #[test]
    fn lowering_max_below_value_fails() {
        let mut hypercube = hypercube();
        let err = hypercube.set_max("x", 3.0).unwrap_err();
        assert!(matches!(err, HydroError::BoundViolation { .. }));
        assert_eq!(hypercube.max_value("x").unwrap(), 10.0);
        assert_eq!(hypercube.value("x").unwrap(), 5.0);

        hypercube.set_value("x", 2.0).unwrap();
        hypercube.set_max("x", 3.0).unwrap();
        assert_eq!(hypercube.max_value("x").unwrap(), 3.0);
    }

    #[test]
    fn raising_min_above_value_fails() {
        let mut hypercube = hypercube();
        assert!(hypercube.set_min("y", 0.5).is_err());
        assert_eq!(hypercube.min_value("y").unwrap(), -1.0);
        hypercube.set_min("y", -0.5).unwrap();
        assert_eq!(hypercube.min_value("y").unwrap(), -0.5);
    }

    #[test]
    fn out_of_bounds_write_keeps_previous_value() {
        let mut hypercube = hypercube();
        assert!(hypercube.set_value("x", 10.5).is_err());
        assert_eq!(hypercube.value("x").unwrap(), 5.0);
        assert!(hypercube.is_within_bounds());
        assert!(matches!(
            hypercube.set_value("z", 1.0),
            Err(HydroError::UnknownParameter(_))
        ));
    }

    #[test]
    fn definitions_are_upserted() {
        let mut hypercube = hypercube();
        assert!(matches!(
            hypercube.add_parameter("x", 0.0, 1.0, 0.5),
            Err(HydroError::DuplicateParameter(_))
        ));
        hypercube.set_definition("x", 0.0, 1.0, 0.5).unwrap();
        hypercube.set_definition("z", 1.0, 2.0, 1.5).unwrap();
        assert_eq!(hypercube.names(), vec!["x", "y", "z"]);
        assert_eq!(hypercube.max_value("x").unwrap(), 1.0);
        assert!(hypercube.set_definition("w", 0.0, 1.0, 3.0).is_err());
    }
}
