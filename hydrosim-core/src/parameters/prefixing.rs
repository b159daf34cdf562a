use crate::errors::HydroResult;
use serde::{Deserialize, Serialize};

use super::{unknown_parameter, Parameter, ParameterSpace};

/// Exposes every parameter of the inner space under `prefix + name`.
///
/// Typically used to turn generic model parameter names into fully qualified variable
/// identifiers, e.g. `x1` into `subarea.a.x1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixingParameterSpace {
    prefix: String,
    inner: Box<dyn ParameterSpace>,
}

impl PrefixingParameterSpace {
    pub fn new(prefix: &str, inner: Box<dyn ParameterSpace>) -> Self {
        Self {
            prefix: prefix.to_string(),
            inner,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inner(&self) -> &dyn ParameterSpace {
        self.inner.as_ref()
    }

    fn inner_name<'a>(&self, name: &'a str) -> HydroResult<&'a str> {
        name.strip_prefix(self.prefix.as_str())
            .ok_or_else(|| unknown_parameter(name))
    }
}

#[typetag::serde]
impl ParameterSpace for PrefixingParameterSpace {
    fn names(&self) -> Vec<String> {
        self.inner
            .names()
            .into_iter()
            .map(|n| format!("{}{}", self.prefix, n))
            .collect()
    }

    fn get(&self, name: &str) -> HydroResult<Parameter> {
        let mut parameter = self.inner.get(self.inner_name(name)?)?;
        parameter.name = name.to_string();
        Ok(parameter)
    }

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        let inner_name = self.inner_name(name)?;
        self.inner.set_value(inner_name, value)
    }

    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()> {
        let inner_name = self.inner_name(name)?;
        self.inner.set_min(inner_name, min)
    }

    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()> {
        let inner_name = self.inner_name(name)?;
        self.inner.set_max(inner_name, max)
    }

    fn box_clone(&self) -> Box<dyn ParameterSpace> {
        Box::new(self.clone())
    }

    fn set_definition(&mut self, name: &str, min: f64, max: f64, value: f64) -> HydroResult<()> {
        let inner_name = self.inner_name(name)?;
        self.inner.set_definition(inner_name, min, max, value)
    }

    fn applies_to_model(&self) -> bool {
        self.inner.applies_to_model()
    }

    fn supports_thread_safe_cloning(&self) -> bool {
        self.inner.supports_thread_safe_cloning()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Hypercube;

    #[test]
    fn names_are_prefixed() {
        let mut hypercube = Hypercube::new();
        hypercube.add_parameter("x1", 1.0, 3000.0, 350.0).unwrap();
        let mut prefixed = PrefixingParameterSpace::new("subarea.a.", Box::new(hypercube));

        assert_eq!(prefixed.names(), vec!["subarea.a.x1"]);
        assert_eq!(prefixed.get("subarea.a.x1").unwrap().name, "subarea.a.x1");
        assert!(prefixed.get("x1").is_err());

        prefixed.set_value("subarea.a.x1", 400.0).unwrap();
        assert_eq!(prefixed.inner().value("x1").unwrap(), 400.0);
        assert!(prefixed.set_value("subarea.a.x1", 4000.0).is_err());
    }
}
