use crate::errors::HydroResult;
use crate::simulation::Simulation;
use serde::{Deserialize, Serialize};

use super::{Parameter, ParameterSpace};

/// Applies its inner space at every reset of the simulation instead of immediately.
///
/// Applying this space registers a copy of the inner space as a state initialiser of the
/// simulation under `id`. Values set afterwards take effect at the next application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateInitParameterSpace {
    id: String,
    inner: Box<dyn ParameterSpace>,
}

impl StateInitParameterSpace {
    pub fn new(id: &str, inner: Box<dyn ParameterSpace>) -> Self {
        Self {
            id: id.to_string(),
            inner,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[typetag::serde]
impl ParameterSpace for StateInitParameterSpace {
    fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    fn get(&self, name: &str) -> HydroResult<Parameter> {
        self.inner.get(name)
    }

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        self.inner.set_value(name, value)
    }

    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()> {
        self.inner.set_min(name, min)
    }

    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()> {
        self.inner.set_max(name, max)
    }

    fn box_clone(&self) -> Box<dyn ParameterSpace> {
        Box::new(self.clone())
    }

    fn set_definition(&mut self, name: &str, min: f64, max: f64, value: f64) -> HydroResult<()> {
        self.inner.set_definition(name, min, max, value)
    }

    fn applies_to_model(&self) -> bool {
        self.inner.applies_to_model()
    }

    fn apply(&self, simulation: &mut Simulation) -> HydroResult<()> {
        simulation.add_state_initializer(&self.id, self.inner.clone());
        Ok(())
    }

    fn supports_thread_safe_cloning(&self) -> bool {
        self.inner.supports_thread_safe_cloning()
    }
}
