//! Input preprocessing applied to subarea forcings before the runoff model.

use hydrosim_core::component::{
    check_range, names, read_only_variable, unknown_variable, Component, ComponentKind,
    StepContext,
};
use hydrosim_core::errors::HydroResult;
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::VariableDefinition;
use serde::{Deserialize, Serialize};

const VAR_RAINFALL_FACTOR: &str = "RainfallFactor";
const VAR_EVAP_FACTOR: &str = "EvapFactor";
const VAR_SCALED_RAINFALL: &str = "ScaledP";
const VAR_SCALED_EVAP: &str = "ScaledE";

/// Multiplicative correction of rainfall and evapotranspiration.
///
/// The scaled values replace the runoff model inputs of the subarea each step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputScaling {
    rainfall_factor: f64,
    evap_factor: f64,
    rainfall: f64,
    evapotranspiration: f64,
    scaled_rainfall: f64,
    scaled_evap: f64,
}

impl Default for InputScaling {
    fn default() -> Self {
        Self {
            rainfall_factor: 1.0,
            evap_factor: 1.0,
            rainfall: 0.0,
            evapotranspiration: 0.0,
            scaled_rainfall: 0.0,
            scaled_evap: 0.0,
        }
    }
}

impl InputScaling {
    pub const ID: &'static str = "InputScaling";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }
}

#[typetag::serde]
impl Component for InputScaling {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Preprocessing
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter(VAR_RAINFALL_FACTOR, "-"),
            VariableDefinition::parameter(VAR_EVAP_FACTOR, "-"),
            VariableDefinition::input(names::RAINFALL, "mm"),
            VariableDefinition::input(names::EVAPOTRANSPIRATION, "mm"),
            VariableDefinition::output(VAR_SCALED_RAINFALL, "mm"),
            VariableDefinition::output(VAR_SCALED_EVAP, "mm"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            VAR_RAINFALL_FACTOR => Some(self.rainfall_factor),
            VAR_EVAP_FACTOR => Some(self.evap_factor),
            names::RAINFALL => Some(self.rainfall),
            names::EVAPOTRANSPIRATION => Some(self.evapotranspiration),
            VAR_SCALED_RAINFALL => Some(self.scaled_rainfall),
            VAR_SCALED_EVAP => Some(self.scaled_evap),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            VAR_RAINFALL_FACTOR => {
                check_range(name, value, 0.0, 10.0)?;
                self.rainfall_factor = value
            }
            VAR_EVAP_FACTOR => {
                check_range(name, value, 0.0, 10.0)?;
                self.evap_factor = value
            }
            names::RAINFALL => self.rainfall = value,
            names::EVAPOTRANSPIRATION => self.evapotranspiration = value,
            VAR_SCALED_RAINFALL | VAR_SCALED_EVAP => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        self.scaled_rainfall = self.rainfall * self.rainfall_factor;
        self.scaled_evap = self.evapotranspiration * self.evap_factor;
        Ok(())
    }

    fn forwarded_inputs(&self) -> Vec<(String, f64)> {
        vec![
            (names::RAINFALL.to_string(), self.scaled_rainfall),
            (names::EVAPOTRANSPIRATION.to_string(), self.scaled_evap),
        ]
    }

    fn get_state(&self) -> ModelState {
        ModelState::new()
    }

    fn set_state(&mut self, _state: &ModelState) -> HydroResult<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.scaled_rainfall = 0.0;
        self.scaled_evap = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}
