//! Runoff models, converting rainfall and evapotranspiration into a runoff depth.

mod gr4j;
mod unit_hydrograph;

pub use gr4j::{Gr4j, Gr4jParameters};
pub use unit_hydrograph::UnitHydrograph;

use hydrosim_core::component::{
    names, read_only_variable, unknown_variable, Component, ComponentKind, StepContext,
};
use hydrosim_core::errors::HydroResult;
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::VariableDefinition;
use serde::{Deserialize, Serialize};

/// Runoff equal to rainfall, without losses or storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitRunoff {
    rainfall: f64,
    evapotranspiration: f64,
    runoff: f64,
}

impl UnitRunoff {
    pub const ID: &'static str = "UnitRunoff";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }
}

#[typetag::serde]
impl Component for UnitRunoff {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Runoff
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::input(names::RAINFALL, "mm"),
            VariableDefinition::input(names::EVAPOTRANSPIRATION, "mm"),
            VariableDefinition::output(names::RUNOFF, "mm"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            names::RAINFALL => Some(self.rainfall),
            names::EVAPOTRANSPIRATION => Some(self.evapotranspiration),
            names::RUNOFF => Some(self.runoff),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            names::RAINFALL => self.rainfall = value,
            names::EVAPOTRANSPIRATION => self.evapotranspiration = value,
            names::RUNOFF => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        self.runoff = self.rainfall;
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        ModelState::new()
    }

    fn set_state(&mut self, _state: &ModelState) -> HydroResult<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.runoff = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

/// Produces no runoff. Used to switch off subareas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NullRunoff {
    rainfall: f64,
    evapotranspiration: f64,
}

impl NullRunoff {
    pub const ID: &'static str = "NullRunoff";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }
}

#[typetag::serde]
impl Component for NullRunoff {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Runoff
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::input(names::RAINFALL, "mm"),
            VariableDefinition::input(names::EVAPOTRANSPIRATION, "mm"),
            VariableDefinition::output(names::RUNOFF, "mm"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            names::RAINFALL => Some(self.rainfall),
            names::EVAPOTRANSPIRATION => Some(self.evapotranspiration),
            names::RUNOFF => Some(0.0),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            names::RAINFALL => self.rainfall = value,
            names::EVAPOTRANSPIRATION => self.evapotranspiration = value,
            names::RUNOFF => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        ModelState::new()
    }

    fn set_state(&mut self, _state: &ModelState) -> HydroResult<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}
