//! Minimal components used to exercise the engine in tests and documentation.

use crate::component::{
    check_range, names, read_only_variable, unknown_variable, Component, ComponentKind,
    StepContext,
};
use crate::errors::HydroResult;
use crate::registry::ModelRegistry;
use crate::state::ModelState;
use crate::variable::{VariableDefinition, VariableType};
use serde::{Deserialize, Serialize};

// ============================================================================
// ScaledRunoff - runoff is a fixed fraction of rainfall
// ============================================================================

/// Runoff model producing `scale * P` with no storage.
///
/// A step counter is kept as state so tests can check how often the model was solved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaledRunoff {
    pub scale: f64,
    rainfall: f64,
    evapotranspiration: f64,
    runoff: f64,
    step_count: f64,
}

impl Default for ScaledRunoff {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rainfall: 0.0,
            evapotranspiration: 0.0,
            runoff: 0.0,
            step_count: 0.0,
        }
    }
}

impl ScaledRunoff {
    pub const ID: &'static str = "ScaledRunoff";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }
}

#[typetag::serde]
impl Component for ScaledRunoff {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Runoff
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter("scale", "-"),
            VariableDefinition::input(names::RAINFALL, "mm"),
            VariableDefinition::input(names::EVAPOTRANSPIRATION, "mm"),
            VariableDefinition::output(names::RUNOFF, "mm"),
            VariableDefinition::state("StepCount", "-").with_type(VariableType::Integer),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            "scale" => Some(self.scale),
            names::RAINFALL => Some(self.rainfall),
            names::EVAPOTRANSPIRATION => Some(self.evapotranspiration),
            names::RUNOFF => Some(self.runoff),
            "StepCount" => Some(self.step_count),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            "scale" => {
                check_range(name, value, 0.0, 10.0)?;
                self.scale = value
            }
            names::RAINFALL => self.rainfall = value,
            names::EVAPOTRANSPIRATION => self.evapotranspiration = value,
            "StepCount" => self.step_count = value.round(),
            names::RUNOFF => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        self.runoff = self.scale * self.rainfall;
        self.step_count += 1.0;
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        ModelState::new().with("StepCount", self.step_count)
    }

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()> {
        if let Some(v) = state.get("StepCount") {
            self.step_count = v;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.step_count = 0.0;
        self.runoff = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

// ============================================================================
// LinearStore - single linear reservoir routing
// ============================================================================

/// Routing through a single linear store, `Outflow = k * Storage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearStore {
    pub k: f64,
    storage: f64,
    inflow: f64,
    outflow: f64,
}

impl Default for LinearStore {
    fn default() -> Self {
        Self {
            k: 0.5,
            storage: 0.0,
            inflow: 0.0,
            outflow: 0.0,
        }
    }
}

impl LinearStore {
    pub const ID: &'static str = "LinearStore";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }
}

#[typetag::serde]
impl Component for LinearStore {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Routing
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter("k", "-"),
            VariableDefinition::state("Storage", "m3/s.step"),
            VariableDefinition::input(names::INFLOW, "m3/s"),
            VariableDefinition::output(names::OUTFLOW, "m3/s"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            "k" => Some(self.k),
            "Storage" => Some(self.storage),
            names::INFLOW => Some(self.inflow),
            names::OUTFLOW => Some(self.outflow),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            "k" => {
                check_range(name, value, 0.0, 1.0)?;
                self.k = value
            }
            "Storage" => self.storage = value,
            names::INFLOW => self.inflow = value,
            names::OUTFLOW => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        self.storage += self.inflow;
        self.outflow = self.k * self.storage;
        self.storage -= self.outflow;
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        ModelState::new().with("Storage", self.storage)
    }

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()> {
        if let Some(v) = state.get("Storage") {
            self.storage = v;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.storage = 0.0;
        self.outflow = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

/// A catalog holding the example components.
pub fn example_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(ScaledRunoff::ID, ComponentKind::Runoff, ScaledRunoff::create)
        .register(LinearStore::ID, ComponentKind::Routing, LinearStore::create);
    registry
}
