use hydrosim_core::component::{
    check_range, names, read_only_variable, unknown_variable, Component, ComponentKind,
    StepContext,
};
use hydrosim_core::errors::HydroResult;
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::VariableDefinition;
use serde::{Deserialize, Serialize};

use super::split_spill;

const VAR_STORAGE: &str = "Storage";
const VAR_RELEASE: &str = "Release";
const VAR_SPILL: &str = "Spill";

/// A storage releasing a set rate, spilling whatever exceeds its capacity.
///
/// The release is limited by the water available during the step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlledReleaseReservoir {
    /// unit: m3
    pub capacity: f64,
    /// unit: m3/s
    pub release_rate: f64,
    /// Storage on reset as a fraction of the capacity.
    pub initial_fraction: f64,
    storage: f64,
    inflow: f64,
    release: f64,
    spill: f64,
}

impl Default for ControlledReleaseReservoir {
    fn default() -> Self {
        Self {
            capacity: 1.0e6,
            release_rate: 0.0,
            initial_fraction: 1.0,
            storage: 1.0e6,
            inflow: 0.0,
            release: 0.0,
            spill: 0.0,
        }
    }
}

impl ControlledReleaseReservoir {
    pub const ID: &'static str = "ControlledReleaseReservoir";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }
}

#[typetag::serde]
impl Component for ControlledReleaseReservoir {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Reservoir
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter("StorageCapacity", "m3"),
            VariableDefinition::parameter("ReleaseRate", "m3/s"),
            VariableDefinition::parameter("InitialFraction", "-"),
            VariableDefinition::state(VAR_STORAGE, "m3"),
            VariableDefinition::input(names::INFLOW, "m3/s"),
            VariableDefinition::output(VAR_RELEASE, "m3/s"),
            VariableDefinition::output(VAR_SPILL, "m3/s"),
            VariableDefinition::output(names::OUTFLOW, "m3/s"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            "StorageCapacity" => Some(self.capacity),
            "ReleaseRate" => Some(self.release_rate),
            "InitialFraction" => Some(self.initial_fraction),
            VAR_STORAGE => Some(self.storage),
            names::INFLOW => Some(self.inflow),
            VAR_RELEASE => Some(self.release),
            VAR_SPILL => Some(self.spill),
            names::OUTFLOW => Some(self.release + self.spill),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            "StorageCapacity" => {
                check_range(name, value, 0.0, f64::MAX)?;
                self.capacity = value
            }
            "ReleaseRate" => {
                check_range(name, value, 0.0, f64::MAX)?;
                self.release_rate = value
            }
            "InitialFraction" => {
                check_range(name, value, 0.0, 1.0)?;
                self.initial_fraction = value
            }
            VAR_STORAGE => {
                check_range(name, value, 0.0, self.capacity)?;
                self.storage = value
            }
            names::INFLOW => self.inflow = value,
            VAR_RELEASE | VAR_SPILL | names::OUTFLOW => {
                return Err(read_only_variable(self, name))
            }
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, context: &StepContext) -> HydroResult<()> {
        let dt = context.dt_seconds;
        let available = self.storage + self.inflow * dt;
        self.release = self.release_rate.min(available / dt);
        let (storage, spill) = split_spill(available - self.release * dt, self.capacity, dt);
        self.storage = storage;
        self.spill = spill;
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        ModelState::new().with(VAR_STORAGE, self.storage)
    }

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()> {
        if let Some(v) = state.get(VAR_STORAGE) {
            self.storage = v;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.storage = self.initial_fraction * self.capacity;
        self.release = 0.0;
        self.spill = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}
