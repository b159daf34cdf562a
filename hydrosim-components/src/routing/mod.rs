//! Channel routing models attached to links.

mod lag;
mod muskingum;

pub use lag::Lag;
pub use muskingum::Muskingum;

use hydrosim_core::component::{
    names, read_only_variable, unknown_variable, Component, ComponentKind, StepContext,
};
use hydrosim_core::errors::HydroResult;
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::VariableDefinition;
use serde::{Deserialize, Serialize};

/// Outflow equals inflow within the same step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoRouting {
    inflow: f64,
}

impl NoRouting {
    pub const ID: &'static str = "NoRouting";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }
}

#[typetag::serde]
impl Component for NoRouting {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Routing
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::input(names::INFLOW, "m3/s"),
            VariableDefinition::output(names::OUTFLOW, "m3/s"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            names::INFLOW | names::OUTFLOW => Some(self.inflow),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            names::INFLOW => self.inflow = value,
            names::OUTFLOW => return Err(read_only_variable(self, name)),
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

    fn reset(&mut self) {
        self.inflow = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use chrono::NaiveDate;
    use hydrosim_core::component::{Component, StepContext};

    pub fn context(dt_seconds: f64) -> StepContext {
        StepContext {
            time_index: 0,
            time: NaiveDate::from_ymd_opt(2000, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            dt_seconds,
            seed: 0,
        }
    }

    /// Route a hydrograph, returning the outflows.
    pub fn route(model: &mut dyn Component, inflows: &[f64], dt_seconds: f64) -> Vec<f64> {
        inflows
            .iter()
            .map(|q| {
                model.set_variable("Inflow", *q).unwrap();
                model.step(&context(dt_seconds)).unwrap();
                model.get_variable("Outflow").unwrap()
            })
            .collect()
    }
}
