//! Linear Muskingum channel routing.

use hydrosim_core::component::{
    check_range, names, read_only_variable, unknown_variable, Component, ComponentKind,
    StepContext,
};
use hydrosim_core::errors::{HydroError, HydroResult};
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::VariableDefinition;
use serde::{Deserialize, Serialize};

const VAR_LENGTH: &str = "Length";
const VAR_PREVIOUS_INFLOW: &str = "PreviousInflow";
const VAR_PREVIOUS_OUTFLOW: &str = "PreviousOutflow";

/// Muskingum routing
///
/// `O2 = C0 I2 + C1 I1 + C2 O1` with, for a reach travel time `T = K L` and weighting `X`,
///
/// `C0 = (dt/2 - T X) / D`, `C1 = (dt/2 + T X) / D`, `C2 = (T (1 - X) - dt/2) / D`,
/// `D = T (1 - X) + dt/2`.
///
/// The scheme only yields non-negative coefficients for `2 T X <= dt <= 2 T (1 - X)`;
/// steps outside of this range fail. With the default unit length, `K` is the travel time
/// of the whole reach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Muskingum {
    /// Travel time per unit of reach length
    /// unit: hours/km
    pub k: f64,
    /// Reach length
    /// unit: km
    #[serde(default = "unit_length")]
    pub length: f64,
    /// Weighting between inflow and outflow
    /// unit: dimensionless
    pub x: f64,
    inflow: f64,
    outflow: f64,
    previous_inflow: f64,
    previous_outflow: f64,
}

impl Default for Muskingum {
    fn default() -> Self {
        Self {
            k: 24.0,
            length: 1.0,
            x: 0.2,
            inflow: 0.0,
            outflow: 0.0,
            previous_inflow: 0.0,
            previous_outflow: 0.0,
        }
    }
}

fn unit_length() -> f64 {
    1.0
}

impl Muskingum {
    pub const ID: &'static str = "Muskingum";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }

    /// `(C0, C1, C2)` for a step of `dt_seconds`.
    pub fn coefficients(&self, dt_seconds: f64) -> HydroResult<(f64, f64, f64)> {
        let half_dt = dt_seconds / 3600.0 / 2.0;
        let travel_time = self.k * self.length;
        let kx = travel_time * self.x;
        let d = travel_time - kx + half_dt;
        let c = (
            (half_dt - kx) / d,
            (half_dt + kx) / d,
            (travel_time - kx - half_dt) / d,
        );
        if c.0 < 0.0 || c.2 < 0.0 {
            return Err(HydroError::simulation(
                Self::ID,
                format!(
                    "unstable for a travel time of {} h and X = {} with a step of {} h",
                    travel_time,
                    self.x,
                    2.0 * half_dt
                ),
            ));
        }
        Ok(c)
    }
}

#[typetag::serde]
impl Component for Muskingum {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Routing
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter("K", "h/km"),
            VariableDefinition::parameter("X", "-"),
            VariableDefinition::parameter(VAR_LENGTH, "km"),
            VariableDefinition::state(VAR_PREVIOUS_INFLOW, "m3/s"),
            VariableDefinition::state(VAR_PREVIOUS_OUTFLOW, "m3/s"),
            VariableDefinition::input(names::INFLOW, "m3/s"),
            VariableDefinition::output(names::OUTFLOW, "m3/s"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            "K" => Some(self.k),
            "X" => Some(self.x),
            VAR_LENGTH => Some(self.length),
            VAR_PREVIOUS_INFLOW => Some(self.previous_inflow),
            VAR_PREVIOUS_OUTFLOW => Some(self.previous_outflow),
            names::INFLOW => Some(self.inflow),
            names::OUTFLOW => Some(self.outflow),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            "K" => {
                check_range(name, value, 1e-3, 1e4)?;
                self.k = value
            }
            "X" => {
                check_range(name, value, 0.0, 0.5)?;
                self.x = value
            }
            VAR_LENGTH => {
                check_range(name, value, 1e-3, 1e4)?;
                self.length = value
            }
            VAR_PREVIOUS_INFLOW => self.previous_inflow = value,
            VAR_PREVIOUS_OUTFLOW => self.previous_outflow = value,
            names::INFLOW => self.inflow = value,
            names::OUTFLOW => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, context: &StepContext) -> HydroResult<()> {
        let (c0, c1, c2) = self.coefficients(context.dt_seconds)?;
        self.outflow = c0 * self.inflow + c1 * self.previous_inflow + c2 * self.previous_outflow;
        self.previous_inflow = self.inflow;
        self.previous_outflow = self.outflow;
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        ModelState::new()
            .with(VAR_PREVIOUS_INFLOW, self.previous_inflow)
            .with(VAR_PREVIOUS_OUTFLOW, self.previous_outflow)
    }

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()> {
        if let Some(v) = state.get(VAR_PREVIOUS_INFLOW) {
            self.previous_inflow = v;
        }
        if let Some(v) = state.get(VAR_PREVIOUS_OUTFLOW) {
            self.previous_outflow = v;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.previous_inflow = 0.0;
        self.previous_outflow = 0.0;
        self.outflow = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}
