use hydrosim_core::component::{
    check_range, names, read_only_variable, unknown_variable, Component, ComponentKind,
    StepContext,
};
use hydrosim_core::errors::HydroResult;
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::{VariableDefinition, VariableType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const MAX_LAG: f64 = 1000.0;

/// Translates the inflow by a whole number of time steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lag {
    lag: usize,
    /// Inflows still in transit, oldest first.
    in_transit: VecDeque<f64>,
    inflow: f64,
    outflow: f64,
}

impl Default for Lag {
    fn default() -> Self {
        Self {
            lag: 0,
            in_transit: VecDeque::new(),
            inflow: 0.0,
            outflow: 0.0,
        }
    }
}

impl Lag {
    pub const ID: &'static str = "Lag";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }

    fn set_lag(&mut self, lag: usize) {
        self.lag = lag;
        while self.in_transit.len() > lag {
            self.in_transit.pop_front();
        }
        while self.in_transit.len() < lag {
            self.in_transit.push_front(0.0);
        }
    }
}

#[typetag::serde]
impl Component for Lag {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Routing
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter("Lag", "steps").with_type(VariableType::Integer),
            VariableDefinition::input(names::INFLOW, "m3/s"),
            VariableDefinition::output(names::OUTFLOW, "m3/s"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            "Lag" => Some(self.lag as f64),
            names::INFLOW => Some(self.inflow),
            names::OUTFLOW => Some(self.outflow),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            "Lag" => {
                check_range(name, value, 0.0, MAX_LAG)?;
                self.set_lag(value.round() as usize)
            }
            names::INFLOW => self.inflow = value,
            names::OUTFLOW => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        self.in_transit.push_back(self.inflow);
        self.outflow = self.in_transit.pop_front().unwrap_or(self.inflow);
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        let mut state = ModelState::new();
        let in_transit: Vec<f64> = self.in_transit.iter().copied().collect();
        state.insert_sequence("InTransit", &in_transit);
        state
    }

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()> {
        if let Some(values) = state.get_sequence("InTransit", self.lag) {
            self.in_transit = values.into();
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.in_transit.iter_mut().for_each(|q| *q = 0.0);
        self.outflow = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::test_utils::route;

    #[test]
    fn inflow_is_delayed() {
        let mut lag = Lag::default();
        lag.set_variable("Lag", 2.0).unwrap();
        let outflow = route(&mut lag, &[5.0, 3.0, 1.0, 0.0, 0.0], 3600.0);
        assert_eq!(outflow, vec![0.0, 0.0, 5.0, 3.0, 1.0]);
    }

    #[test]
    fn zero_lag_passes_through() {
        let mut lag = Lag::default();
        assert_eq!(route(&mut lag, &[5.0, 3.0], 3600.0), vec![5.0, 3.0]);
    }

    #[test]
    fn transit_is_part_of_the_state() {
        let mut lag = Lag::default();
        lag.set_variable("Lag", 3.0).unwrap();
        route(&mut lag, &[1.0, 2.0], 3600.0);
        let state = lag.get_state();
        assert_eq!(state.get_sequence("InTransit", 3).unwrap(), vec![0.0, 1.0, 2.0]);

        let mut other = Lag::default();
        other.set_variable("Lag", 3.0).unwrap();
        other.set_state(&state).unwrap();
        assert_eq!(route(&mut other, &[0.0, 0.0], 3600.0), vec![0.0, 1.0]);

        assert!(lag.set_variable("Lag", -1.0).is_err());
        lag.reset();
        assert_eq!(route(&mut lag, &[0.0; 3], 3600.0), vec![0.0; 3]);
    }
}
