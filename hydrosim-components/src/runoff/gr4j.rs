//! GR4J rainfall-runoff model
//!
//! Four parameter conceptual model with a production (soil) store, a non-linear routing store
//! and two unit hydrographs. The time base `x4` is expressed in time steps, so the model runs
//! at any regular time step provided the parameters are set accordingly.

use hydrosim_core::component::{
    check_range, names, read_only_variable, unknown_variable, Component, ComponentKind,
    StepContext,
};
use hydrosim_core::errors::HydroResult;
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::VariableDefinition;
use log::debug;
use serde::{Deserialize, Serialize};

use super::unit_hydrograph::UnitHydrograph;

const VAR_PRODUCTION_STORE: &str = "S";
const VAR_ROUTING_STORE: &str = "R";
const VAR_NET_INFILTRATION: &str = "Ps";
const VAR_STORE_EVAPORATION: &str = "Es";
const VAR_PERCOLATION: &str = "Perc";
const VAR_EXCHANGE: &str = "F";
const VAR_ROUTED_FLOW: &str = "Qr";
const VAR_DIRECT_FLOW: &str = "Qd";

/// Share of effective rainfall going through UH1 and the routing store.
const UH1_SPLIT: f64 = 0.9;
/// Largest argument passed to `tanh`.
const MAX_TANH_ARG: f64 = 13.0;
/// `(9/4)^4`
const PERCOLATION_CONSTANT: f64 = 25.62890625;

/// Parameters of GR4J
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gr4jParameters {
    /// Capacity of the production store
    /// unit: mm
    pub x1: f64,
    /// Groundwater exchange coefficient
    /// unit: mm
    pub x2: f64,
    /// Capacity of the routing store
    /// unit: mm
    pub x3: f64,
    /// Time base of the unit hydrographs
    /// unit: time steps
    pub x4: f64,
}

impl Default for Gr4jParameters {
    fn default() -> Self {
        Self {
            x1: 350.0,
            x2: 0.0,
            x3: 90.0,
            x4: 1.7,
        }
    }
}

impl Gr4jParameters {
    /// Feasible range of each parameter.
    pub fn bounds(name: &str) -> Option<(f64, f64)> {
        match name {
            "x1" => Some((1.0, 3000.0)),
            "x2" => Some((-27.0, 27.0)),
            "x3" => Some((1.0, 660.0)),
            "x4" => Some((1.0, 240.0)),
            _ => None,
        }
    }
}

/// GR4J
///
/// On each step, with `P` rainfall and `E` potential evapotranspiration:
///
/// - the net rainfall `Pn = P - E` partly fills the production store `S`, or the net
///   evaporation `En = E - P` empties it;
/// - the store percolates `Perc = S (1 - (1 + (S / x1)^4 / 25.63)^-1/4)`;
/// - the effective rainfall `Pr = Perc + Pn - Ps` is split 90/10 between UH1 and UH2;
/// - the exchange `F = x2 (R / x3)^3.5` is added to both branches;
/// - the routing store `R` releases `Qr = R (1 - (1 + (R / x3)^4)^-1/4)`.
///
/// The runoff is `Qr + max(0, Q1 + F)` where `Q1` is the output of UH2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gr4j {
    parameters: Gr4jParameters,
    production_store: f64,
    routing_store: f64,
    uh1: UnitHydrograph,
    uh2: UnitHydrograph,
    rainfall: f64,
    evapotranspiration: f64,
    net_infiltration: f64,
    store_evaporation: f64,
    percolation: f64,
    exchange: f64,
    routed_flow: f64,
    direct_flow: f64,
    runoff: f64,
}

impl Default for Gr4j {
    fn default() -> Self {
        Self::from_parameters(Gr4jParameters::default())
    }
}

impl Gr4j {
    pub const ID: &'static str = "GR4J";

    pub fn from_parameters(parameters: Gr4jParameters) -> Self {
        let x4 = parameters.x4;
        Self {
            parameters,
            production_store: 0.0,
            routing_store: 0.0,
            uh1: UnitHydrograph::uh1(x4),
            uh2: UnitHydrograph::uh2(x4),
            rainfall: 0.0,
            evapotranspiration: 0.0,
            net_infiltration: 0.0,
            store_evaporation: 0.0,
            percolation: 0.0,
            exchange: 0.0,
            routed_flow: 0.0,
            direct_flow: 0.0,
            runoff: 0.0,
        }
    }

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }

    pub fn parameters(&self) -> &Gr4jParameters {
        &self.parameters
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> HydroResult<()> {
        if let Some((min, max)) = Gr4jParameters::bounds(name) {
            check_range(name, value, min, max)?;
        }
        match name {
            "x1" => self.parameters.x1 = value,
            "x2" => self.parameters.x2 = value,
            "x3" => self.parameters.x3 = value,
            "x4" => {
                self.parameters.x4 = value;
                self.uh1.reshape(UnitHydrograph::uh1(value));
                self.uh2.reshape(UnitHydrograph::uh2(value));
            }
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    /// Fill or empty the production store.
    fn production(&mut self) -> f64 {
        let x1 = self.parameters.x1;
        let ratio = self.production_store / x1;
        if self.rainfall >= self.evapotranspiration {
            let net_rainfall = self.rainfall - self.evapotranspiration;
            let t = (net_rainfall / x1).min(MAX_TANH_ARG).tanh();
            let infiltration = x1 * (1.0 - ratio * ratio) * t / (1.0 + ratio * t);
            self.net_infiltration = infiltration;
            self.store_evaporation = 0.0;
            self.production_store += infiltration;
            net_rainfall - infiltration
        } else {
            let net_evaporation = self.evapotranspiration - self.rainfall;
            let t = (net_evaporation / x1).min(MAX_TANH_ARG).tanh();
            let evaporation =
                self.production_store * (2.0 - ratio) * t / (1.0 + (1.0 - ratio) * t);
            self.net_infiltration = 0.0;
            self.store_evaporation = evaporation;
            self.production_store -= evaporation;
            0.0
        }
    }

    fn percolate(&mut self) -> f64 {
        let store = self.production_store.max(0.0);
        let ratio = store / self.parameters.x1;
        let percolation =
            store * (1.0 - (1.0 + ratio.powi(4) / PERCOLATION_CONSTANT).powf(-0.25));
        self.production_store = store - percolation;
        percolation
    }
}

#[typetag::serde]
impl Component for Gr4j {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Runoff
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter("x1", "mm"),
            VariableDefinition::parameter("x2", "mm"),
            VariableDefinition::parameter("x3", "mm"),
            VariableDefinition::parameter("x4", "steps"),
            VariableDefinition::state(VAR_PRODUCTION_STORE, "mm"),
            VariableDefinition::state(VAR_ROUTING_STORE, "mm"),
            VariableDefinition::input(names::RAINFALL, "mm"),
            VariableDefinition::input(names::EVAPOTRANSPIRATION, "mm"),
            VariableDefinition::output(VAR_NET_INFILTRATION, "mm"),
            VariableDefinition::output(VAR_STORE_EVAPORATION, "mm"),
            VariableDefinition::output(VAR_PERCOLATION, "mm"),
            VariableDefinition::output(VAR_EXCHANGE, "mm"),
            VariableDefinition::output(VAR_ROUTED_FLOW, "mm"),
            VariableDefinition::output(VAR_DIRECT_FLOW, "mm"),
            VariableDefinition::output(names::RUNOFF, "mm"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            "x1" => Some(self.parameters.x1),
            "x2" => Some(self.parameters.x2),
            "x3" => Some(self.parameters.x3),
            "x4" => Some(self.parameters.x4),
            VAR_PRODUCTION_STORE => Some(self.production_store),
            VAR_ROUTING_STORE => Some(self.routing_store),
            names::RAINFALL => Some(self.rainfall),
            names::EVAPOTRANSPIRATION => Some(self.evapotranspiration),
            VAR_NET_INFILTRATION => Some(self.net_infiltration),
            VAR_STORE_EVAPORATION => Some(self.store_evaporation),
            VAR_PERCOLATION => Some(self.percolation),
            VAR_EXCHANGE => Some(self.exchange),
            VAR_ROUTED_FLOW => Some(self.routed_flow),
            VAR_DIRECT_FLOW => Some(self.direct_flow),
            names::RUNOFF => Some(self.runoff),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            "x1" | "x2" | "x3" | "x4" => return self.set_parameter(name, value),
            VAR_PRODUCTION_STORE => {
                check_range(name, value, 0.0, self.parameters.x1)?;
                self.production_store = value
            }
            VAR_ROUTING_STORE => {
                check_range(name, value, 0.0, self.parameters.x3)?;
                self.routing_store = value
            }
            names::RAINFALL => self.rainfall = value,
            names::EVAPOTRANSPIRATION => self.evapotranspiration = value,
            VAR_NET_INFILTRATION | VAR_STORE_EVAPORATION | VAR_PERCOLATION | VAR_EXCHANGE
            | VAR_ROUTED_FLOW | VAR_DIRECT_FLOW | names::RUNOFF => {
                return Err(read_only_variable(self, name))
            }
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        let excess = self.production();
        self.percolation = self.percolate();
        let effective_rainfall = self.percolation + excess;

        let q9 = self.uh1.convolve(UH1_SPLIT * effective_rainfall);
        let q1 = self.uh2.convolve((1.0 - UH1_SPLIT) * effective_rainfall);

        let x3 = self.parameters.x3;
        self.exchange = self.parameters.x2 * (self.routing_store / x3).powf(3.5);
        let store = (self.routing_store + q9 + self.exchange).max(0.0);
        self.routed_flow = store * (1.0 - (1.0 + (store / x3).powi(4)).powf(-0.25));
        self.routing_store = store - self.routed_flow;

        self.direct_flow = (q1 + self.exchange).max(0.0);
        self.runoff = self.routed_flow + self.direct_flow;
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        let mut state = ModelState::new()
            .with(VAR_PRODUCTION_STORE, self.production_store)
            .with(VAR_ROUTING_STORE, self.routing_store);
        state.insert_sequence("UH1", self.uh1.stores());
        state.insert_sequence("UH2", self.uh2.stores());
        state
    }

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()> {
        if let Some(v) = state.get(VAR_PRODUCTION_STORE) {
            self.production_store = v;
        }
        if let Some(v) = state.get(VAR_ROUTING_STORE) {
            self.routing_store = v;
        }
        // Pending hydrograph flows only carry over when x4 is unchanged
        for (prefix, uh) in [("UH1", &mut self.uh1), ("UH2", &mut self.uh2)] {
            match state.get_sequence(prefix, uh.len()) {
                Some(stores) => {
                    uh.set_stores(stores);
                }
                None => debug!(
                    "state has no {} stores of length {}, keeping the current ones",
                    prefix,
                    uh.len()
                ),
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.production_store = 0.0;
        self.routing_store = 0.0;
        self.uh1.clear();
        self.uh2.clear();
        self.runoff = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn context() -> StepContext {
        StepContext {
            time_index: 0,
            time: NaiveDate::from_ymd_opt(2000, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            dt_seconds: 86_400.0,
            seed: 0,
        }
    }

    fn run(model: &mut Gr4j, rainfall: &[f64], pet: f64) -> Vec<f64> {
        rainfall
            .iter()
            .map(|p| {
                model.set_variable("P", *p).unwrap();
                model.set_variable("E", pet).unwrap();
                model.step(&context()).unwrap();
                model.get_variable("runoff").unwrap()
            })
            .collect()
    }

    #[test]
    fn water_balance_closes_without_exchange() {
        let mut model = Gr4j::default();
        model.set_variable("S", 100.0).unwrap();
        let rainfall = [20.0, 35.0, 0.0, 5.0, 0.0, 0.0, 12.0, 0.0, 0.0, 0.0];
        let runoff = run(&mut model, &rainfall, 0.0);

        let pending: f64 = model.uh1.stores().iter().sum::<f64>()
            + model.uh2.stores().iter().sum::<f64>()
            - model.uh1.stores()[0]
            - model.uh2.stores()[0];
        let stored = model.production_store + model.routing_store + pending;
        let inputs = 100.0 + rainfall.iter().sum::<f64>();
        assert_relative_eq!(
            runoff.iter().sum::<f64>() + stored,
            inputs,
            epsilon = 1e-9
        );
        assert!(runoff.iter().all(|q| *q >= 0.0));
    }

    #[test]
    fn evaporation_empties_the_production_store() {
        let mut model = Gr4j::default();
        model.set_variable("S", 200.0).unwrap();
        run(&mut model, &[0.0; 5], 5.0);
        let store = model.get_variable("S").unwrap();
        assert!(store < 200.0 && store > 0.0);
        assert!(model.get_variable("Es").unwrap() > 0.0);
    }

    #[test]
    fn parameters_are_bounded() {
        let mut model = Gr4j::default();
        assert!(model.set_variable("x1", 0.5).is_err());
        assert_eq!(model.get_variable("x1"), Some(350.0));
        assert!(model.set_variable("runoff", 1.0).is_err());
        assert!(model.set_variable("S", 400.0).is_err());
        model.set_variable("x4", 3.5).unwrap();
        assert_eq!(model.uh1.len(), 4);
        assert_eq!(model.uh2.len(), 7);
    }

    #[test]
    fn states_restart_identically() {
        let mut model = Gr4j::default();
        run(&mut model, &[30.0, 10.0, 0.0], 2.0);
        let state = model.get_state();
        let mut restarted = Gr4j::default();
        restarted.set_state(&state).unwrap();

        let a = run(&mut model, &[0.0, 8.0, 0.0, 0.0], 2.0);
        let b = run(&mut restarted, &[0.0, 8.0, 0.0, 0.0], 2.0);
        assert_eq!(a, b);

        model.reset();
        assert_eq!(model.get_variable("S"), Some(0.0));
        assert!(model.uh1.stores().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn serialises_as_a_tagged_component() {
        let mut model = Gr4j::default();
        model.set_variable("x4", 2.5).unwrap();
        run(&mut model, &[30.0, 10.0], 2.0);
        let boxed: Box<dyn Component> = Box::new(model.clone());

        let json = serde_json::to_string(&boxed).unwrap();
        assert!(json.contains(Gr4j::ID));
        let restored: Box<dyn Component> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.model_id(), Gr4j::ID);
        assert_eq!(restored.get_state(), model.get_state());
        assert_eq!(restored.get_variable("x4"), Some(2.5));
    }
}
