use hydrosim_core::component::{
    check_range, names, read_only_variable, unknown_variable, Component, ComponentKind,
    StepContext,
};
use hydrosim_core::errors::HydroResult;
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::{VariableDefinition, VariableType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::LogSinh;

const VAR_RESIDUAL: &str = "Residual";
const VAR_UNCORRECTED: &str = "Uncorrected";
const MAX_WINDOW: f64 = 1000.0;

/// Transform and autoregressive parameters shared by the error-correction models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrisParameters {
    /// Log of the offset of the log-sinh transform
    pub a: f64,
    /// Log of the scale of the log-sinh transform
    pub b: f64,
    /// Lag-one autocorrelation of the transformed residuals
    pub rho: f64,
    /// Standard deviation of the innovations of the transformed residuals
    pub sigma: f64,
}

impl Default for ErrisParameters {
    fn default() -> Self {
        Self {
            a: -3.0,
            b: -3.0,
            rho: 0.9,
            sigma: 1.0,
        }
    }
}

impl ErrisParameters {
    pub fn transform(&self) -> LogSinh {
        LogSinh::new(self.a, self.b)
    }

    fn get(&self, name: &str) -> Option<f64> {
        match name {
            "a" => Some(self.a),
            "b" => Some(self.b),
            "Rho" => Some(self.rho),
            "Sigma" => Some(self.sigma),
            _ => None,
        }
    }

    /// Returns `false` for names that are not error model parameters.
    fn set(&mut self, name: &str, value: f64) -> HydroResult<bool> {
        match name {
            "a" | "b" => check_range(name, value, -30.0, 30.0)?,
            "Rho" => check_range(name, value, -1.0, 1.0)?,
            "Sigma" => check_range(name, value, 0.0, f64::MAX)?,
            _ => return Ok(false),
        }
        match name {
            "a" => self.a = value,
            "b" => self.b = value,
            "Rho" => self.rho = value,
            _ => self.sigma = value,
        }
        Ok(true)
    }

    fn definitions() -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter("a", "-"),
            VariableDefinition::parameter("b", "-"),
            VariableDefinition::parameter("Rho", "-"),
            VariableDefinition::parameter("Sigma", "-"),
        ]
    }
}

/// State of the residual updating, common to ERRIS and MAERRIS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Updater {
    inflow: f64,
    /// Missing observations are NaN, which JSON cannot hold.
    #[serde(skip, default = "missing")]
    observation: f64,
    outflow: f64,
    /// Last transformed residual, observed or predicted.
    residual: f64,
}

fn missing() -> f64 {
    f64::NAN
}

impl Updater {
    fn new() -> Self {
        Self {
            observation: f64::NAN,
            ..Default::default()
        }
    }

    /// Correct the simulated inflow given the mean the residual reverts to, then update the
    /// residual from the observation if there is one.
    fn step(&mut self, parameters: &ErrisParameters, mean: f64) -> f64 {
        let transform = parameters.transform();
        let simulated = self.inflow.max(0.0);
        let z = transform.forward(simulated);
        let predicted = mean + parameters.rho * (self.residual - mean);
        self.outflow = transform.inverse(z + predicted).max(0.0);
        self.residual = if self.observation.is_finite() {
            transform.forward(self.observation.max(0.0)) - z
        } else {
            predicted
        };
        self.residual
    }

    fn get(&self, name: &str) -> Option<f64> {
        match name {
            names::INFLOW | VAR_UNCORRECTED => Some(self.inflow),
            names::OBSERVATION => Some(self.observation),
            names::OUTFLOW => Some(self.outflow),
            VAR_RESIDUAL => Some(self.residual),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.residual = 0.0;
        self.outflow = 0.0;
    }
}

/// ERRIS error correction
///
/// Simulated flows are corrected with an AR(1) model of the residuals in log-sinh
/// transformed space. When an observation is played for the step, the residual is updated
/// from it after the correction; otherwise the predicted residual decays by `Rho` every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Erris {
    pub parameters: ErrisParameters,
    updater: Updater,
}

impl Default for Erris {
    fn default() -> Self {
        Self {
            parameters: ErrisParameters::default(),
            updater: Updater::new(),
        }
    }
}

impl Erris {
    pub const ID: &'static str = "ERRIS";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }
}

fn io_definitions() -> Vec<VariableDefinition> {
    vec![
        VariableDefinition::state(VAR_RESIDUAL, "-"),
        VariableDefinition::input(names::INFLOW, "m3/s"),
        VariableDefinition::input(names::OBSERVATION, "m3/s"),
        VariableDefinition::output(VAR_UNCORRECTED, "m3/s"),
        VariableDefinition::output(names::OUTFLOW, "m3/s"),
    ]
}

#[typetag::serde]
impl Component for Erris {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::ErrorCorrection
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        let mut definitions = ErrisParameters::definitions();
        definitions.extend(io_definitions());
        definitions
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        self.parameters
            .get(name)
            .or_else(|| self.updater.get(name))
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        if self.parameters.set(name, value)? {
            return Ok(());
        }
        match name {
            VAR_RESIDUAL => self.updater.residual = value,
            names::INFLOW => self.updater.inflow = value,
            names::OBSERVATION => self.updater.observation = value,
            names::OUTFLOW | VAR_UNCORRECTED => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        self.updater.step(&self.parameters, 0.0);
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        ModelState::new().with(VAR_RESIDUAL, self.updater.residual)
    }

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()> {
        if let Some(v) = state.get(VAR_RESIDUAL) {
            self.updater.residual = v;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.updater.reset();
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

/// MAERRIS error correction
///
/// As [`Erris`], the residual reverting to its trailing moving average over `s2Window`
/// steps instead of zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maerris {
    pub parameters: ErrisParameters,
    window: usize,
    recent: VecDeque<f64>,
    updater: Updater,
}

impl Default for Maerris {
    fn default() -> Self {
        Self {
            parameters: ErrisParameters::default(),
            window: 5,
            recent: VecDeque::new(),
            updater: Updater::new(),
        }
    }
}

impl Maerris {
    pub const ID: &'static str = "MAERRIS";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self::default())
    }

    fn moving_average(&self) -> f64 {
        if self.recent.is_empty() {
            0.0
        } else {
            self.recent.iter().sum::<f64>() / self.recent.len() as f64
        }
    }
}

#[typetag::serde]
impl Component for Maerris {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::ErrorCorrection
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        let mut definitions = ErrisParameters::definitions();
        definitions
            .push(VariableDefinition::parameter("s2Window", "steps").with_type(VariableType::Integer));
        definitions.extend(io_definitions());
        definitions
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        if name == "s2Window" {
            return Some(self.window as f64);
        }
        self.parameters
            .get(name)
            .or_else(|| self.updater.get(name))
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        if self.parameters.set(name, value)? {
            return Ok(());
        }
        match name {
            "s2Window" => {
                check_range(name, value, 1.0, MAX_WINDOW)?;
                self.window = value.round() as usize;
                while self.recent.len() > self.window {
                    self.recent.pop_front();
                }
            }
            VAR_RESIDUAL => self.updater.residual = value,
            names::INFLOW => self.updater.inflow = value,
            names::OBSERVATION => self.updater.observation = value,
            names::OUTFLOW | VAR_UNCORRECTED => return Err(read_only_variable(self, name)),
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn step(&mut self, _context: &StepContext) -> HydroResult<()> {
        let mean = self.moving_average();
        let residual = self.updater.step(&self.parameters, mean);
        self.recent.push_back(residual);
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
        Ok(())
    }

    fn get_state(&self) -> ModelState {
        let mut state = ModelState::new().with(VAR_RESIDUAL, self.updater.residual);
        let recent: Vec<f64> = self.recent.iter().copied().collect();
        state.insert("RecentCount", recent.len() as f64);
        state.insert_sequence("Recent", &recent);
        state
    }

    fn set_state(&mut self, state: &ModelState) -> HydroResult<()> {
        if let Some(v) = state.get(VAR_RESIDUAL) {
            self.updater.residual = v;
        }
        let count = state.get("RecentCount").unwrap_or(0.0) as usize;
        if let Some(recent) = state.get_sequence("Recent", count.min(self.window)) {
            self.recent = recent.into();
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.updater.reset();
        self.recent.clear();
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

    fn correct(model: &mut dyn Component, simulated: f64, observed: f64) -> f64 {
        model.set_variable("Inflow", simulated).unwrap();
        model.set_variable("Observation", observed).unwrap();
        model.step(&context()).unwrap();
        model.get_variable("Outflow").unwrap()
    }

    #[test]
    fn perfect_simulations_are_unchanged() {
        let mut erris = Erris::default();
        for q in [1.0, 5.0, 20.0] {
            assert_relative_eq!(correct(&mut erris, q, q), q, epsilon = 1e-9);
        }
        assert_relative_eq!(erris.get_variable("Residual").unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn corrections_decay_without_observations() {
        let mut erris = Erris::default();
        erris.set_variable("Rho", 0.5).unwrap();
        correct(&mut erris, 10.0, 12.0);
        let first = correct(&mut erris, 10.0, f64::NAN);
        let second = correct(&mut erris, 10.0, f64::NAN);
        assert!(first > second && second > 10.0);

        let residual = erris.get_variable("Residual").unwrap();
        let transform = erris.parameters.transform();
        let initial = transform.forward(12.0) - transform.forward(10.0);
        assert_relative_eq!(residual, 0.25 * initial, epsilon = 1e-12);

        erris.reset();
        assert_relative_eq!(correct(&mut erris, 10.0, f64::NAN), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn parameters_are_checked() {
        let mut erris = Erris::default();
        assert!(erris.set_variable("Rho", 1.5).is_err());
        assert_eq!(erris.get_variable("Rho"), Some(0.9));
        assert!(erris.set_variable("Outflow", 1.0).is_err());
        assert!(erris.set_variable("s2Window", 3.0).is_err());
    }

    #[test]
    fn maerris_reverts_to_the_moving_average() {
        let mut maerris = Maerris::default();
        maerris.set_variable("s2Window", 2.0).unwrap();
        maerris.set_variable("Rho", 0.0).unwrap();
        correct(&mut maerris, 10.0, 12.0);
        correct(&mut maerris, 10.0, 12.0);
        // With no autocorrelation the forecast residual is the moving average
        let corrected = correct(&mut maerris, 10.0, f64::NAN);
        assert_relative_eq!(corrected, 12.0, epsilon = 1e-9);

        let state = maerris.get_state();
        let mut restored = Maerris::default();
        restored.set_variable("s2Window", 2.0).unwrap();
        restored.set_state(&state).unwrap();
        assert_eq!(restored.recent, maerris.recent);
    }
}
