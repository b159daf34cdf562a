use hydrosim_core::component::{
    check_range, names, read_only_variable, unknown_variable, Component, ComponentKind,
    ReservoirCurve, StepContext,
};
use hydrosim_core::errors::{HydroError, HydroResult};
use hydrosim_core::interpolate::PiecewiseLinear;
use hydrosim_core::state::ModelState;
use hydrosim_core::variable::VariableDefinition;
use serde::{Deserialize, Serialize};

use super::split_spill;

const VAR_STORAGE: &str = "Storage";
const VAR_LEVEL: &str = "Level";
const VAR_AREA: &str = "Area";
const VAR_RELEASE: &str = "Release";
const VAR_SPILL: &str = "Spill";
const VAR_RAINFALL: &str = "Rainfall";
const VAR_EVAPORATION: &str = "Evaporation";

/// A reservoir described by its level relationships.
///
/// Each step:
///
/// 1. inflow and the net rainfall over the surface area at the current level are added;
/// 2. the level is read from the storage through the level to storage curve;
/// 3. the release is the operational release at that level, bounded by the minimum and
///    maximum discharge curves and by the water available;
/// 4. storage above the top of the level to storage curve spills.
///
/// Curves are clamped at their ends. Missing discharge curves do not constrain the
/// release and a missing operational release curve releases nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelVolumeAreaReservoir {
    level_storage: Option<PiecewiseLinear>,
    /// Cached inverse of `level_storage`.
    storage_level: Option<PiecewiseLinear>,
    level_area: Option<PiecewiseLinear>,
    min_discharge: Option<PiecewiseLinear>,
    max_discharge: Option<PiecewiseLinear>,
    ops_release: Option<PiecewiseLinear>,
    /// Storage on reset as a fraction of the capacity.
    initial_fraction: f64,
    storage: f64,
    inflow: f64,
    rainfall: f64,
    evaporation: f64,
    release: f64,
    spill: f64,
}

impl LevelVolumeAreaReservoir {
    pub const ID: &'static str = "LevelVolumeAreaReservoir";

    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            initial_fraction: 1.0,
            ..Default::default()
        })
    }

    /// Storage at the top of the level to storage curve.
    pub fn capacity(&self) -> Option<f64> {
        self.level_storage.as_ref().map(|c| c.max_y())
    }

    pub fn level(&self) -> Option<f64> {
        self.storage_level.as_ref().map(|c| c.evaluate(self.storage))
    }

    fn area(&self) -> f64 {
        match (&self.level_area, self.level()) {
            (Some(curve), Some(level)) => curve.evaluate(level),
            _ => 0.0,
        }
    }

    fn curves(&self) -> HydroResult<(&PiecewiseLinear, f64)> {
        match (&self.storage_level, self.capacity()) {
            (Some(curve), Some(capacity)) => Ok((curve, capacity)),
            _ => Err(HydroError::simulation(
                Self::ID,
                "no level to storage relationship is defined",
            )),
        }
    }
}

#[typetag::serde]
impl Component for LevelVolumeAreaReservoir {
    fn model_id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Reservoir
    }

    fn definitions(&self) -> Vec<VariableDefinition> {
        vec![
            VariableDefinition::parameter("InitialFraction", "-"),
            VariableDefinition::state(VAR_STORAGE, "m3"),
            VariableDefinition::input(names::INFLOW, "m3/s"),
            VariableDefinition::input(VAR_RAINFALL, "mm"),
            VariableDefinition::input(VAR_EVAPORATION, "mm"),
            VariableDefinition::output(VAR_LEVEL, "m"),
            VariableDefinition::output(VAR_AREA, "m2"),
            VariableDefinition::output(VAR_RELEASE, "m3/s"),
            VariableDefinition::output(VAR_SPILL, "m3/s"),
            VariableDefinition::output(names::OUTFLOW, "m3/s"),
        ]
    }

    fn get_variable(&self, name: &str) -> Option<f64> {
        match name {
            "InitialFraction" => Some(self.initial_fraction),
            VAR_STORAGE => Some(self.storage),
            names::INFLOW => Some(self.inflow),
            VAR_RAINFALL => Some(self.rainfall),
            VAR_EVAPORATION => Some(self.evaporation),
            VAR_LEVEL => Some(self.level().unwrap_or(f64::NAN)),
            VAR_AREA => Some(self.area()),
            VAR_RELEASE => Some(self.release),
            VAR_SPILL => Some(self.spill),
            names::OUTFLOW => Some(self.release + self.spill),
            _ => None,
        }
    }

    fn set_variable(&mut self, name: &str, value: f64) -> HydroResult<()> {
        match name {
            "InitialFraction" => {
                check_range(name, value, 0.0, 1.0)?;
                self.initial_fraction = value
            }
            VAR_STORAGE => {
                check_range(name, value, 0.0, self.capacity().unwrap_or(f64::MAX))?;
                self.storage = value
            }
            names::INFLOW => self.inflow = value,
            VAR_RAINFALL => self.rainfall = value,
            VAR_EVAPORATION => self.evaporation = value,
            VAR_LEVEL | VAR_AREA | VAR_RELEASE | VAR_SPILL | names::OUTFLOW => {
                return Err(read_only_variable(self, name))
            }
            _ => return Err(unknown_variable(self, name)),
        }
        Ok(())
    }

    fn set_curve(&mut self, curve: ReservoirCurve, values: PiecewiseLinear) -> HydroResult<()> {
        match curve {
            ReservoirCurve::LevelStorage => {
                // Storages must increase with the level for the curve to be invertible
                self.storage_level = Some(values.inverted()?);
                self.level_storage = Some(values);
                if let Some(capacity) = self.capacity() {
                    self.storage = self.storage.min(capacity);
                }
            }
            ReservoirCurve::LevelArea => self.level_area = Some(values),
            ReservoirCurve::MinDischarge => self.min_discharge = Some(values),
            ReservoirCurve::MaxDischarge => self.max_discharge = Some(values),
            ReservoirCurve::OpsRelease => self.ops_release = Some(values),
        }
        Ok(())
    }

    fn step(&mut self, context: &StepContext) -> HydroResult<()> {
        let dt = context.dt_seconds;
        let net_rainfall = (self.rainfall - self.evaporation) / 1000.0 * self.area();
        let (storage_level, capacity) = self.curves()?;
        let available = (self.storage + self.inflow * dt + net_rainfall).max(0.0);
        let level = storage_level.evaluate(available.min(capacity));

        let target = self
            .ops_release
            .as_ref()
            .map_or(0.0, |c| c.evaluate(level));
        let lower = self
            .min_discharge
            .as_ref()
            .map_or(0.0, |c| c.evaluate(level));
        let upper = self
            .max_discharge
            .as_ref()
            .map_or(f64::INFINITY, |c| c.evaluate(level));
        let release = target.max(lower).min(upper).min(available / dt);

        let (storage, spill) = split_spill(available - release * dt, capacity, dt);
        self.release = release;
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
        self.storage = self.initial_fraction * self.capacity().unwrap_or(0.0);
        self.release = 0.0;
        self.spill = 0.0;
    }

    fn box_clone(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}
