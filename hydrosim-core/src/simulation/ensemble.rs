//! Ensemble forecasts run from a rolling forecast origin.
//!
//! A template simulation is warmed up on observed inputs up to each forecast origin. The
//! warmed-up state is then replicated once per ensemble member, each member is driven by its
//! own input over the lead time, and the recorded outputs are gathered per forecast as
//! `members x lead time` arrays.

use crate::errors::{HydroError, HydroResult};
use crate::timeseries::{Instant, TimeSeries};
use crate::variable::VariableId;
use indexmap::IndexMap;
use log::debug;
use ndarray::{Array2, Axis};

use super::runtime::Simulation;

#[derive(Debug, Clone)]
pub struct EnsembleForecastSimulation {
    template: Simulation,
    forecast_start: Instant,
    ensemble_size: usize,
    lead_time: usize,
    num_forecasts: usize,
    steps_between_forecasts: usize,
    /// Per variable, one `members x lead time` array per forecast.
    inputs: IndexMap<String, Vec<Array2<f64>>>,
    recorded: IndexMap<String, Vec<Array2<f64>>>,
}

impl EnsembleForecastSimulation {
    /// Set up forecasts issued at `forecast_start` and then every `steps_between_forecasts`.
    ///
    /// The template provides the network, the played observed inputs used for warm-up and
    /// the time step. Its span start is the start of the warm-up.
    pub fn new(
        template: &Simulation,
        forecast_start: Instant,
        ensemble_size: usize,
        lead_time: usize,
        num_forecasts: usize,
        steps_between_forecasts: usize,
    ) -> HydroResult<Self> {
        if ensemble_size == 0 || lead_time == 0 || num_forecasts == 0 {
            return Err(HydroError::Configuration(
                "ensemble size, lead time and number of forecasts must be positive".to_string(),
            ));
        }
        if num_forecasts > 1 && steps_between_forecasts == 0 {
            return Err(HydroError::Configuration(
                "successive forecasts must be at least one step apart".to_string(),
            ));
        }
        let warmup = template
            .time_step()
            .steps_between(template.start(), forecast_start)?;
        if warmup < 0 {
            return Err(HydroError::Configuration(format!(
                "forecast start {} is before the start of the simulation {}",
                forecast_start,
                template.start()
            )));
        }
        let mut template = template.clone();
        template.clear_recorders();
        Ok(Self {
            template,
            forecast_start,
            ensemble_size,
            lead_time,
            num_forecasts,
            steps_between_forecasts,
            inputs: IndexMap::new(),
            recorded: IndexMap::new(),
        })
    }

    pub fn ensemble_size(&self) -> usize {
        self.ensemble_size
    }

    pub fn lead_time(&self) -> usize {
        self.lead_time
    }

    pub fn num_forecasts(&self) -> usize {
        self.num_forecasts
    }

    /// Issue time of a forecast.
    pub fn forecast_origin(&self, forecast_index: usize) -> HydroResult<Instant> {
        self.check_forecast_index(forecast_index)?;
        self.template.time_step().add_steps(
            self.forecast_start,
            (forecast_index * self.steps_between_forecasts) as i64,
        )
    }

    fn check_forecast_index(&self, forecast_index: usize) -> HydroResult<()> {
        if forecast_index >= self.num_forecasts {
            return Err(HydroError::DataAvailability(format!(
                "forecast {} requested, only {} are issued",
                forecast_index, self.num_forecasts
            )));
        }
        Ok(())
    }

    /// Drive a variable with ensemble inputs, one `members x lead time` array per forecast.
    pub fn play_ensemble_input(
        &mut self,
        variable_id: &str,
        inputs: Vec<Array2<f64>>,
    ) -> HydroResult<()> {
        let id = VariableId::parse(variable_id)?;
        self.template.network().check_variable(&id, true)?;
        if inputs.len() != self.num_forecasts {
            return Err(HydroError::Configuration(format!(
                "{} ensemble inputs given for {} forecasts",
                inputs.len(),
                self.num_forecasts
            )));
        }
        let expected = (self.ensemble_size, self.lead_time);
        if let Some(bad) = inputs.iter().find(|a| a.dim() != expected) {
            return Err(HydroError::Configuration(format!(
                "ensemble input of shape {:?}, expected {:?}",
                bad.dim(),
                expected
            )));
        }
        self.inputs.insert(id.to_string(), inputs);
        Ok(())
    }

    pub fn record(&mut self, variable_id: &str) -> HydroResult<()> {
        let id = VariableId::parse(variable_id)?;
        self.template.network().check_variable(&id, false)?;
        self.recorded.insert(id.to_string(), Vec::new());
        Ok(())
    }

    /// Warm up and run every forecast.
    pub fn execute(&mut self) -> HydroResult<()> {
        let time_step = self.template.time_step();
        let mut warm = self.template.clone();
        warm.reset_states()?;
        let mut cursor = self.template.start();

        for buffers in self.recorded.values_mut() {
            buffers.clear();
        }

        for forecast in 0..self.num_forecasts {
            let origin = self.forecast_origin(forecast)?;
            if origin > cursor {
                warm.set_span(cursor, time_step.add_steps(origin, -1)?)?;
                warm.execute(false)?;
                cursor = origin;
            }
            debug!(
                "forecast {} issued at {} with {} members",
                forecast, origin, self.ensemble_size
            );

            let lead_end = time_step.add_steps(origin, self.lead_time as i64 - 1)?;
            let mut results: Vec<Array2<f64>> = self
                .recorded
                .keys()
                .map(|_| Array2::from_elem((self.ensemble_size, self.lead_time), f64::NAN))
                .collect();
            for member in 0..self.ensemble_size {
                let mut simulation = warm.clone();
                simulation.set_span(origin, lead_end)?;
                for (variable, inputs) in &self.inputs {
                    let values = inputs[forecast].row(member).to_vec();
                    simulation.play(variable, TimeSeries::from_vec(origin, time_step, values))?;
                }
                for variable in self.recorded.keys() {
                    simulation.record(variable)?;
                }
                simulation.execute(false)?;
                for (variable, result) in self.recorded.keys().zip(results.iter_mut()) {
                    let series = simulation.get_recorded(variable)?;
                    for (target, value) in result
                        .index_axis_mut(Axis(0), member)
                        .iter_mut()
                        .zip(series.values())
                    {
                        *target = *value;
                    }
                }
            }
            for (buffers, result) in self.recorded.values_mut().zip(results) {
                buffers.push(result);
            }
        }
        Ok(())
    }

    /// Recorded output of one forecast, `members x lead time`.
    pub fn get_ensemble_recorded(
        &self,
        variable_id: &str,
        forecast_index: usize,
    ) -> HydroResult<Array2<f64>> {
        self.check_forecast_index(forecast_index)?;
        let key = VariableId::parse(variable_id)?.to_string();
        let buffers = self.recorded.get(&key).ok_or_else(|| {
            HydroError::DataAvailability(format!("no recorder is attached to {}", variable_id))
        })?;
        buffers.get(forecast_index).cloned().ok_or_else(|| {
            HydroError::DataAvailability(format!(
                "forecast {} of {} has not been run",
                forecast_index, variable_id
            ))
        })
    }

    /// Recorded output of one member of one forecast, starting at the forecast origin.
    pub fn get_single_recorded(
        &self,
        variable_id: &str,
        forecast_index: usize,
        member: usize,
    ) -> HydroResult<TimeSeries> {
        let ensemble = self.get_ensemble_recorded(variable_id, forecast_index)?;
        if member >= self.ensemble_size {
            return Err(HydroError::DataAvailability(format!(
                "member {} requested from an ensemble of {}",
                member, self.ensemble_size
            )));
        }
        Ok(TimeSeries::from_vec(
            self.forecast_origin(forecast_index)?,
            self.template.time_step(),
            ensemble.row(member).to_vec(),
        ))
    }

    /// A single recorded value addressed by forecast, lead time and member.
    pub fn get_recorded_value(
        &self,
        variable_id: &str,
        forecast_index: usize,
        lead_time_index: usize,
        member: usize,
    ) -> HydroResult<f64> {
        let ensemble = self.get_ensemble_recorded(variable_id, forecast_index)?;
        ensemble
            .get((member, lead_time_index))
            .copied()
            .ok_or_else(|| {
                HydroError::DataAvailability(format!(
                    "no value at lead time {} for member {}",
                    lead_time_index, member
                ))
            })
    }
}
