use super::{
    candidate_parameters, run_simulation, statistic_parameters, AlignedObservations,
    ObjectiveEvaluator, ObjectiveScores,
};
use crate::statistics::{Statistic, StatisticParameters};
use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::parameters::ParameterSpace;
use hydrosim_core::simulation::Simulation;
use hydrosim_core::timeseries::{Instant, TimeSeries};
use indexmap::IndexMap;

/// One statistic of one simulated variable against one observed series.
#[derive(Debug, Clone)]
pub struct SingleObjective {
    simulation: Simulation,
    variable_id: String,
    observations: AlignedObservations,
    statistic: Statistic,
    parameters: StatisticParameters,
}

impl SingleObjective {
    /// Create an evaluator of `statistic_id` for `variable_id` over `window`, the whole
    /// simulation span by default. A recorder is attached to the variable.
    pub fn new(
        mut simulation: Simulation,
        variable_id: &str,
        observed: &TimeSeries,
        statistic_id: &str,
        window: Option<(Instant, Instant)>,
    ) -> CalibrationResult<Self> {
        let statistic: Statistic = statistic_id.parse()?;
        let observations = AlignedObservations::new(simulation.span(), observed, window)?;
        simulation.record(variable_id)?;
        Ok(Self {
            simulation,
            variable_id: variable_id.to_string(),
            observations,
            statistic,
            parameters: StatisticParameters::new(),
        })
    }

    pub fn statistic(&self) -> Statistic {
        self.statistic
    }

    pub fn variable_id(&self) -> &str {
        &self.variable_id
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    /// Fix a statistic parameter. Candidates holding the same name override it.
    pub fn set_statistic_parameter(&mut self, name: &str, value: f64) -> CalibrationResult<()> {
        if !self.statistic.parameter_names().contains(&name) {
            return Err(CalibrationError::Configuration(format!(
                "{} has no parameter '{}'",
                self.statistic, name
            )));
        }
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }

    fn scores(&self, candidate: Option<&dyn ParameterSpace>) -> CalibrationResult<ObjectiveScores> {
        let recorded = self.simulation.get_recorded(&self.variable_id)?.to_vec();
        let simulated = self.observations.simulated(&recorded)?;
        let parameters = statistic_parameters(self.statistic, &self.parameters, candidate, "");
        let value = self
            .statistic
            .evaluate(&self.observations.values, simulated, &parameters)?;
        ObjectiveScores::new(
            IndexMap::from([(self.statistic.id().to_string(), value)]),
            candidate_parameters(candidate)?,
            self.is_maximizable(),
        )
    }
}

impl ObjectiveEvaluator for SingleObjective {
    fn is_maximizable(&self) -> bool {
        self.statistic.is_maximizable()
    }

    fn score_names(&self) -> Vec<String> {
        vec![self.statistic.id().to_string()]
    }

    fn evaluate_score(&mut self) -> CalibrationResult<ObjectiveScores> {
        run_simulation(&mut self.simulation, None, false)?;
        self.scores(None)
    }

    fn evaluate_score_for_parameters(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        run_simulation(&mut self.simulation, Some(parameters), false)?;
        self.scores(Some(parameters))
    }

    fn evaluate_score_for_parameters_init_state(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        run_simulation(&mut self.simulation, Some(parameters), true)?;
        self.scores(Some(parameters))
    }

    fn box_clone(&self) -> Box<dyn ObjectiveEvaluator> {
        Box::new(self.clone())
    }
}
