//! Objective evaluators: run a simulation and score it against observations.
//!
//! An evaluator owns its simulation. Evaluating a candidate applies the candidate's parameters,
//! executes the simulation from its initial states and computes the scores. Parameters held in
//! spaces with [`ApplyMode::None`](hydrosim_core::parameters::ApplyMode) are not written to the
//! simulation; evaluators read them as statistic parameters instead, e.g. the transform
//! parameters of a likelihood.

mod composite;
mod multisite;
mod scores;
mod single;

pub use composite::CompositeObjective;
pub use multisite::{known_mixing_ids, Mixing, MultisiteObjective, SiteDefinition};
pub use scores::{best_score, scores_to_parameter_spaces, sort_by_score, ObjectiveScores};
pub use single::SingleObjective;

pub(crate) use scores::to_cost;

use crate::statistics::{Statistic, StatisticParameters};
use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::parameters::ParameterSpace;
use hydrosim_core::simulation::Simulation;
use hydrosim_core::timeseries::{Instant, TimeSeries, TsGeometry};
use std::fmt::Debug;

/// Identifier of the state initialiser registered while evaluating with initial states.
const INIT_STATE_ID: &str = "objective-parameters";

/// Something that scores a parameter set.
pub trait ObjectiveEvaluator: Debug + Send + Sync {
    /// Whether larger values of the primary score are better.
    fn is_maximizable(&self) -> bool;

    /// Names of the scores produced, the primary score first.
    fn score_names(&self) -> Vec<String>;

    /// Score the model as currently parameterised.
    fn evaluate_score(&mut self) -> CalibrationResult<ObjectiveScores>;

    /// Apply the parameters, run the model and score it.
    fn evaluate_score_for_parameters(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores>;

    /// As [`evaluate_score_for_parameters`](Self::evaluate_score_for_parameters), with the
    /// parameters applied after the model states are reset, so that they may set states.
    fn evaluate_score_for_parameters_init_state(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        self.evaluate_score_for_parameters(parameters)
    }

    fn box_clone(&self) -> Box<dyn ObjectiveEvaluator>;

    /// Whether clones of the evaluator may be run on several threads at once.
    fn supports_thread_safe_cloning(&self) -> bool {
        true
    }
}

impl Clone for Box<dyn ObjectiveEvaluator> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Execute a simulation from its initial states, optionally with parameters applied first
/// or as a state initialiser.
fn run_simulation(
    simulation: &mut Simulation,
    parameters: Option<&dyn ParameterSpace>,
    init_state: bool,
) -> CalibrationResult<()> {
    match parameters {
        Some(p) if init_state => {
            simulation.add_state_initializer(INIT_STATE_ID, p.box_clone());
            let result = simulation.execute(true);
            simulation.remove_state_initializer(INIT_STATE_ID)?;
            result?;
        }
        Some(p) => {
            p.apply(simulation)?;
            simulation.execute(true)?;
        }
        None => simulation.execute(true)?,
    }
    Ok(())
}

/// Observations aligned on the steps of a simulation window.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AlignedObservations {
    /// Index of the first step of the window in the simulation span.
    pub first: usize,
    pub values: Vec<f64>,
}

impl AlignedObservations {
    /// Align `observed` on the steps of `span` within `window` (the whole span by default).
    /// Steps not covered by the observations are missing.
    pub fn new(
        span: &TsGeometry,
        observed: &TimeSeries,
        window: Option<(Instant, Instant)>,
    ) -> CalibrationResult<Self> {
        let span_end = span.end().ok_or_else(|| {
            CalibrationError::Configuration("the simulation span is empty".to_string())
        })?;
        let (start, end) = window.unwrap_or((span.start, span_end));
        let (first, last) = match (span.index_of(start), span.index_of(end)) {
            (Some(first), Some(last)) if first <= last => (first, last),
            _ => {
                return Err(CalibrationError::Configuration(format!(
                    "the window {} to {} is not within the simulation span {} to {}",
                    start, end, span.start, span_end
                )))
            }
        };
        let values = (first..=last)
            .map(|i| {
                span.time_at(i)
                    .and_then(|t| observed.value_at(t))
                    .unwrap_or(f64::NAN)
            })
            .collect();
        Ok(Self { first, values })
    }

    /// The simulated values matching the observations.
    pub fn simulated<'a>(&self, recorded: &'a [f64]) -> CalibrationResult<&'a [f64]> {
        recorded
            .get(self.first..self.first + self.values.len())
            .ok_or_else(|| {
                CalibrationError::Configuration(format!(
                    "{} recorded values do not cover the evaluation window",
                    recorded.len()
                ))
            })
    }
}

/// Statistic parameters: the fixed values, overridden by the candidate's values of
/// `{prefix}{name}`.
fn statistic_parameters(
    statistic: Statistic,
    fixed: &StatisticParameters,
    candidate: Option<&dyn ParameterSpace>,
    prefix: &str,
) -> StatisticParameters {
    let mut result = fixed.clone();
    if let Some(candidate) = candidate {
        for name in statistic.parameter_names() {
            if let Ok(value) = candidate.value(&format!("{}{}", prefix, name)) {
                result.insert(name.to_string(), value);
            }
        }
    }
    result
}

/// Parameters of a candidate as a plain hypercube, or an empty one.
fn candidate_parameters(
    candidate: Option<&dyn ParameterSpace>,
) -> CalibrationResult<hydrosim_core::parameters::Hypercube> {
    match candidate {
        Some(c) => Ok(c.to_hypercube()?),
        None => Ok(Default::default()),
    }
}
