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
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Name of the combined score of a multi-site objective.
pub const MULTISITE_SCORE: &str = "multisite";

/// How the scores of the sites are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mixing {
    WeightedAverage,
    Sum,
}

pub fn known_mixing_ids() -> Vec<&'static str> {
    vec!["weighted-average", "sum"]
}

impl Display for Mixing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mixing::WeightedAverage => write!(f, "weighted-average"),
            Mixing::Sum => write!(f, "sum"),
        }
    }
}

impl FromStr for Mixing {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weighted-average" | "weighted average" => Ok(Mixing::WeightedAverage),
            "sum" => Ok(Mixing::Sum),
            other => Err(CalibrationError::Configuration(format!(
                "unknown mixing id '{}', expected one of {:?}",
                other,
                known_mixing_ids()
            ))),
        }
    }
}

/// One site of a multi-site objective.
#[derive(Debug, Clone)]
pub struct SiteDefinition {
    /// Objective identifier, also the prefix of the site's statistic parameters.
    pub id: String,
    pub variable_id: String,
    pub statistic: String,
    pub observed: TimeSeries,
    pub window: Option<(Instant, Instant)>,
    pub weight: f64,
}

#[derive(Debug, Clone)]
struct Site {
    id: String,
    variable_id: String,
    statistic: Statistic,
    observations: AlignedObservations,
    weight: f64,
}

/// Several statistics of one simulation, each at its own site and window.
///
/// The simulation is run once per evaluation. Statistic parameters of a site are read from
/// the candidate as `{site id}.{parameter}`.
#[derive(Debug, Clone)]
pub struct MultisiteObjective {
    simulation: Simulation,
    sites: Vec<Site>,
    mixing: Mixing,
    parameters: IndexMap<String, StatisticParameters>,
}

impl MultisiteObjective {
    pub fn new(
        mut simulation: Simulation,
        definitions: Vec<SiteDefinition>,
        mixing_id: &str,
    ) -> CalibrationResult<Self> {
        let mixing: Mixing = mixing_id.parse()?;
        if definitions.is_empty() {
            return Err(CalibrationError::Configuration(
                "a multi-site objective needs at least one site".to_string(),
            ));
        }
        let mut sites: Vec<Site> = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if definition.id == MULTISITE_SCORE || sites.iter().any(|s| s.id == definition.id) {
                return Err(CalibrationError::Configuration(format!(
                    "site id '{}' is already used",
                    definition.id
                )));
            }
            if !(definition.weight.is_finite() && definition.weight >= 0.0) {
                return Err(CalibrationError::Configuration(format!(
                    "weight {} of site '{}' must be finite and positive",
                    definition.weight, definition.id
                )));
            }
            let statistic: Statistic = definition.statistic.parse()?;
            if let Some(first) = sites.first() {
                if first.statistic.is_maximizable() != statistic.is_maximizable() {
                    return Err(CalibrationError::Configuration(format!(
                        "{} of site '{}' is not optimised in the same direction as {}",
                        statistic, definition.id, first.statistic
                    )));
                }
            }
            simulation.record(&definition.variable_id)?;
            sites.push(Site {
                observations: AlignedObservations::new(
                    simulation.span(),
                    &definition.observed,
                    definition.window,
                )?,
                id: definition.id,
                variable_id: definition.variable_id,
                statistic,
                weight: definition.weight,
            });
        }
        Ok(Self {
            simulation,
            sites,
            mixing,
            parameters: IndexMap::new(),
        })
    }

    pub fn mixing(&self) -> Mixing {
        self.mixing
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Fix a statistic parameter of a site.
    pub fn set_statistic_parameter(
        &mut self,
        site: &str,
        name: &str,
        value: f64,
    ) -> CalibrationResult<()> {
        let statistic = self
            .sites
            .iter()
            .find(|s| s.id == site)
            .map(|s| s.statistic)
            .ok_or_else(|| CalibrationError::Configuration(format!("unknown site '{}'", site)))?;
        if !statistic.parameter_names().contains(&name) {
            return Err(CalibrationError::Configuration(format!(
                "{} has no parameter '{}'",
                statistic, name
            )));
        }
        self.parameters
            .entry(site.to_string())
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }

    fn scores(&self, candidate: Option<&dyn ParameterSpace>) -> CalibrationResult<ObjectiveScores> {
        let none = StatisticParameters::new();
        let mut parts = IndexMap::new();
        let mut total = 0.0;
        let mut weights = 0.0;
        for site in &self.sites {
            let recorded = self.simulation.get_recorded(&site.variable_id)?.to_vec();
            let simulated = site.observations.simulated(&recorded)?;
            let fixed = self.parameters.get(&site.id).unwrap_or(&none);
            let parameters = statistic_parameters(
                site.statistic,
                fixed,
                candidate,
                &format!("{}.", site.id),
            );
            let value = site
                .statistic
                .evaluate(&site.observations.values, simulated, &parameters)?;
            total += site.weight * value;
            weights += site.weight;
            parts.insert(site.id.clone(), value);
        }
        let combined = match self.mixing {
            Mixing::Sum => total,
            Mixing::WeightedAverage if weights > 0.0 => total / weights,
            Mixing::WeightedAverage => {
                return Err(CalibrationError::Configuration(
                    "the site weights sum to zero".to_string(),
                ))
            }
        };
        let mut values = IndexMap::from([(MULTISITE_SCORE.to_string(), combined)]);
        values.extend(parts);
        ObjectiveScores::new(
            values,
            candidate_parameters(candidate)?,
            self.is_maximizable(),
        )
    }
}

impl ObjectiveEvaluator for MultisiteObjective {
    fn is_maximizable(&self) -> bool {
        self.sites
            .first()
            .map_or(false, |s| s.statistic.is_maximizable())
    }

    fn score_names(&self) -> Vec<String> {
        std::iter::once(MULTISITE_SCORE.to_string())
            .chain(self.sites.iter().map(|s| s.id.clone()))
            .collect()
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
