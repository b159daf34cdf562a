use super::fixed::{ErrorModelForm, FixedFlowObjective};
use super::{ErrisConfig, ErrorModelVariant, Stage};
use crate::likelihood::{Censoring, LogSinhLikelihood};
use crate::objectives::{AlignedObservations, ObjectiveEvaluator, ObjectiveScores, SingleObjective};
use crate::sce::{CandidateFactory, OptimizerLog, OptimizerStatus, SceOptimizer};
use crate::statistics::StatisticParameters;
use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::component::ComponentKind;
use hydrosim_core::errors::HydroResult;
use hydrosim_core::parameters::{ApplyMode, Hypercube, Parameter, ParameterSpace};
use hydrosim_core::simulation::Simulation;
use hydrosim_core::timeseries::TimeSeries;
use indexmap::IndexMap;
use log::{debug, info};

const FLOW: &str = "OutflowRate";
const STAGE_COLUMN: &str = "Stage";

/// Bounds and starting values of the error model parameters.
pub fn default_error_parameters(restriction_on: bool) -> HydroResult<Hypercube> {
    let rho_min = if restriction_on { 0.0 } else { -1.0 };
    let definitions = [
        ("a", -10.0, 3.0, -3.0),
        ("b", -10.0, 3.0, -3.0),
        ("Rho", rho_min, 1.0, 0.5),
        ("Sigma", 1e-3, 5.0, 1.0),
        ("Sigma1", 1e-3, 5.0, 0.5),
        ("Sigma2", 1e-3, 5.0, 2.0),
        ("Weight", 0.0, 1.0, 0.5),
    ];
    let mut hypercube = Hypercube::new().with_apply_mode(ApplyMode::None);
    for (name, min, max, value) in definitions {
        hypercube.add_parameter(name, min, max, value)?;
    }
    Ok(hypercube)
}

/// Outcome of one calibration stage.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub status: OptimizerStatus,
    /// The parameters of the stage at their best values, fixed ones included.
    pub parameters: Hypercube,
    pub scores: ObjectiveScores,
    /// Quantities estimated along the way, e.g. the residual mean `m` and deviation `s`.
    pub estimates: IndexMap<String, f64>,
    pub log: OptimizerLog,
}

/// Staged estimator of the parameters of an error-correction model and of the hydrological
/// model it corrects.
#[derive(Debug)]
pub struct ErrisEstimator {
    simulation: Simulation,
    observed: TimeSeries,
    element: String,
    variant: ErrorModelVariant,
    config: ErrisConfig,
    censoring: Censoring,
    hydro_parameters: Box<dyn ParameterSpace>,
    error_parameters: Hypercube,
    results: IndexMap<Stage, StageResult>,
    /// Uncorrected flows over the simulated period with the best stage 1 parameters.
    flows: Option<Vec<f64>>,
}

impl ErrisEstimator {
    /// An estimator for the error model at `element`, against flows `observed` there.
    pub fn new(
        simulation: Simulation,
        observed: TimeSeries,
        element: &str,
        variant: ErrorModelVariant,
        hydro_parameters: Box<dyn ParameterSpace>,
        config: ErrisConfig,
    ) -> CalibrationResult<Self> {
        config.validate()?;
        let censoring = Censoring::new(
            config.censoring_threshold,
            config.censoring_option,
            config.max_observation,
        )?;
        if let ErrorModelVariant::Maerris { window } = variant {
            if window == 0 {
                return Err(CalibrationError::Configuration(
                    "the MAERRIS window must be at least one step".to_string(),
                ));
            }
        }
        let element = simulation.network().resolve_key(element)?;
        Ok(Self {
            error_parameters: default_error_parameters(config.restriction_on)?,
            simulation,
            observed,
            element,
            variant,
            config,
            censoring,
            hydro_parameters,
            results: IndexMap::new(),
            flows: None,
        })
    }

    /// Replace the bounds and starting values of the error model parameters.
    pub fn with_error_parameters(mut self, parameters: Hypercube) -> Self {
        self.error_parameters = parameters.with_apply_mode(ApplyMode::None);
        self
    }

    pub fn set_hydro_parameters(&mut self, parameters: Box<dyn ParameterSpace>) {
        self.hydro_parameters = parameters;
    }

    pub fn config(&self) -> &ErrisConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ErrisConfig {
        &mut self.config
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn result(&self, stage: Stage) -> Option<&StageResult> {
        self.results.get(&stage)
    }

    fn flow_variable(&self) -> String {
        format!("{}.{}", self.element, FLOW)
    }

    /// The simulation over the calibration period, without error correction at the element.
    fn hydrological_simulation(&self) -> CalibrationResult<Simulation> {
        let mut simulation = self.simulation.clone();
        simulation.set_span(self.config.span_start(), self.config.estimation.1)?;
        let corrected = simulation
            .network()
            .element(&self.element)?
            .component(ComponentKind::ErrorCorrection)
            .is_some();
        if corrected {
            simulation.remove_model(&self.element, ComponentKind::ErrorCorrection)?;
        }
        Ok(simulation)
    }

    /// Observations with the excluded period missing.
    fn scored_observations(&self) -> CalibrationResult<TimeSeries> {
        let mut observed = self.observed.clone();
        if self.config.exclusion.is_some() {
            for i in 0..observed.len() {
                let t = observed.geometry().time_at(i)?;
                if self.config.is_excluded(t) {
                    observed.set(i, f64::NAN)?;
                }
            }
        }
        Ok(observed)
    }

    fn log_stage(&self, message: String) {
        if self.config.verbose {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }

    fn optimize(
        &self,
        objective: Box<dyn ObjectiveEvaluator>,
        template: Box<dyn ParameterSpace>,
    ) -> CalibrationResult<(crate::sce::OptimizationResult, OptimizerLog)> {
        let mut optimizer = SceOptimizer::new(objective, template)
            .with_termination(self.config.termination.box_clone())
            .with_candidate_factory(CandidateFactory::Seeded)
            .with_config(self.config.system.clone())
            .with_log_level(self.config.log_level);
        if let Some(parameters) = &self.config.sce {
            optimizer = optimizer.with_parameters(parameters.clone());
        }
        let result = optimizer.run()?;
        Ok((result, optimizer.log().clone()))
    }

    /// Error model parameters `names`, starting from `start` where given.
    fn error_template(
        &self,
        names: &[&str],
        start: &IndexMap<String, f64>,
    ) -> CalibrationResult<Hypercube> {
        let defaults = default_error_parameters(self.config.restriction_on)?;
        let mut template = Hypercube::new().with_apply_mode(ApplyMode::None);
        for name in names {
            let Parameter { mut min, max, value, .. } = self
                .error_parameters
                .get(name)
                .or_else(|_| defaults.get(name))?;
            if *name == "Rho" && self.config.restriction_on {
                min = min.max(0.0);
            }
            let value = start.get(*name).copied().unwrap_or(value).clamp(min, max);
            template.add_parameter(name, min, max, value)?;
        }
        Ok(template)
    }

    /// Values of the best parameters of a stage that has run.
    fn best_values(&self, stage: Stage) -> CalibrationResult<IndexMap<String, f64>> {
        let result = self.results.get(&stage).ok_or_else(|| missing(stage, stage))?;
        Ok(result
            .parameters
            .parameters()?
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect())
    }

    /// Flags of the steps of the simulated period that contribute to the likelihood.
    fn included_steps(&self, simulation: &Simulation) -> CalibrationResult<Vec<bool>> {
        let span = simulation.span();
        (0..span.length)
            .map(|i| Ok(self.config.is_estimated(span.time_at(i)?)))
            .collect()
    }

    /// Run a stage. Its prerequisite must have run; results of stages depending on it are
    /// discarded.
    pub fn calibrate(&mut self, stage: Stage) -> CalibrationResult<StageResult> {
        if let Some(required) = stage.prerequisite() {
            if !self.results.contains_key(&required) {
                return Err(missing(stage, required));
            }
        }
        self.log_stage(format!(
            "{} calibration of {} at {} started",
            self.variant.model_id(),
            stage,
            self.element
        ));
        let result = match stage {
            Stage::One => self.stage_one()?,
            _ => self.error_model_stage(stage)?,
        };
        self.log_stage(format!(
            "{} finished ({}): {} = {}",
            stage,
            result.status,
            result.scores.primary_name(),
            result.scores.value()
        ));
        self.results.retain(|s, _| !s.depends_on(stage));
        self.results.insert(stage, result.clone());
        Ok(result)
    }

    fn stage_one(&mut self) -> CalibrationResult<StageResult> {
        let simulation = self.hydrological_simulation()?;
        let flow = self.flow_variable();
        let observed = self.scored_observations()?;
        let start = self.error_template(&["a", "b"], &IndexMap::new())?;

        let mut objective = SingleObjective::new(
            simulation.clone(),
            &flow,
            &observed,
            "Log-likelihood",
            Some(self.config.estimation),
        )?;
        let mut fixed: Vec<(&str, f64)> = vec![
            ("a", start.value("a")?),
            ("b", start.value("b")?),
            ("ct", self.censoring.threshold),
            ("censopt", self.censoring.option.code()),
            ("calc_mod_m_s", 1.0),
        ];
        if self.censoring.max_observation.is_finite() {
            fixed.push(("maxobs", self.censoring.max_observation));
        }
        for (name, value) in fixed {
            objective.set_statistic_parameter(name, value)?;
        }

        let (optimized, log) = self.optimize(Box::new(objective), self.hydro_parameters.box_clone())?;

        let mut best = simulation;
        best.record(&flow)?;
        optimized.best_parameters().apply(&mut best)?;
        best.execute(true)?;
        let flows = best.get_recorded(&flow)?.to_vec();

        let aligned = AlignedObservations::new(best.span(), &observed, None)?;
        let included = self.included_steps(&best)?;
        let scored: Vec<f64> = aligned
            .values
            .iter()
            .zip(&included)
            .map(|(o, include)| if *include { *o } else { f64::NAN })
            .collect();
        let likelihood = LogSinhLikelihood {
            transform: hydrosim_components::error_correction::LogSinh::new(
                start.value("a")?,
                start.value("b")?,
            ),
            censoring: self.censoring,
            ..Default::default()
        };
        let mut estimates = IndexMap::new();
        if let Some((m, s)) = likelihood.residual_moments(&scored, &flows) {
            estimates.insert("m".to_string(), m);
            estimates.insert("s".to_string(), s);
        }
        self.flows = Some(flows);

        Ok(StageResult {
            stage: Stage::One,
            status: optimized.status,
            parameters: optimized.best_parameters().clone(),
            scores: optimized.best,
            estimates,
            log,
        })
    }

    fn error_model_stage(&mut self, stage: Stage) -> CalibrationResult<StageResult> {
        let flows = self
            .flows
            .clone()
            .ok_or_else(|| missing(stage, Stage::One))?;
        let simulation = self.hydrological_simulation()?;
        let observed = self.scored_observations()?;
        let aligned = AlignedObservations::new(simulation.span(), &observed, None)?;
        let mut included = self.included_steps(&simulation)?;
        let moving_average = self.variant.moving_average();

        let (form, names, start, fixed) = match stage {
            Stage::Two => (
                ErrorModelForm::Independent,
                vec!["a", "b"],
                IndexMap::new(),
                StatisticParameters::new(),
            ),
            Stage::Three => (
                ErrorModelForm::Ar1,
                vec!["a", "b", "Rho", "Sigma"],
                self.best_values(Stage::Two)?,
                StatisticParameters::new(),
            ),
            Stage::ThreeMs => {
                let mut start = self.best_values(Stage::Two)?;
                if let Ok(three) = self.best_values(Stage::Three) {
                    if let Some(sigma) = three.get("Sigma") {
                        start.insert("Sigma1".to_string(), *sigma);
                    }
                    start.extend(three);
                }
                (
                    ErrorModelForm::Ar1Mixture,
                    vec!["a", "b", "Rho", "Sigma1", "Sigma2", "Weight"],
                    start,
                    StatisticParameters::new(),
                )
            }
            Stage::FourA | Stage::FourB => {
                let three = self.best_values(Stage::Three)?;
                let rising = stage == Stage::FourA;
                for (i, flag) in included.iter_mut().enumerate().skip(1) {
                    *flag &= (flows[i] > flows[i - 1]) == rising;
                }
                if let Some(first) = included.first_mut() {
                    *first = false;
                }
                let fixed = three
                    .iter()
                    .filter(|(name, _)| *name == "a" || *name == "b")
                    .map(|(name, value)| (name.clone(), *value))
                    .collect();
                (ErrorModelForm::Ar1, vec!["Rho", "Sigma"], three, fixed)
            }
            Stage::One => return Err(missing(stage, Stage::One)),
        };

        let template = self.error_template(&names, &start)?;
        let objective = FixedFlowObjective::new(
            aligned.values,
            flows,
            included,
            form,
            self.censoring,
        )?
        .with_fixed(fixed)
        .with_moving_average(if form == ErrorModelForm::Independent {
            None
        } else {
            moving_average
        });

        let (optimized, log) = self.optimize(Box::new(objective), Box::new(template))?;
        let mut parameters = optimized.best_parameters().clone();
        if let (Some(window), Stage::Three | Stage::ThreeMs) = (moving_average, stage) {
            let window = window as f64;
            parameters.add_parameter("s2Window", window, window, window)?;
        }
        Ok(StageResult {
            stage,
            status: optimized.status,
            parameters,
            scores: optimized.best,
            estimates: IndexMap::new(),
            log,
        })
    }

    /// Run stages 1, 2, 3, 4a and 4b in turn, then [`concatenate`](Self::concatenate) them.
    pub fn estimate_parameters(&mut self, long_form: bool) -> CalibrationResult<Hypercube> {
        for stage in [Stage::One, Stage::Two, Stage::Three, Stage::FourA, Stage::FourB] {
            self.calibrate(stage)?;
        }
        self.concatenate(long_form)
    }

    /// Merge the best parameters of every stage that has run.
    ///
    /// In long form every name is qualified by its stage, e.g. `stage2.a`, so no name is
    /// lost. Otherwise a parameter estimated by several stages takes the value of the last.
    pub fn concatenate(&self, long_form: bool) -> CalibrationResult<Hypercube> {
        if !self.results.contains_key(&Stage::One) {
            return Err(CalibrationError::StageOrder {
                stage: "concatenation".to_string(),
                required: Stage::One.to_string(),
            });
        }
        let mut merged: IndexMap<String, Parameter> = IndexMap::new();
        for stage in Stage::ALL {
            let Some(result) = self.results.get(&stage) else {
                continue;
            };
            for mut parameter in result.parameters.parameters()? {
                if long_form {
                    parameter.name = format!("{}.{}", stage, parameter.name);
                }
                merged.insert(parameter.name.clone(), parameter);
            }
        }
        let parameters = Hypercube::from_parameters(merged.into_values().collect())?;
        Ok(parameters.with_apply_mode(ApplyMode::None))
    }

    /// Hydrological parameters of stage 1 with the error model parameters of stage 3,
    /// named as variables of the error-correction model, ready to apply to the simulation.
    pub fn final_parameters(&self) -> CalibrationResult<Hypercube> {
        let hydrology = self
            .results
            .get(&Stage::One)
            .ok_or_else(|| final_requires(Stage::One))?;
        let error_model = self
            .results
            .get(&Stage::Three)
            .ok_or_else(|| final_requires(Stage::Three))?;
        let mut parameters = hydrology.parameters.clone().with_apply_mode(ApplyMode::Model);
        for p in error_model.parameters.parameters()? {
            let name = format!("{}.ec.{}", self.element, p.name);
            parameters.add_parameter(&name, p.min, p.max, p.value)?;
        }
        Ok(parameters)
    }

    /// Logs of every stage that has run, the stage in the `Stage` column.
    pub fn calibration_log(&self) -> OptimizerLog {
        OptimizerLog::concat(
            self.results.iter().map(|(stage, result)| (stage.id(), &result.log)),
            STAGE_COLUMN,
        )
    }
}

fn missing(stage: Stage, required: Stage) -> CalibrationError {
    CalibrationError::StageOrder {
        stage: stage.to_string(),
        required: required.to_string(),
    }
}

fn final_requires(required: Stage) -> CalibrationError {
    CalibrationError::StageOrder {
        stage: "final parameters".to_string(),
        required: required.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_parameters_respect_the_restriction() {
        let restricted = default_error_parameters(true).unwrap();
        assert_eq!(restricted.min_value("Rho").unwrap(), 0.0);
        assert_eq!(restricted.value("Sigma2").unwrap(), 2.0);
        let free = default_error_parameters(false).unwrap();
        assert_eq!(free.min_value("Rho").unwrap(), -1.0);
        assert_eq!(free.len(), 7);
        assert!(!free.applies_to_model());
    }
}
