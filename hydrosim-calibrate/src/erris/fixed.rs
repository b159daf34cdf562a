use crate::likelihood::{Ar1Likelihood, Censoring, Innovations, LogSinhLikelihood};
use crate::objectives::{ObjectiveEvaluator, ObjectiveScores};
use crate::statistics::StatisticParameters;
use crate::{CalibrationError, CalibrationResult};
use hydrosim_components::error_correction::LogSinh;
use hydrosim_core::parameters::{Hypercube, ParameterSpace};
use indexmap::IndexMap;

const SCORE: &str = "Log-likelihood";

/// Error model scored by a [`FixedFlowObjective`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorModelForm {
    /// Independent residuals, mean and standard deviation estimated from them.
    Independent,
    /// AR(1) residuals with Gaussian innovations.
    Ar1,
    /// AR(1) residuals with a mixture of two Gaussian innovations.
    Ar1Mixture,
}

impl ErrorModelForm {
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            ErrorModelForm::Independent => &["a", "b"],
            ErrorModelForm::Ar1 => &["a", "b", "Rho", "Sigma"],
            ErrorModelForm::Ar1Mixture => &["a", "b", "Rho", "Sigma1", "Sigma2", "Weight"],
        }
    }
}

/// Likelihood of error-model parameters given fixed simulated flows.
///
/// Parameters missing from a candidate take their fixed value.
#[derive(Debug, Clone)]
pub struct FixedFlowObjective {
    observed: Vec<f64>,
    simulated: Vec<f64>,
    /// Steps contributing to the likelihood.
    included: Vec<bool>,
    form: ErrorModelForm,
    fixed: StatisticParameters,
    censoring: Censoring,
    moving_average: Option<usize>,
}

impl FixedFlowObjective {
    pub fn new(
        observed: Vec<f64>,
        simulated: Vec<f64>,
        included: Vec<bool>,
        form: ErrorModelForm,
        censoring: Censoring,
    ) -> CalibrationResult<Self> {
        if observed.len() != simulated.len() || observed.len() != included.len() {
            return Err(CalibrationError::Configuration(format!(
                "series of different lengths: {} observed, {} simulated, {} flags",
                observed.len(),
                simulated.len(),
                included.len()
            )));
        }
        Ok(Self {
            observed,
            simulated,
            included,
            form,
            fixed: StatisticParameters::new(),
            censoring,
            moving_average: None,
        })
    }

    pub fn with_fixed(mut self, fixed: StatisticParameters) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn with_moving_average(mut self, window: Option<usize>) -> Self {
        self.moving_average = window;
        self
    }

    fn parameter(&self, candidate: Option<&dyn ParameterSpace>, name: &str) -> CalibrationResult<f64> {
        if let Some(value) = candidate.and_then(|c| c.value(name).ok()) {
            return Ok(value);
        }
        self.fixed.get(name).copied().ok_or_else(|| {
            CalibrationError::Configuration(format!("error model parameter '{}' is not set", name))
        })
    }

    fn likelihood(&self, candidate: Option<&dyn ParameterSpace>) -> CalibrationResult<f64> {
        let transform = LogSinh::new(self.parameter(candidate, "a")?, self.parameter(candidate, "b")?);
        match self.form {
            ErrorModelForm::Independent => {
                let observed: Vec<f64> = self
                    .observed
                    .iter()
                    .zip(&self.included)
                    .map(|(o, include)| if *include { *o } else { f64::NAN })
                    .collect();
                let likelihood = LogSinhLikelihood {
                    transform,
                    censoring: self.censoring,
                    estimate_mean_sd: true,
                    ..Default::default()
                };
                Ok(likelihood.evaluate(&observed, &self.simulated))
            }
            ErrorModelForm::Ar1 | ErrorModelForm::Ar1Mixture => {
                let innovations = if self.form == ErrorModelForm::Ar1 {
                    Innovations::Gaussian {
                        sigma: self.parameter(candidate, "Sigma")?,
                    }
                } else {
                    Innovations::Mixture {
                        sigma1: self.parameter(candidate, "Sigma1")?,
                        sigma2: self.parameter(candidate, "Sigma2")?,
                        weight: self.parameter(candidate, "Weight")?,
                    }
                };
                let likelihood = Ar1Likelihood {
                    transform,
                    rho: self.parameter(candidate, "Rho")?,
                    innovations,
                    moving_average: self.moving_average,
                    censoring: self.censoring,
                };
                likelihood.evaluate(&self.observed, &self.simulated, &self.included)
            }
        }
    }

    fn scores(&self, candidate: Option<&dyn ParameterSpace>) -> CalibrationResult<ObjectiveScores> {
        let value = self.likelihood(candidate)?;
        let parameters = match candidate {
            Some(c) => c.to_hypercube()?,
            None => Hypercube::new(),
        };
        ObjectiveScores::new(IndexMap::from([(SCORE.to_string(), value)]), parameters, true)
    }
}

impl ObjectiveEvaluator for FixedFlowObjective {
    fn is_maximizable(&self) -> bool {
        true
    }

    fn score_names(&self) -> Vec<String> {
        vec![SCORE.to_string()]
    }

    fn evaluate_score(&mut self) -> CalibrationResult<ObjectiveScores> {
        self.scores(None)
    }

    fn evaluate_score_for_parameters(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        self.scores(Some(parameters))
    }

    fn box_clone(&self) -> Box<dyn ObjectiveEvaluator> {
        Box::new(self.clone())
    }
}
