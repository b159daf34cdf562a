//! Likelihoods of observed flows given simulated flows, in log-sinh transformed space.
//!
//! Residuals `z(obs) - z(sim)` of the log-sinh transform `z` are modelled as Gaussian, either
//! independent ([`LogSinhLikelihood`]) or as an AR(1) process ([`Ar1Likelihood`]). The
//! Jacobian of the transform is included so that likelihoods with different transform
//! parameters can be compared.
//!
//! Observations below the censoring threshold are treated as "somewhere below the threshold"
//! and contribute the probability mass below it instead of a density.

use crate::statistics::StatisticParameters;
use crate::{CalibrationError, CalibrationResult};
use hydrosim_components::error_correction::LogSinh;
use hydrosim_core::errors::HydroError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;
const MIN_SD: f64 = 1e-9;

/// Handling of low flows in the likelihood.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CensoringOption {
    /// Every observation contributes a density.
    #[default]
    None,
    /// Observations below the threshold are censored.
    Observed,
    /// As `Observed`, and simulated values below the threshold are raised to it, so that
    /// a simulation and an observation both below the threshold agree.
    Both,
}

impl CensoringOption {
    /// Option from its numeric code: 0, 1 or 2.
    pub fn from_code(code: f64) -> CalibrationResult<Self> {
        if code == 0.0 {
            Ok(CensoringOption::None)
        } else if code == 1.0 {
            Ok(CensoringOption::Observed)
        } else if code == 2.0 {
            Ok(CensoringOption::Both)
        } else {
            Err(CalibrationError::Configuration(format!(
                "censoring option must be 0, 1 or 2, got {}",
                code
            )))
        }
    }

    pub fn code(&self) -> f64 {
        match self {
            CensoringOption::None => 0.0,
            CensoringOption::Observed => 1.0,
            CensoringOption::Both => 2.0,
        }
    }
}

/// Low-flow censoring and observation cap shared by the likelihoods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Censoring {
    pub threshold: f64,
    pub option: CensoringOption,
    /// Observations above this value are capped to it.
    pub max_observation: f64,
}

impl Default for Censoring {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            option: CensoringOption::None,
            max_observation: f64::INFINITY,
        }
    }
}

impl Censoring {
    pub fn new(
        threshold: f64,
        option: CensoringOption,
        max_observation: f64,
    ) -> CalibrationResult<Self> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(HydroError::BoundViolation {
                name: "ct".to_string(),
                value: threshold,
                min: 0.0,
                max: f64::INFINITY,
            }
            .into());
        }
        if !(max_observation > threshold) {
            return Err(CalibrationError::Configuration(format!(
                "the observation cap {} must be above the censoring threshold {}",
                max_observation, threshold
            )));
        }
        Ok(Self {
            threshold,
            option,
            max_observation,
        })
    }

    fn observation(&self, observed: f64) -> f64 {
        observed.min(self.max_observation).max(0.0)
    }

    fn simulation(&self, simulated: f64) -> f64 {
        match self.option {
            CensoringOption::Both => simulated.max(self.threshold),
            _ => simulated.max(0.0),
        }
    }

    fn is_censored(&self, observed: f64) -> bool {
        self.option != CensoringOption::None && observed < self.threshold
    }
}

/// Independent Gaussian residuals of mean `m` and standard deviation `s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSinhLikelihood {
    pub transform: LogSinh,
    pub mean: f64,
    pub sd: f64,
    pub censoring: Censoring,
    /// Estimate `m` and `s` from the uncensored residuals instead of using the given values.
    pub estimate_mean_sd: bool,
}

impl Default for LogSinhLikelihood {
    fn default() -> Self {
        Self {
            transform: LogSinh::new(-3.0, -3.0),
            mean: 0.0,
            sd: 1.0,
            censoring: Censoring::default(),
            estimate_mean_sd: true,
        }
    }
}

impl LogSinhLikelihood {
    pub const PARAMETER_NAMES: &'static [&'static str] =
        &["b", "m", "s", "a", "maxobs", "ct", "censopt", "calc_mod_m_s"];

    /// Build from named parameters. Missing ones take the default values.
    pub fn from_parameters(parameters: &StatisticParameters) -> CalibrationResult<Self> {
        let defaults = Self::default();
        let get = |name: &str, default: f64| parameters.get(name).copied().unwrap_or(default);
        let sd = get("s", defaults.sd);
        let estimate_mean_sd = get("calc_mod_m_s", 1.0) != 0.0;
        if !estimate_mean_sd && !(sd > 0.0) {
            return Err(HydroError::BoundViolation {
                name: "s".to_string(),
                value: sd,
                min: MIN_SD,
                max: f64::INFINITY,
            }
            .into());
        }
        Ok(Self {
            transform: LogSinh::new(
                get("a", defaults.transform.a),
                get("b", defaults.transform.b),
            ),
            mean: get("m", defaults.mean),
            sd,
            censoring: Censoring::new(
                get("ct", 0.0),
                CensoringOption::from_code(get("censopt", 0.0))?,
                get("maxobs", f64::INFINITY),
            )?,
            estimate_mean_sd,
        })
    }

    /// Mean and standard deviation of the uncensored residuals.
    pub fn residual_moments(&self, observed: &[f64], simulated: &[f64]) -> Option<(f64, f64)> {
        let residuals: Vec<f64> = observed
            .iter()
            .zip(simulated)
            .filter(|(o, _)| o.is_finite())
            .map(|(o, s)| (self.censoring.observation(*o), self.censoring.simulation(*s)))
            .filter(|(o, _)| !self.censoring.is_censored(*o))
            .map(|(o, s)| self.transform.forward(o) - self.transform.forward(s))
            .collect();
        if residuals.len() < 2 {
            return None;
        }
        let n = residuals.len() as f64;
        let mean = residuals.iter().sum::<f64>() / n;
        let var = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        Some((mean, var.sqrt().max(MIN_SD)))
    }

    pub fn evaluate(&self, observed: &[f64], simulated: &[f64]) -> f64 {
        let (mean, sd) = if self.estimate_mean_sd {
            self.residual_moments(observed, simulated)
                .unwrap_or((self.mean, self.sd))
        } else {
            (self.mean, self.sd)
        };
        let censored_z = self.transform.forward(self.censoring.threshold);
        observed
            .iter()
            .zip(simulated)
            .filter(|(o, _)| o.is_finite())
            .map(|(o, s)| {
                let o = self.censoring.observation(*o);
                let z_sim = self.transform.forward(self.censoring.simulation(*s));
                if self.censoring.is_censored(o) {
                    ln_normal_cdf((censored_z - z_sim - mean) / sd)
                } else {
                    let residual = self.transform.forward(o) - z_sim;
                    ln_normal_pdf((residual - mean) / sd) - sd.ln()
                        + self.transform.derivative(o).ln()
                }
            })
            .sum()
    }
}

/// Distribution of the AR(1) innovations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Innovations {
    Gaussian { sigma: f64 },
    /// Two zero-mean Gaussians, the first taken with probability `weight`.
    Mixture { sigma1: f64, sigma2: f64, weight: f64 },
}

impl Innovations {
    fn validate(&self) -> CalibrationResult<()> {
        let positive = |name: &str, value: f64| -> CalibrationResult<()> {
            if value > 0.0 {
                Ok(())
            } else {
                Err(HydroError::BoundViolation {
                    name: name.to_string(),
                    value,
                    min: MIN_SD,
                    max: f64::INFINITY,
                }
                .into())
            }
        };
        match *self {
            Innovations::Gaussian { sigma } => positive("Sigma", sigma),
            Innovations::Mixture {
                sigma1,
                sigma2,
                weight,
            } => {
                positive("Sigma1", sigma1)?;
                positive("Sigma2", sigma2)?;
                if !(0.0..=1.0).contains(&weight) {
                    return Err(HydroError::BoundViolation {
                        name: "Weight".to_string(),
                        value: weight,
                        min: 0.0,
                        max: 1.0,
                    }
                    .into());
                }
                Ok(())
            }
        }
    }

    fn ln_pdf(&self, e: f64) -> f64 {
        match *self {
            Innovations::Gaussian { sigma } => ln_normal_pdf(e / sigma) - sigma.ln(),
            Innovations::Mixture {
                sigma1,
                sigma2,
                weight,
            } => ln_add_exp(
                weight.ln() + ln_normal_pdf(e / sigma1) - sigma1.ln(),
                (1.0 - weight).ln() + ln_normal_pdf(e / sigma2) - sigma2.ln(),
            ),
        }
    }

    fn ln_cdf(&self, e: f64) -> f64 {
        match *self {
            Innovations::Gaussian { sigma } => ln_normal_cdf(e / sigma),
            Innovations::Mixture {
                sigma1,
                sigma2,
                weight,
            } => ln_add_exp(
                weight.ln() + ln_normal_cdf(e / sigma1),
                (1.0 - weight).ln() + ln_normal_cdf(e / sigma2),
            ),
        }
    }

    /// Standard deviation of the innovations.
    pub fn sd(&self) -> f64 {
        match *self {
            Innovations::Gaussian { sigma } => sigma,
            Innovations::Mixture {
                sigma1,
                sigma2,
                weight,
            } => (weight * sigma1 * sigma1 + (1.0 - weight) * sigma2 * sigma2).sqrt(),
        }
    }
}

/// Transformed residuals following `η(t) = μ(t) + ρ (η(t-1) - μ(t)) + ε(t)`.
///
/// The mean `μ` is zero, or with a moving-average window the mean of the last residuals,
/// the same way the runtime error-correction models predict. Steps without an observation
/// carry the predicted residual forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ar1Likelihood {
    pub transform: LogSinh,
    pub rho: f64,
    pub innovations: Innovations,
    pub moving_average: Option<usize>,
    pub censoring: Censoring,
}

impl Ar1Likelihood {
    /// Log-likelihood over the steps flagged in `included`. Other steps still update the
    /// residual process.
    pub fn evaluate(
        &self,
        observed: &[f64],
        simulated: &[f64],
        included: &[bool],
    ) -> CalibrationResult<f64> {
        if observed.len() != simulated.len() || observed.len() != included.len() {
            return Err(CalibrationError::Configuration(format!(
                "series of different lengths: {} observed, {} simulated, {} flags",
                observed.len(),
                simulated.len(),
                included.len()
            )));
        }
        self.innovations.validate()?;
        let censored_z = self.transform.forward(self.censoring.threshold);
        let window = self.moving_average.unwrap_or(0);
        let mut recent: VecDeque<f64> = VecDeque::with_capacity(window + 1);
        let mut previous = 0.0;
        let mut total = 0.0;
        let mut count = 0usize;

        for ((o, s), include) in observed.iter().zip(simulated).zip(included) {
            if !s.is_finite() {
                return Err(
                    HydroError::simulation("likelihood", "non-finite simulated value").into(),
                );
            }
            let mean = if recent.is_empty() {
                0.0
            } else {
                recent.iter().sum::<f64>() / recent.len() as f64
            };
            let predicted = mean + self.rho * (previous - mean);
            let z_sim = self.transform.forward(self.censoring.simulation(*s));

            let residual = if !o.is_finite() {
                predicted
            } else {
                let o = self.censoring.observation(*o);
                if self.censoring.is_censored(o) {
                    if *include {
                        total += self.innovations.ln_cdf(censored_z - z_sim - predicted);
                        count += 1;
                    }
                    predicted
                } else {
                    let r = self.transform.forward(o) - z_sim;
                    if *include {
                        total += self.innovations.ln_pdf(r - predicted)
                            + self.transform.derivative(o).ln();
                        count += 1;
                    }
                    r
                }
            };
            previous = residual;
            if window > 0 {
                recent.push_back(residual);
                while recent.len() > window {
                    recent.pop_front();
                }
            }
        }
        if count == 0 {
            return Err(HydroError::DataAvailability(
                "no observation within the estimation period".to_string(),
            )
            .into());
        }
        Ok(total)
    }
}

fn ln_normal_pdf(x: f64) -> f64 {
    -0.5 * x * x - LN_SQRT_2PI
}

/// `ln Φ(x)`, accurate far into the lower tail.
pub fn ln_normal_cdf(x: f64) -> f64 {
    ln_erfc(-x / std::f64::consts::SQRT_2) - std::f64::consts::LN_2
}

/// `ln erfc(z)` from the Chebyshev fit of Numerical Recipes (relative error below 1.2e-7).
fn ln_erfc(z: f64) -> f64 {
    if z < 0.0 {
        return (2.0 - ln_erfc(-z).exp()).ln();
    }
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    t.ln() + poly
}

fn ln_add_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}
