//! Goodness-of-fit statistics between observed and simulated series.
//!
//! Statistics are identified by a case-insensitive name (see [`known_statistics`]). Pairs
//! with a missing observation (`NaN`) are ignored. A non-finite simulated value is a numeric
//! failure of the simulation rather than a usage error.

use crate::likelihood::LogSinhLikelihood;
use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::errors::HydroError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Named values of the statistic parameters, e.g. the likelihood transform `a` and `b`.
pub type StatisticParameters = IndexMap<String, f64>;

/// Offset applied before the logarithm in [`nse_log`], keeping zero flows finite.
pub const LOG_OFFSET: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    Nse,
    NseLog,
    Kge,
    Rmse,
    Mae,
    Bias,
    Sse,
    LogLikelihood,
}

pub fn known_statistics() -> Vec<&'static str> {
    vec![
        "NSE",
        "NSE-log",
        "KGE",
        "RMSE",
        "MAE",
        "Bias",
        "SSE",
        "Log-likelihood",
    ]
}

impl Statistic {
    pub fn id(&self) -> &'static str {
        match self {
            Statistic::Nse => "NSE",
            Statistic::NseLog => "NSE-log",
            Statistic::Kge => "KGE",
            Statistic::Rmse => "RMSE",
            Statistic::Mae => "MAE",
            Statistic::Bias => "Bias",
            Statistic::Sse => "SSE",
            Statistic::LogLikelihood => "Log-likelihood",
        }
    }

    /// Whether larger values of the statistic are better.
    pub fn is_maximizable(&self) -> bool {
        matches!(
            self,
            Statistic::Nse | Statistic::NseLog | Statistic::Kge | Statistic::LogLikelihood
        )
    }

    /// Names of the parameters read by the statistic. Missing ones take their defaults.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            Statistic::LogLikelihood => LogSinhLikelihood::PARAMETER_NAMES,
            _ => &[],
        }
    }

    pub fn evaluate(
        &self,
        observed: &[f64],
        simulated: &[f64],
        parameters: &StatisticParameters,
    ) -> CalibrationResult<f64> {
        let (observed, simulated) = paired(observed, simulated)?;
        let value = match self {
            Statistic::Nse => nse(&observed, &simulated),
            Statistic::NseLog => nse_log(&observed, &simulated),
            Statistic::Kge => kge(&observed, &simulated),
            Statistic::Rmse => rmse(&observed, &simulated),
            Statistic::Mae => mae(&observed, &simulated),
            Statistic::Bias => bias(&observed, &simulated),
            Statistic::Sse => sse(&observed, &simulated),
            Statistic::LogLikelihood => {
                LogSinhLikelihood::from_parameters(parameters)?.evaluate(&observed, &simulated)
            }
        };
        Ok(value)
    }
}

impl Display for Statistic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Statistic {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nse" => Ok(Statistic::Nse),
            "nse-log" | "nselog" | "lognse" => Ok(Statistic::NseLog),
            "kge" => Ok(Statistic::Kge),
            "rmse" => Ok(Statistic::Rmse),
            "mae" => Ok(Statistic::Mae),
            "bias" => Ok(Statistic::Bias),
            "sse" => Ok(Statistic::Sse),
            "log-likelihood" | "loglikelihood" => Ok(Statistic::LogLikelihood),
            other => Err(CalibrationError::Configuration(format!(
                "unknown statistic '{}', expected one of {:?}",
                other,
                known_statistics()
            ))),
        }
    }
}

/// Drop the pairs with a missing observation.
fn paired(observed: &[f64], simulated: &[f64]) -> CalibrationResult<(Vec<f64>, Vec<f64>)> {
    if observed.len() != simulated.len() {
        return Err(CalibrationError::Configuration(format!(
            "{} observations for {} simulated values",
            observed.len(),
            simulated.len()
        )));
    }
    let mut obs = Vec::with_capacity(observed.len());
    let mut sim = Vec::with_capacity(observed.len());
    for (o, s) in observed.iter().zip(simulated) {
        if !o.is_finite() {
            continue;
        }
        if !s.is_finite() {
            return Err(HydroError::simulation("statistic", "non-finite simulated value").into());
        }
        obs.push(*o);
        sim.push(*s);
    }
    if obs.is_empty() {
        return Err(HydroError::DataAvailability(
            "no observation within the evaluation window".to_string(),
        )
        .into());
    }
    Ok((obs, sim))
}

/// Nash-Sutcliffe Efficiency. Range: (-inf, 1], 1 = perfect.
pub fn nse(observed: &[f64], simulated: &[f64]) -> f64 {
    let n = observed.len();
    let mean_obs: f64 = observed.iter().sum::<f64>() / n as f64;
    let numerator = sse(observed, simulated);
    let denominator: f64 = observed.iter().map(|o| (o - mean_obs).powi(2)).sum();
    if denominator == 0.0 {
        return f64::NEG_INFINITY;
    }
    1.0 - numerator / denominator
}

/// NSE of `ln(x + 0.01)`.
pub fn nse_log(observed: &[f64], simulated: &[f64]) -> f64 {
    let log_obs: Vec<f64> = observed.iter().map(|o| (o + LOG_OFFSET).ln()).collect();
    let log_sim: Vec<f64> = simulated.iter().map(|s| (s + LOG_OFFSET).ln()).collect();
    nse(&log_obs, &log_sim)
}

/// Kling-Gupta Efficiency. Range: (-inf, 1], 1 = perfect.
pub fn kge(observed: &[f64], simulated: &[f64]) -> f64 {
    let n = observed.len() as f64;
    let mean_o = observed.iter().sum::<f64>() / n;
    let mean_s = simulated.iter().sum::<f64>() / n;
    let std_o = (observed.iter().map(|o| (o - mean_o).powi(2)).sum::<f64>() / n).sqrt();
    let std_s = (simulated.iter().map(|s| (s - mean_s).powi(2)).sum::<f64>() / n).sqrt();

    let r = if std_o == 0.0 || std_s == 0.0 {
        0.0
    } else {
        observed
            .iter()
            .zip(simulated)
            .map(|(o, s)| (o - mean_o) * (s - mean_s))
            .sum::<f64>()
            / (n * std_o * std_s)
    };
    let alpha = if std_o == 0.0 { 0.0 } else { std_s / std_o };
    let beta = if mean_o == 0.0 { 0.0 } else { mean_s / mean_o };

    1.0 - ((r - 1.0).powi(2) + (alpha - 1.0).powi(2) + (beta - 1.0).powi(2)).sqrt()
}

/// Root Mean Square Error. Range: [0, inf), 0 = perfect.
pub fn rmse(observed: &[f64], simulated: &[f64]) -> f64 {
    (sse(observed, simulated) / observed.len() as f64).sqrt()
}

/// Mean Absolute Error. Range: [0, inf), 0 = perfect.
pub fn mae(observed: &[f64], simulated: &[f64]) -> f64 {
    observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).abs())
        .sum::<f64>()
        / observed.len() as f64
}

/// Absolute relative volume error `|Σs - Σo| / Σo`. 0 = perfect.
pub fn bias(observed: &[f64], simulated: &[f64]) -> f64 {
    let sum_obs: f64 = observed.iter().sum();
    if sum_obs == 0.0 {
        return f64::INFINITY;
    }
    (simulated.iter().sum::<f64>() - sum_obs).abs() / sum_obs
}

/// Sum of squared errors.
pub fn sse(observed: &[f64], simulated: &[f64]) -> f64 {
    observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).powi(2))
        .sum()
}
