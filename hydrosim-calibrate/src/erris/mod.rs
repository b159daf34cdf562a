//! Staged calibration of the ERRIS and MAERRIS error-correction models.
//!
//! The hydrological parameters and the error model are estimated separately, each stage an
//! SCE run over its own parameters:
//!
//! | Stage     | Free parameters                         | Fixed                 |
//! |-----------|-----------------------------------------|-----------------------|
//! | `stage1`  | hydrological                            | `a`, `b`              |
//! | `stage2`  | `a`, `b`                                | stage 1 flows         |
//! | `stage3`  | `a`, `b`, `Rho`, `Sigma`                | stage 1 flows         |
//! | `stage3MS`| `a`, `b`, `Rho`, `Sigma1`, `Sigma2`, `Weight` | stage 1 flows   |
//! | `stage4a` | `Rho`, `Sigma` on the rising limb       | stage 3 `a`, `b`      |
//! | `stage4b` | `Rho`, `Sigma` on the falling limb      | stage 3 `a`, `b`      |
//!
//! Stages from the second on score the simulated flows of the best stage 1 parameters, so
//! they do not run the simulation.

mod estimator;
mod fixed;

pub use estimator::{default_error_parameters, ErrisEstimator, StageResult};
pub use fixed::{ErrorModelForm, FixedFlowObjective};

use crate::likelihood::CensoringOption;
use crate::sce::{LogLevel, MaxEvaluations, SceParameters, TerminationCondition};
use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::config::SystemConfig;
use hydrosim_core::timeseries::Instant;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Which runtime error model the parameters are estimated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorModelVariant {
    Erris,
    /// Residuals revert to their moving average over `window` steps.
    Maerris { window: usize },
}

impl ErrorModelVariant {
    pub fn model_id(&self) -> &'static str {
        match self {
            ErrorModelVariant::Erris => "ERRIS",
            ErrorModelVariant::Maerris { .. } => "MAERRIS",
        }
    }

    fn moving_average(&self) -> Option<usize> {
        match self {
            ErrorModelVariant::Erris => None,
            ErrorModelVariant::Maerris { window } => Some(*window),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    One,
    Two,
    Three,
    ThreeMs,
    FourA,
    FourB,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::One,
        Stage::Two,
        Stage::Three,
        Stage::ThreeMs,
        Stage::FourA,
        Stage::FourB,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Stage::One => "stage1",
            Stage::Two => "stage2",
            Stage::Three => "stage3",
            Stage::ThreeMs => "stage3MS",
            Stage::FourA => "stage4a",
            Stage::FourB => "stage4b",
        }
    }

    /// The stage whose result this stage starts from.
    pub fn prerequisite(&self) -> Option<Stage> {
        match self {
            Stage::One => None,
            Stage::Two => Some(Stage::One),
            Stage::Three | Stage::ThreeMs => Some(Stage::Two),
            Stage::FourA | Stage::FourB => Some(Stage::Three),
        }
    }

    /// Whether `self` depends, directly or not, on `other`.
    pub fn depends_on(&self, other: Stage) -> bool {
        let mut current = self.prerequisite();
        while let Some(stage) = current {
            if stage == other {
                return true;
            }
            current = stage.prerequisite();
        }
        false
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Stage {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CalibrationError::Configuration(format!("unknown stage '{}'", s)))
    }
}

/// Settings shared by every stage.
#[derive(Debug, Clone)]
pub struct ErrisConfig {
    /// Period simulated before the estimation period and not scored.
    pub warmup: Option<(Instant, Instant)>,
    pub estimation: (Instant, Instant),
    /// Period within the estimation period whose observations are ignored.
    pub exclusion: Option<(Instant, Instant)>,
    pub censoring_threshold: f64,
    pub censoring_option: CensoringOption,
    /// Observations above this value are capped to it.
    pub max_observation: f64,
    /// Restrict `Rho` to `[0, 1]` rather than `[-1, 1]`.
    pub restriction_on: bool,
    /// Log the start and end of every stage at info level.
    pub verbose: bool,
    pub termination: Box<dyn TerminationCondition>,
    /// Settings of every stage's optimiser. By default sized by the stage's free parameters.
    pub sce: Option<SceParameters>,
    pub system: SystemConfig,
    pub log_level: LogLevel,
}

impl ErrisConfig {
    pub fn new(estimation_start: Instant, estimation_end: Instant) -> Self {
        Self {
            warmup: None,
            estimation: (estimation_start, estimation_end),
            exclusion: None,
            censoring_threshold: 0.0,
            censoring_option: CensoringOption::None,
            max_observation: f64::INFINITY,
            restriction_on: true,
            verbose: false,
            termination: Box::new(MaxEvaluations::default()),
            sce: None,
            system: SystemConfig::current(),
            log_level: LogLevel::Generation,
        }
    }

    pub fn with_warmup(mut self, start: Instant, end: Instant) -> Self {
        self.warmup = Some((start, end));
        self
    }

    pub fn with_exclusion(mut self, start: Instant, end: Instant) -> Self {
        self.exclusion = Some((start, end));
        self
    }

    pub fn with_censoring(mut self, threshold: f64, option: CensoringOption) -> Self {
        self.censoring_threshold = threshold;
        self.censoring_option = option;
        self
    }

    pub fn with_max_observation(mut self, max_observation: f64) -> Self {
        self.max_observation = max_observation;
        self
    }

    pub fn with_restriction(mut self, restriction_on: bool) -> Self {
        self.restriction_on = restriction_on;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_termination(mut self, termination: Box<dyn TerminationCondition>) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_sce_parameters(mut self, parameters: SceParameters) -> Self {
        self.sce = Some(parameters);
        self
    }

    pub fn with_system_config(mut self, system: SystemConfig) -> Self {
        self.system = system;
        self
    }

    /// Start of the simulated period.
    pub fn span_start(&self) -> Instant {
        self.warmup.map_or(self.estimation.0, |(start, _)| start)
    }

    pub fn validate(&self) -> CalibrationResult<()> {
        let (start, end) = self.estimation;
        if start > end {
            return Err(CalibrationError::Configuration(format!(
                "the estimation period starts on {} after it ends on {}",
                start, end
            )));
        }
        if let Some((warmup_start, warmup_end)) = self.warmup {
            if warmup_start > warmup_end || warmup_start > start {
                return Err(CalibrationError::Configuration(format!(
                    "the warmup period {} to {} must precede the estimation period",
                    warmup_start, warmup_end
                )));
            }
        }
        if let Some((exclusion_start, exclusion_end)) = self.exclusion {
            if exclusion_start > exclusion_end {
                return Err(CalibrationError::Configuration(format!(
                    "the exclusion period starts on {} after it ends on {}",
                    exclusion_start, exclusion_end
                )));
            }
        }
        Ok(())
    }

    fn is_excluded(&self, t: Instant) -> bool {
        self.exclusion
            .map_or(false, |(start, end)| start <= t && t <= end)
    }

    fn is_estimated(&self, t: Instant) -> bool {
        self.estimation.0 <= t && t <= self.estimation.1 && !self.is_excluded(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(month: u32, day: u32) -> Instant {
        NaiveDate::from_ymd_opt(2000, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn stage_prerequisites() {
        assert_eq!(Stage::One.prerequisite(), None);
        assert_eq!(Stage::ThreeMs.prerequisite(), Some(Stage::Two));
        assert!(Stage::FourB.depends_on(Stage::One));
        assert!(!Stage::ThreeMs.depends_on(Stage::Three));
        assert!(!Stage::One.depends_on(Stage::One));
    }

    #[test]
    fn stage_ids() {
        for stage in Stage::ALL {
            assert_eq!(stage.id().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!("STAGE3ms".parse::<Stage>().unwrap(), Stage::ThreeMs);
        assert!("stage5".parse::<Stage>().is_err());
    }

    #[test]
    fn periods() {
        let config = ErrisConfig::new(date(2, 1), date(6, 30))
            .with_warmup(date(1, 1), date(1, 31))
            .with_exclusion(date(3, 1), date(3, 31));
        assert!(config.validate().is_ok());
        assert_eq!(config.span_start(), date(1, 1));
        assert!(!config.is_estimated(date(1, 15)));
        assert!(config.is_estimated(date(2, 15)));
        assert!(!config.is_estimated(date(3, 15)));
        assert!(config.is_estimated(date(6, 30)));

        let late_warmup = ErrisConfig::new(date(2, 1), date(6, 30)).with_warmup(date(3, 1), date(3, 2));
        assert!(late_warmup.validate().is_err());
        assert!(ErrisConfig::new(date(6, 1), date(2, 1)).validate().is_err());
    }
}
