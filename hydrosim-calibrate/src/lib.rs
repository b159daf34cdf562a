//! Calibration of catchment simulations.
//!
//! - [`statistics`]: goodness-of-fit statistics looked up by name.
//! - [`likelihood`]: log-sinh transformed Gaussian likelihoods with censoring.
//! - [`objectives`]: evaluators scoring a simulation against observations.
//! - [`sce`]: the shuffled complex evolution optimiser and its termination criteria.
//! - [`erris`]: staged calibration of the ERRIS and MAERRIS error-correction models.

pub mod erris;
pub mod likelihood;
pub mod objectives;
pub mod sce;
pub mod statistics;

use hydrosim_core::errors::HydroError;
use thiserror::Error;

/// Error type for calibration and optimisation.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error(transparent)]
    Core(#[from] HydroError),
    #[error("Invalid calibration configuration: {0}")]
    Configuration(String),
    #[error("Optimisation failed: {0}")]
    Optimizer(String),
    #[error("Stage '{stage}' requires stage '{required}' to be run first")]
    StageOrder { stage: String, required: String },
}

impl CalibrationError {
    /// Numeric failure of a simulation, which optimisers score as a dominated candidate.
    pub fn is_numeric_failure(&self) -> bool {
        matches!(self, CalibrationError::Core(e) if e.is_numeric_failure())
    }
}

/// Convenience type for `Result<T, CalibrationError>`.
pub type CalibrationResult<T> = Result<T, CalibrationError>;
