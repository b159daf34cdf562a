//! Shuffled complex evolution (SCE-UA).
//!
//! The population is partitioned into complexes. Each complex evolves independently by
//! competitive simplex steps (reflection, contraction, then a random point as a last resort),
//! after which the complexes are merged, sorted and dealt out again. Evaluation of the
//! complexes runs on a thread pool when both the objective and the parameter space can be
//! cloned safely, otherwise serially.
//!
//! # References
//!
//! Duan, Q., Sorooshian, S., & Gupta, V. K. (1994). Optimal use of the SCE-UA global
//! optimization method for calibrating watershed models. Journal of Hydrology, 158, 265-284.

mod candidates;
mod log;
mod optimizer;
mod parameters;
mod termination;

pub use candidates::{
    create_parameter_sampler, known_candidate_factories, CandidateFactory, FreeParameters,
    ParameterSampler,
};
pub use log::{LogLevel, OptimizerLog};
pub use optimizer::{OptimizationResult, SceOptimizer};
pub use parameters::SceParameters;
pub use termination::{
    create_termination, known_termination_ids, relative_dispersion, CompositeTermination,
    Marginal, MaxEvaluations, MaxRuntime, Progress, RelativeStdDev, TerminationCondition,
};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle of an optimiser run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerStatus {
    Configured,
    Running,
    Converged,
    MaxIterations,
    MaxRuntime,
    Cancelled,
}

impl OptimizerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OptimizerStatus::Configured | OptimizerStatus::Running)
    }
}

impl Display for OptimizerStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OptimizerStatus::Configured => "configured",
            OptimizerStatus::Running => "running",
            OptimizerStatus::Converged => "converged",
            OptimizerStatus::MaxIterations => "maximum iterations",
            OptimizerStatus::MaxRuntime => "maximum runtime",
            OptimizerStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Request to stop a run at the end of the current generation.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
