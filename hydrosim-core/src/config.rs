//! Process-wide configuration.
//!
//! The maximum number of threads used by optimisers is process-wide state with simple
//! "current value" semantics. Optimisers take a snapshot of it through [`SystemConfig::current`]
//! when they start, so changing it only affects runs started afterwards.

use crate::errors::HydroResult;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Zero means "use the available parallelism of the machine".
static DEFAULT_MAX_THREADS: AtomicUsize = AtomicUsize::new(0);

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Current process-wide maximum number of optimiser threads.
pub fn default_max_threads() -> usize {
    match DEFAULT_MAX_THREADS.load(Ordering::Relaxed) {
        0 => available_threads(),
        n => n,
    }
}

/// Set the process-wide maximum number of optimiser threads.
///
/// Passing `0` restores the default of using all available cores.
pub fn set_default_max_threads(n: usize) {
    DEFAULT_MAX_THREADS.store(n, Ordering::Relaxed);
}

/// Context handed to simulations and optimisers at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Upper bound on worker threads for candidate evaluation.
    pub max_threads: usize,
    /// Seed for stochastic algorithms. `None` draws one from the operating system.
    pub seed: Option<u64>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::current()
    }
}

impl SystemConfig {
    /// Snapshot of the process-wide settings.
    pub fn current() -> Self {
        Self {
            max_threads: default_max_threads(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// Read a configuration from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> HydroResult<Self> {
        let mut config: SystemConfig = toml::from_str(content)?;
        if config.max_threads == 0 {
            config.max_threads = available_threads();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_toml() {
        let config = SystemConfig::from_toml_str("max_threads = 3\nseed = 42").unwrap();
        assert_eq!(config.max_threads, 3);
        assert_eq!(config.seed, Some(42));

        let config = SystemConfig::from_toml_str("").unwrap();
        assert!(config.max_threads >= 1);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn max_threads_is_at_least_one() {
        let config = SystemConfig::current().with_max_threads(0);
        assert_eq!(config.max_threads, 1);
    }
}
