//! Settings of the shuffled complex evolution algorithm.

use crate::{CalibrationError, CalibrationResult};
use serde::{Deserialize, Serialize};

/// Population geometry and simplex step ratios of an SCE run.
///
/// Field names in serialised form follow the conventional SCE-UA symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceParameters {
    /// Number of complexes at the start of the run.
    #[serde(rename = "P")]
    pub complexes: usize,

    /// Minimum number of complexes. One complex is dropped per shuffle until this is reached.
    #[serde(rename = "Pmin")]
    pub min_complexes: usize,

    /// Points per complex.
    #[serde(rename = "M")]
    pub points_per_complex: usize,

    /// Points per sub-complex, the parents of each offspring.
    #[serde(rename = "Q")]
    pub points_per_subcomplex: usize,

    /// Offspring generated from each sub-complex.
    #[serde(rename = "Alpha")]
    pub offspring: usize,

    /// Sub-complexes evolved per complex between two shuffles.
    #[serde(rename = "Beta")]
    pub evolution_steps: usize,

    /// Maximum number of shuffles.
    ///
    /// A hard cap on generations whatever the termination condition: a run that reaches it
    /// ends with [`OptimizerStatus::MaxIterations`](super::OptimizerStatus::MaxIterations).
    #[serde(rename = "NumShuffle")]
    pub max_shuffles: usize,

    /// Weight of the rank in the selection of parents, in `[0, 1]`.
    ///
    /// `1` gives the triangular distribution of the original algorithm, `0` a uniform choice.
    #[serde(rename = "TrapezoidalDensityParameter")]
    pub trapezoidal_density: f64,

    /// Default: -1, the mirror image of the worst parent through the centroid.
    #[serde(rename = "ReflectionRatio")]
    pub reflection_ratio: f64,

    /// Default: 0.5, halfway between the centroid and the worst parent.
    #[serde(rename = "ContractionRatio")]
    pub contraction_ratio: f64,
}

impl Default for SceParameters {
    fn default() -> Self {
        Self::for_free_parameters(4)
    }
}

impl SceParameters {
    /// Defaults sized for `n` free parameters.
    pub fn for_free_parameters(n: usize) -> Self {
        let n = n.max(1);
        let m = 2 * n + 1;
        Self {
            complexes: n + 2,
            min_complexes: n + 2,
            points_per_complex: m,
            points_per_subcomplex: (m.saturating_sub(2)).max(2),
            offspring: 1,
            evolution_steps: m,
            max_shuffles: 40,
            trapezoidal_density: 1.0,
            reflection_ratio: -1.0,
            contraction_ratio: 0.5,
        }
    }

    /// Read settings from TOML. Missing keys take the defaults for four free parameters.
    pub fn from_toml_str(content: &str) -> CalibrationResult<Self> {
        let parameters: SceParameters = toml::from_str(content)
            .map_err(|e| CalibrationError::Configuration(format!("SCE parameters: {}", e)))?;
        parameters.validate()?;
        Ok(parameters)
    }

    pub fn population_size(&self) -> usize {
        self.complexes * self.points_per_complex
    }

    pub fn validate(&self) -> CalibrationResult<()> {
        let invalid = |message: String| Err(CalibrationError::Configuration(message));
        if self.complexes == 0 || self.min_complexes == 0 {
            return invalid("at least one complex is required".to_string());
        }
        if self.min_complexes > self.complexes {
            return invalid(format!(
                "Pmin ({}) exceeds P ({})",
                self.min_complexes, self.complexes
            ));
        }
        if self.points_per_complex < 2 {
            return invalid("a complex needs at least two points".to_string());
        }
        if self.points_per_subcomplex < 2 || self.points_per_subcomplex > self.points_per_complex {
            return invalid(format!(
                "Q ({}) must be between 2 and M ({})",
                self.points_per_subcomplex, self.points_per_complex
            ));
        }
        if self.offspring == 0 || self.evolution_steps == 0 || self.max_shuffles == 0 {
            return invalid("Alpha, Beta and NumShuffle must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.trapezoidal_density) {
            return invalid(format!(
                "the trapezoidal density parameter {} is not in [0, 1]",
                self.trapezoidal_density
            ));
        }
        if !(self.reflection_ratio < 0.0) {
            return invalid(format!(
                "the reflection ratio {} must be negative",
                self.reflection_ratio
            ));
        }
        if !(self.contraction_ratio > 0.0 && self.contraction_ratio < 1.0) {
            return invalid(format!(
                "the contraction ratio {} is not in (0, 1)",
                self.contraction_ratio
            ));
        }
        Ok(())
    }
}
