use crate::errors::{HydroError, HydroResult};
use crate::simulation::Simulation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{unknown_parameter, Parameter, ParameterSpace};

/// Elementwise transform from a base parameter value to the value exposed to optimisers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    Log10,
    /// Natural logarithm.
    Log,
    Sqrt,
    Reciprocal,
    /// `a * x + b`
    Affine { a: f64, b: f64 },
}

/// Names of the available transforms.
pub fn known_transforms() -> Vec<&'static str> {
    vec!["log10", "log", "sqrt", "reciprocal", "affine"]
}

impl Transform {
    /// Look up a transform by name. `a` and `b` are only used by `affine`.
    pub fn from_name(name: &str, a: f64, b: f64) -> HydroResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "log10" => Ok(Transform::Log10),
            "log" | "ln" => Ok(Transform::Log),
            "sqrt" => Ok(Transform::Sqrt),
            "reciprocal" | "1/x" => Ok(Transform::Reciprocal),
            "affine" => {
                if a == 0.0 || !a.is_finite() || !b.is_finite() {
                    return Err(HydroError::Configuration(format!(
                        "invalid affine transform {} * x + {}",
                        a, b
                    )));
                }
                Ok(Transform::Affine { a, b })
            }
            other => Err(HydroError::Configuration(format!(
                "unknown transform '{}', expected one of {:?}",
                other,
                known_transforms()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Log10 => "log10",
            Transform::Log => "log",
            Transform::Sqrt => "sqrt",
            Transform::Reciprocal => "reciprocal",
            Transform::Affine { .. } => "affine",
        }
    }

    pub fn forward(&self, x: f64) -> f64 {
        match self {
            Transform::Log10 => x.log10(),
            Transform::Log => x.ln(),
            Transform::Sqrt => x.sqrt(),
            Transform::Reciprocal => 1.0 / x,
            Transform::Affine { a, b } => a * x + b,
        }
    }

    pub fn inverse(&self, y: f64) -> f64 {
        match self {
            Transform::Log10 => 10f64.powf(y),
            Transform::Log => y.exp(),
            Transform::Sqrt => y * y,
            Transform::Reciprocal => 1.0 / y,
            Transform::Affine { a, b } => (y - b) / a,
        }
    }

    /// Whether the transform reverses the order of values on its domain.
    fn is_decreasing(&self) -> bool {
        match self {
            Transform::Reciprocal => true,
            Transform::Affine { a, .. } => *a < 0.0,
            _ => false,
        }
    }

    /// Whether `x` is in the domain of the transform.
    fn accepts(&self, x: f64) -> bool {
        match self {
            Transform::Log10 | Transform::Log | Transform::Reciprocal => x > 0.0,
            Transform::Sqrt => x >= 0.0,
            Transform::Affine { .. } => x.is_finite(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransformedParameter {
    base: String,
    transform: Transform,
}

/// Exposes transformed parameters in place of base parameters of the inner space.
///
/// The bounds of a transformed parameter are the images of the base bounds, so the base space
/// keeps enforcing its own bounds. Parameters without a transform are exposed unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformParameterSpace {
    inner: Box<dyn ParameterSpace>,
    /// Transformed name to base parameter.
    transformed: IndexMap<String, TransformedParameter>,
}

impl TransformParameterSpace {
    pub fn new(inner: Box<dyn ParameterSpace>) -> Self {
        Self {
            inner,
            transformed: IndexMap::new(),
        }
    }

    /// Expose `base` as `name = transform(base)`.
    ///
    /// The whole range of the base parameter must be in the domain of the transform.
    pub fn add_transform(&mut self, name: &str, base: &str, transform: Transform) -> HydroResult<()> {
        let parameter = self.inner.get(base)?;
        if self.transformed.values().any(|t| t.base == base) {
            return Err(HydroError::Configuration(format!(
                "parameter '{}' is already transformed",
                base
            )));
        }
        if name != base && self.inner.contains(name) || self.transformed.contains_key(name) {
            return Err(HydroError::DuplicateParameter(name.to_string()));
        }
        if !(transform.accepts(parameter.min) && transform.accepts(parameter.max)) {
            return Err(HydroError::Configuration(format!(
                "bounds [{}, {}] of '{}' are outside the domain of the {} transform",
                parameter.min,
                parameter.max,
                base,
                transform.name()
            )));
        }
        self.transformed.insert(
            name.to_string(),
            TransformedParameter {
                base: base.to_string(),
                transform,
            },
        );
        Ok(())
    }

    /// The base parameter space, without transforms.
    pub fn untransform(&self) -> Box<dyn ParameterSpace> {
        self.inner.clone()
    }

    fn transformed_name(&self, base: &str) -> Option<&String> {
        self.transformed
            .iter()
            .find(|(_, t)| t.base == base)
            .map(|(name, _)| name)
    }

    /// Base name of an exposed name, and its transform if any.
    fn resolve(&self, name: &str) -> HydroResult<(String, Option<Transform>)> {
        if let Some(t) = self.transformed.get(name) {
            return Ok((t.base.clone(), Some(t.transform)));
        }
        if self.transformed_name(name).is_some() || !self.inner.contains(name) {
            return Err(unknown_parameter(name));
        }
        Ok((name.to_string(), None))
    }
}

#[typetag::serde]
impl ParameterSpace for TransformParameterSpace {
    fn names(&self) -> Vec<String> {
        self.inner
            .names()
            .into_iter()
            .map(|n| self.transformed_name(&n).cloned().unwrap_or(n))
            .collect()
    }

    fn get(&self, name: &str) -> HydroResult<Parameter> {
        let (base, transform) = self.resolve(name)?;
        let parameter = self.inner.get(&base)?;
        Ok(match transform {
            None => parameter,
            Some(t) => {
                let (lo, hi) = (t.forward(parameter.min), t.forward(parameter.max));
                let (min, max) = if t.is_decreasing() { (hi, lo) } else { (lo, hi) };
                Parameter {
                    name: name.to_string(),
                    // Rounding of the inverse may put the value a hair outside of the bounds
                    value: t.forward(parameter.value).clamp(min, max),
                    min,
                    max,
                }
            }
        })
    }

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        let (base, transform) = self.resolve(name)?;
        match transform {
            None => self.inner.set_value(&base, value),
            Some(t) => {
                self.get(name)?.check(value)?;
                let base_parameter = self.inner.get(&base)?;
                let base_value = t
                    .inverse(value)
                    .clamp(base_parameter.min, base_parameter.max);
                self.inner.set_value(&base, base_value)
            }
        }
    }

    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()> {
        let (base, transform) = self.resolve(name)?;
        match transform {
            None => self.inner.set_min(&base, min),
            Some(t) if t.is_decreasing() => self.inner.set_max(&base, t.inverse(min)),
            Some(t) => self.inner.set_min(&base, t.inverse(min)),
        }
    }

    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()> {
        let (base, transform) = self.resolve(name)?;
        match transform {
            None => self.inner.set_max(&base, max),
            Some(t) if t.is_decreasing() => self.inner.set_min(&base, t.inverse(max)),
            Some(t) => self.inner.set_max(&base, t.inverse(max)),
        }
    }

    fn box_clone(&self) -> Box<dyn ParameterSpace> {
        Box::new(self.clone())
    }

    fn applies_to_model(&self) -> bool {
        self.inner.applies_to_model()
    }

    /// The base values are applied, not the transformed ones.
    fn apply(&self, simulation: &mut Simulation) -> HydroResult<()> {
        self.inner.apply(simulation)
    }

    fn supports_thread_safe_cloning(&self) -> bool {
        self.inner.supports_thread_safe_cloning()
    }
}
