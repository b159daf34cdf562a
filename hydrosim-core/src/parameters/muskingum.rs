//! Stability constraints on Muskingum routing parameters.

use crate::errors::{HydroError, HydroResult};
use crate::simulation::Simulation;
use crate::variable::ElementKind;
use serde::{Deserialize, Serialize};

use super::{Parameter, ParameterSpace};

/// Link variable holding the reach length.
const LENGTH: &str = "Length";
/// Candidate upper weightings tried when narrowing bounds.
const SEARCH_STEPS: usize = 200;
/// Relative margin keeping narrowed bounds clear of the stability limits.
const MARGIN: f64 = 1e-9;

/// Reach lengths routed at a given time step.
///
/// A reach of length `L` with travel time coefficient `K` and weighting `X` is solved with
/// non-negative coefficients when `2 K L X <= dt <= 2 K L (1 - X)`. Over a network the
/// shortest reach bounds `K` from below and the longest from above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuskingumFeasibility {
    pub delta_t_hours: f64,
    pub min_length: f64,
    pub max_length: f64,
}

impl MuskingumFeasibility {
    pub fn new(delta_t_hours: f64, min_length: f64, max_length: f64) -> HydroResult<Self> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(delta_t_hours) && positive(min_length) && positive(max_length))
            || min_length > max_length
        {
            return Err(HydroError::Configuration(format!(
                "invalid Muskingum feasibility: step {} h, reach lengths {} to {}",
                delta_t_hours, min_length, max_length
            )));
        }
        Ok(Self {
            delta_t_hours,
            min_length,
            max_length,
        })
    }

    /// Reach lengths of the links whose routing exposes both `k_name` and `x_name`.
    ///
    /// Links without a `Length` variable count as unit length.
    pub fn from_simulation(
        simulation: &Simulation,
        delta_t_hours: f64,
        k_name: &str,
        x_name: &str,
    ) -> HydroResult<Self> {
        let mut lengths = Vec::new();
        for link in simulation.network().elements_of(ElementKind::Link) {
            if !(link.is_writable(k_name, None) && link.is_writable(x_name, None)) {
                continue;
            }
            let length = if link.has_variable(LENGTH) {
                link.get_variable(LENGTH, None)?
            } else {
                1.0
            };
            lengths.push(length);
        }
        if lengths.is_empty() {
            return Err(HydroError::Binding(format!(
                "no link is routed with parameters '{}' and '{}'",
                k_name, x_name
            )));
        }
        Self::new(
            delta_t_hours,
            lengths.iter().copied().fold(f64::INFINITY, f64::min),
            lengths.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    }

    /// Smallest stable `K` for a weighting `x`.
    pub fn min_k(&self, x: f64) -> f64 {
        self.delta_t_hours / (2.0 * self.min_length * (1.0 - x))
    }

    /// Largest stable `K` for a weighting `x`, unbounded when `x` is zero.
    pub fn max_k(&self, x: f64) -> f64 {
        if x > 0.0 {
            self.delta_t_hours / (2.0 * self.max_length * x)
        } else {
            f64::INFINITY
        }
    }

    /// Weighting above which no `K` is stable on every reach.
    pub fn max_x(&self) -> f64 {
        self.min_length / (self.min_length + self.max_length)
    }

    pub fn is_stable(&self, k: f64, x: f64) -> bool {
        (0.0..=self.max_x()).contains(&x) && self.min_k(x) <= k && k <= self.max_k(x)
    }

    /// The largest box within `k` and `x`, relative to their widths, whose points are all
    /// stable. The lower weighting is kept and the upper one is searched for.
    pub fn narrow(&self, k: (f64, f64), x: (f64, f64)) -> HydroResult<((f64, f64), (f64, f64))> {
        let infeasible = || {
            HydroError::Configuration(format!(
                "no stable Muskingum parameters with K in [{}, {}] and X in [{}, {}] for a {} h step",
                k.0, k.1, x.0, x.1, self.delta_t_hours
            ))
        };
        let x_top = x.1.min(self.max_x());
        if x_top < x.0 {
            return Err(infeasible());
        }
        let k_range_at = |t: f64| {
            (
                k.0.max(self.min_k(t) * (1.0 + MARGIN)),
                k.1.min(self.max_k(t) * (1.0 - MARGIN)),
            )
        };
        let relative = |low: f64, high: f64, width: f64| {
            if width > 0.0 {
                (high - low) / width
            } else {
                1.0
            }
        };

        let mut best: Option<(f64, f64)> = None;
        for i in 0..=SEARCH_STEPS {
            let t = x.0 + (x_top - x.0) * i as f64 / SEARCH_STEPS as f64;
            let (k_min, k_max) = k_range_at(t);
            if k_min > k_max {
                continue;
            }
            let area = relative(x.0, t, x.1 - x.0) * relative(k_min, k_max, k.1 - k.0);
            if best.map_or(true, |(_, a)| area > a) {
                best = Some((t, area));
            }
        }
        let (t, _) = best.ok_or_else(infeasible)?;
        Ok((k_range_at(t), (x.0, t)))
    }
}

/// Reach lengths and stable bounds for the default `K` and `X` parameter names.
pub fn feasible_muskingum_bounds(
    simulation: &Simulation,
    delta_t_hours: f64,
) -> HydroResult<MuskingumFeasibility> {
    MuskingumFeasibility::from_simulation(simulation, delta_t_hours, "K", "X")
}

/// Restricts the travel time and weighting parameters of an inner space to values for which
/// Muskingum routing is stable on every reach of a network.
///
/// The bounds of the two parameters are narrowed to a box of stable values when the
/// constraint is created. Current values outside the box move to its nearest edge. Other
/// parameters are unaffected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuskingumConstraint {
    inner: Box<dyn ParameterSpace>,
    k_name: String,
    x_name: String,
    feasibility: MuskingumFeasibility,
    k_bounds: (f64, f64),
    x_bounds: (f64, f64),
}

impl MuskingumConstraint {
    /// Constrain `k_name` and `x_name` for the links of `simulation` solved at `delta_t_hours`.
    pub fn new(
        inner: Box<dyn ParameterSpace>,
        delta_t_hours: f64,
        k_name: &str,
        x_name: &str,
        simulation: &Simulation,
    ) -> HydroResult<Self> {
        let feasibility =
            MuskingumFeasibility::from_simulation(simulation, delta_t_hours, k_name, x_name)?;
        Self::with_feasibility(inner, k_name, x_name, feasibility)
    }

    pub fn with_feasibility(
        mut inner: Box<dyn ParameterSpace>,
        k_name: &str,
        x_name: &str,
        feasibility: MuskingumFeasibility,
    ) -> HydroResult<Self> {
        let k = inner.get(k_name)?;
        let x = inner.get(x_name)?;
        let (k_bounds, x_bounds) = feasibility.narrow((k.min, k.max), (x.min, x.max))?;
        inner.set_value(k_name, k.value.clamp(k_bounds.0, k_bounds.1))?;
        inner.set_value(x_name, x.value.clamp(x_bounds.0, x_bounds.1))?;
        Ok(Self {
            inner,
            k_name: k_name.to_string(),
            x_name: x_name.to_string(),
            feasibility,
            k_bounds,
            x_bounds,
        })
    }

    pub fn feasibility(&self) -> MuskingumFeasibility {
        self.feasibility
    }

    pub fn inner(&self) -> &dyn ParameterSpace {
        self.inner.as_ref()
    }

    fn bounds(&self, name: &str) -> Option<(f64, f64)> {
        if name == self.k_name {
            Some(self.k_bounds)
        } else if name == self.x_name {
            Some(self.x_bounds)
        } else {
            None
        }
    }

    fn bounds_mut(&mut self, name: &str) -> Option<&mut (f64, f64)> {
        if name == self.k_name {
            Some(&mut self.k_bounds)
        } else if name == self.x_name {
            Some(&mut self.x_bounds)
        } else {
            None
        }
    }
}

#[typetag::serde]
impl ParameterSpace for MuskingumConstraint {
    fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    fn get(&self, name: &str) -> HydroResult<Parameter> {
        let mut parameter = self.inner.get(name)?;
        if let Some((min, max)) = self.bounds(name) {
            parameter.min = min;
            parameter.max = max;
        }
        Ok(parameter)
    }

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        self.get(name)?.check(value)?;
        self.inner.set_value(name, value)
    }

    /// Bounds of the constrained parameters may only be narrowed further.
    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()> {
        let value = self.inner.value(name)?;
        match self.bounds_mut(name) {
            None => self.inner.set_min(name, min),
            Some(bounds) => {
                if !(bounds.0 <= min && min <= value) {
                    return Err(HydroError::BoundViolation {
                        name: name.to_string(),
                        value: min,
                        min: bounds.0,
                        max: value,
                    });
                }
                bounds.0 = min;
                Ok(())
            }
        }
    }

    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()> {
        let value = self.inner.value(name)?;
        match self.bounds_mut(name) {
            None => self.inner.set_max(name, max),
            Some(bounds) => {
                if !(value <= max && max <= bounds.1) {
                    return Err(HydroError::BoundViolation {
                        name: name.to_string(),
                        value: max,
                        min: value,
                        max: bounds.1,
                    });
                }
                bounds.1 = max;
                Ok(())
            }
        }
    }

    fn box_clone(&self) -> Box<dyn ParameterSpace> {
        Box::new(self.clone())
    }

    fn set_definition(&mut self, name: &str, min: f64, max: f64, value: f64) -> HydroResult<()> {
        if self.bounds(name).is_some() {
            return Err(HydroError::Usage(format!(
                "'{}' is constrained for Muskingum stability and cannot be redefined",
                name
            )));
        }
        self.inner.set_definition(name, min, max, value)
    }

    fn applies_to_model(&self) -> bool {
        self.inner.applies_to_model()
    }

    fn apply(&self, simulation: &mut Simulation) -> HydroResult<()> {
        self.inner.apply(simulation)
    }

    fn supports_thread_safe_cloning(&self) -> bool {
        self.inner.supports_thread_safe_cloning()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{from_json_str, to_json_string, Hypercube};

    /// A daily step over reaches of 2 to 8 km.
    fn feasibility() -> MuskingumFeasibility {
        MuskingumFeasibility::new(24.0, 2.0, 8.0).unwrap()
    }

    fn routing_parameters() -> Box<dyn ParameterSpace> {
        let mut hypercube = Hypercube::new();
        hypercube.add_parameter("K", 1.0, 20.0, 2.0).unwrap();
        hypercube.add_parameter("X", 0.0, 0.4, 0.3).unwrap();
        hypercube.add_parameter("N", 0.5, 2.0, 1.0).unwrap();
        Box::new(hypercube)
    }

    #[test]
    fn stability_limits() {
        let f = feasibility();
        assert_eq!(f.min_k(0.0), 6.0);
        assert!((f.max_k(0.2) - 7.5).abs() < 1e-12);
        assert_eq!(f.max_k(0.0), f64::INFINITY);
        assert_eq!(f.max_x(), 0.2);
        assert!(f.is_stable(10.0, 0.05));
        assert!(!f.is_stable(5.0, 0.05));
        assert!(!f.is_stable(10.0, 0.3));
        assert!(MuskingumFeasibility::new(24.0, 8.0, 2.0).is_err());
        assert!(MuskingumFeasibility::new(0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn narrowed_box_is_stable_everywhere() {
        let f = feasibility();
        let ((k_min, k_max), (x_min, x_max)) = f.narrow((1.0, 20.0), (0.0, 0.4)).unwrap();
        assert!(k_min > 6.0 && k_max <= 20.0 && k_min < k_max);
        assert_eq!(x_min, 0.0);
        assert!(x_max > 0.0 && x_max < 0.2);
        for k in [k_min, k_max] {
            for x in [x_min, x_max] {
                assert!(f.is_stable(k, x), "K = {}, X = {}", k, x);
            }
        }
        // Bounds that are already stable are kept
        let (k, x) = f.narrow((7.0, 9.0), (0.0, 0.1)).unwrap();
        assert_eq!(k, (7.0, 9.0));
        assert_eq!(x, (0.0, 0.1));

        assert!(f.narrow((1.0, 5.0), (0.0, 0.4)).is_err());
        assert!(f.narrow((1.0, 20.0), (0.3, 0.4)).is_err());
    }

    #[test]
    fn constraint_narrows_only_routing_parameters() {
        let space =
            MuskingumConstraint::with_feasibility(routing_parameters(), "K", "X", feasibility())
                .unwrap();
        assert_eq!(space.names(), vec!["K", "X", "N"]);
        let k = space.get("K").unwrap();
        let x = space.get("X").unwrap();
        assert!(k.min > 6.0);
        assert!(x.max < 0.2);
        // Out of range values were moved to the nearest edge of the box
        assert_eq!(k.value, k.min);
        assert_eq!(x.value, x.max);
        assert!(space.is_within_bounds());
        assert_eq!(space.get("N").unwrap(), space.inner().get("N").unwrap());
        // The inner space keeps its own bounds
        assert_eq!(space.inner().min_value("K").unwrap(), 1.0);
    }

    #[test]
    fn writes_respect_the_narrowed_bounds() {
        let mut space =
            MuskingumConstraint::with_feasibility(routing_parameters(), "K", "X", feasibility())
                .unwrap();
        assert!(matches!(
            space.set_value("K", 2.0),
            Err(HydroError::BoundViolation { .. })
        ));
        assert!(space.set_value("X", 0.3).is_err());
        space.set_value("K", 12.0).unwrap();
        assert_eq!(space.inner().value("K").unwrap(), 12.0);

        space.set_max("K", 15.0).unwrap();
        assert_eq!(space.max_value("K").unwrap(), 15.0);
        assert!(space.set_max("K", 25.0).is_err());
        assert!(space.set_min("K", 1.0).is_err());
        assert!(space.set_definition("X", 0.0, 0.5, 0.1).is_err());
        space.set_max("N", 1.5).unwrap();
    }

    #[test]
    fn constraint_round_trips_through_json() {
        let space =
            MuskingumConstraint::with_feasibility(routing_parameters(), "K", "X", feasibility())
                .unwrap();
        let loaded = from_json_str(&to_json_string(&space).unwrap()).unwrap();
        assert_eq!(loaded.parameters().unwrap(), space.parameters().unwrap());
    }
}
