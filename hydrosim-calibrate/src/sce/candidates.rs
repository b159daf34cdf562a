use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::parameters::ParameterSpace;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::str::FromStr;

/// The parameters an optimiser moves: those whose bounds are not equal.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeParameters {
    pub names: Vec<String>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    /// Values of the template.
    pub values: Vec<f64>,
}

impl FreeParameters {
    pub fn from_space(space: &dyn ParameterSpace) -> CalibrationResult<Self> {
        let mut free = Self {
            names: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
            values: Vec::new(),
        };
        for p in space.parameters()? {
            if p.max > p.min {
                free.names.push(p.name);
                free.min.push(p.min);
                free.max.push(p.max);
                free.values.push(p.value);
            }
        }
        Ok(free)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn ranges(&self) -> Vec<f64> {
        self.min.iter().zip(&self.max).map(|(a, b)| b - a).collect()
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        point
            .iter()
            .zip(self.min.iter().zip(&self.max))
            .all(|(x, (a, b))| a <= x && x <= b)
    }

    /// Pull a point back inside the bounds, absorbing rounding at the edges.
    pub fn clamp(&self, point: &mut [f64]) {
        for (x, (a, b)) in point.iter_mut().zip(self.min.iter().zip(&self.max)) {
            *x = x.clamp(*a, *b);
        }
    }

    /// A point drawn uniformly within the bounds.
    pub fn uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        uniform_in(&self.min, &self.max, rng)
    }
}

/// A point drawn uniformly in the box `[min, max]`.
pub fn uniform_in<R: Rng + ?Sized>(min: &[f64], max: &[f64], rng: &mut R) -> Vec<f64> {
    min.iter()
        .zip(max)
        .map(|(a, b)| a + rng.gen::<f64>() * (b - a))
        .collect()
}

/// How the initial population of an optimiser is generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CandidateFactory {
    /// Uniform random sampling of the feasible box.
    #[default]
    UniformRandom,
    /// The template's values first, then uniform random points.
    Seeded,
}

impl FromStr for CandidateFactory {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "urs" | "uniform random" => Ok(CandidateFactory::UniformRandom),
            "seeded" => Ok(CandidateFactory::Seeded),
            other => Err(CalibrationError::Configuration(format!(
                "unknown candidate factory '{}', expected one of {:?}",
                other,
                known_candidate_factories()
            ))),
        }
    }
}

pub fn known_candidate_factories() -> Vec<&'static str> {
    vec!["urs", "seeded"]
}

impl CandidateFactory {
    pub fn generate<R: Rng + ?Sized>(
        &self,
        count: usize,
        free: &FreeParameters,
        rng: &mut R,
    ) -> Vec<Vec<f64>> {
        let mut points = Vec::with_capacity(count);
        if *self == CandidateFactory::Seeded && count > 0 {
            points.push(free.values.clone());
        }
        while points.len() < count {
            points.push(free.uniform(rng));
        }
        points
    }
}

/// Draws parameter sets from a space, for Monte Carlo runs outside an optimiser.
///
/// Free parameters are drawn by a candidate factory, fixed ones keep the template value.
/// A sampler created with the same seed draws the same sequence.
#[derive(Debug)]
pub struct ParameterSampler {
    factory: CandidateFactory,
    free: FreeParameters,
    template: Box<dyn ParameterSpace>,
    rng: ChaCha8Rng,
    drawn: usize,
}

/// A sampler of `space` with a factory named as in [`known_candidate_factories`].
pub fn create_parameter_sampler(
    seed: u64,
    space: &dyn ParameterSpace,
    method: &str,
) -> CalibrationResult<ParameterSampler> {
    ParameterSampler::new(seed, space, method.parse()?)
}

impl ParameterSampler {
    pub fn new(
        seed: u64,
        space: &dyn ParameterSpace,
        factory: CandidateFactory,
    ) -> CalibrationResult<Self> {
        if !space.is_within_bounds() {
            return Err(CalibrationError::Configuration(
                "cannot sample a parameter space whose values are out of bounds".to_string(),
            ));
        }
        let free = FreeParameters::from_space(space)?;
        debug!("sampling {} free parameters with seed {}", free.len(), seed);
        Ok(Self {
            factory,
            free,
            template: space.box_clone(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            drawn: 0,
        })
    }

    pub fn free_parameters(&self) -> &FreeParameters {
        &self.free
    }

    /// The next parameter set.
    pub fn sample(&mut self) -> CalibrationResult<Box<dyn ParameterSpace>> {
        let mut drawn = self.samples(1)?;
        drawn.pop().ok_or_else(|| {
            CalibrationError::Configuration("the sampler drew no parameter set".to_string())
        })
    }

    /// The next `count` parameter sets.
    pub fn samples(&mut self, count: usize) -> CalibrationResult<Vec<Box<dyn ParameterSpace>>> {
        // A seeded factory only places the template first in the whole sequence
        let factory = if self.drawn == 0 {
            self.factory
        } else {
            CandidateFactory::UniformRandom
        };
        let points = factory.generate(count, &self.free, &mut self.rng);
        self.drawn += points.len();
        points
            .iter()
            .map(|point| -> CalibrationResult<Box<dyn ParameterSpace>> {
                let mut space = self.template.box_clone();
                for (name, value) in self.free.names.iter().zip(point) {
                    space.set_value(name, *value)?;
                }
                Ok(space)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrosim_core::parameters::Hypercube;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn space() -> Hypercube {
        let mut h = Hypercube::new();
        h.add_parameter("x1", 0.0, 10.0, 2.0).unwrap();
        h.add_parameter("fixed", 1.0, 1.0, 1.0).unwrap();
        h.add_parameter("x2", -1.0, 1.0, 0.5).unwrap();
        h
    }

    #[test]
    fn fixed_parameters_are_not_free() {
        let free = FreeParameters::from_space(&space()).unwrap();
        assert_eq!(free.names, vec!["x1", "x2"]);
        assert_eq!(free.ranges(), vec![10.0, 2.0]);
        assert_eq!(free.values, vec![2.0, 0.5]);
    }

    #[test]
    fn generated_points_are_feasible() {
        let free = FreeParameters::from_space(&space()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let points = CandidateFactory::UniformRandom.generate(50, &free, &mut rng);
        assert_eq!(points.len(), 50);
        assert!(points.iter().all(|p| free.contains(p)));

        let seeded = CandidateFactory::Seeded.generate(3, &free, &mut rng);
        assert_eq!(seeded[0], vec![2.0, 0.5]);
        assert!(free.contains(&seeded[2]));
    }

    #[test]
    fn factories_by_name() {
        assert_eq!(
            "URS".parse::<CandidateFactory>().unwrap(),
            CandidateFactory::UniformRandom
        );
        assert_eq!(
            "seeded".parse::<CandidateFactory>().unwrap(),
            CandidateFactory::Seeded
        );
        assert!("latin hypercube".parse::<CandidateFactory>().is_err());
    }

    #[test]
    fn clamp_to_bounds() {
        let free = FreeParameters::from_space(&space()).unwrap();
        let mut point = vec![10.000000001, -1.5];
        free.clamp(&mut point);
        assert_eq!(point, vec![10.0, -1.0]);
    }

    #[test]
    fn sampler_draws_reproducible_feasible_sets() {
        let mut first = create_parameter_sampler(7, &space(), "urs").unwrap();
        let mut second = create_parameter_sampler(7, &space(), "urs").unwrap();
        let a = first.samples(20).unwrap();
        let b = second.samples(20).unwrap();
        assert_eq!(a.len(), 20);
        for (x, y) in a.iter().zip(&b) {
            assert!(x.is_within_bounds());
            assert_eq!(x.value("fixed").unwrap(), 1.0);
            assert_eq!(x.value("x1").unwrap(), y.value("x1").unwrap());
            assert_eq!(x.value("x2").unwrap(), y.value("x2").unwrap());
        }
        let mut other = create_parameter_sampler(8, &space(), "urs").unwrap();
        assert_ne!(
            other.sample().unwrap().value("x1").unwrap(),
            a[0].value("x1").unwrap()
        );
    }

    #[test]
    fn seeded_sampler_starts_from_the_template() {
        let mut sampler = create_parameter_sampler(3, &space(), "seeded").unwrap();
        let first = sampler.sample().unwrap();
        assert_eq!(first.value("x1").unwrap(), 2.0);
        assert_eq!(first.value("x2").unwrap(), 0.5);
        let rest = sampler.samples(5).unwrap();
        assert!(rest
            .iter()
            .all(|p| p.value("x1").unwrap() != 2.0 && p.is_within_bounds()));

        assert!(create_parameter_sampler(3, &space(), "sobol").is_err());
    }
}
