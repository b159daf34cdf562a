//! Combining several optimised parameter spaces into one.

use crate::errors::{HydroError, HydroResult};
use indexmap::IndexMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::{Hypercube, Parameter, ParameterSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStrategy {
    /// Union of the parameters. Names must not repeat.
    Concatenate,
    /// Parameters present in several spaces are averaged within the intersection of
    /// their bounds; the others are kept as they are.
    Average,
}

pub fn known_aggregation_strategies() -> Vec<&'static str> {
    vec!["concatenate", "average"]
}

impl Display for AggregationStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationStrategy::Concatenate => write!(f, "concatenate"),
            AggregationStrategy::Average => write!(f, "average"),
        }
    }
}

impl FromStr for AggregationStrategy {
    type Err = HydroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concatenate" => Ok(AggregationStrategy::Concatenate),
            "average" => Ok(AggregationStrategy::Average),
            other => Err(HydroError::Configuration(format!(
                "unknown aggregation strategy '{}', expected one of {:?}",
                other,
                known_aggregation_strategies()
            ))),
        }
    }
}

pub fn aggregate_parameter_spaces(
    spaces: &[&dyn ParameterSpace],
    strategy: AggregationStrategy,
) -> HydroResult<Hypercube> {
    let mut groups: IndexMap<String, Vec<Parameter>> = IndexMap::new();
    for space in spaces {
        for p in space.parameters()? {
            groups.entry(p.name.clone()).or_default().push(p);
        }
    }

    let mut result = Hypercube::new();
    for (name, group) in groups {
        let parameter = match strategy {
            AggregationStrategy::Concatenate if group.len() > 1 => {
                return Err(HydroError::DuplicateParameter(name));
            }
            AggregationStrategy::Concatenate => group[0].clone(),
            AggregationStrategy::Average => average(&name, &group)?,
        };
        result.add_parameter(&name, parameter.min, parameter.max, parameter.value)?;
    }
    Ok(result)
}

fn average(name: &str, group: &[Parameter]) -> HydroResult<Parameter> {
    let min = group.iter().map(|p| p.min).fold(f64::NEG_INFINITY, f64::max);
    let max = group.iter().map(|p| p.max).fold(f64::INFINITY, f64::min);
    if min > max {
        return Err(HydroError::Configuration(format!(
            "the bounds of '{}' do not intersect",
            name
        )));
    }
    let mean = group.iter().map(|p| p.value).sum::<f64>() / group.len() as f64;
    Parameter::new(name, mean.clamp(min, max), min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn hypercube(values: &[(&str, f64, f64, f64)]) -> Hypercube {
        let mut h = Hypercube::new();
        for (name, min, max, value) in values {
            h.add_parameter(name, *min, *max, *value).unwrap();
        }
        h
    }

    #[test]
    fn concatenate_rejects_repeated_names() {
        let a = hypercube(&[("x1", 0.0, 10.0, 1.0)]);
        let b = hypercube(&[("x2", 0.0, 10.0, 2.0)]);
        let joined =
            aggregate_parameter_spaces(&[&a, &b], AggregationStrategy::Concatenate).unwrap();
        assert_eq!(joined.names(), vec!["x1", "x2"]);
        assert!(aggregate_parameter_spaces(&[&a, &a], AggregationStrategy::Concatenate).is_err());
    }

    #[test]
    fn average_intersects_bounds() {
        let a = hypercube(&[("x1", 0.0, 10.0, 2.0), ("x3", 0.0, 1.0, 0.5)]);
        let b = hypercube(&[("x1", 1.0, 8.0, 6.0)]);
        let averaged = aggregate_parameter_spaces(&[&a, &b], AggregationStrategy::Average).unwrap();
        let x1 = averaged.get("x1").unwrap();
        assert!(is_close!(x1.value, 4.0));
        assert_eq!((x1.min, x1.max), (1.0, 8.0));
        assert_eq!(averaged.value("x3").unwrap(), 0.5);
    }

    #[test]
    fn strategies_by_name() {
        assert_eq!(
            "Average".parse::<AggregationStrategy>().unwrap(),
            AggregationStrategy::Average
        );
        assert!("median".parse::<AggregationStrategy>().is_err());
        assert_eq!(known_aggregation_strategies(), vec!["concatenate", "average"]);
    }
}
