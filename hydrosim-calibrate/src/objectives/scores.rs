use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::parameters::Hypercube;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Scores of one evaluation, together with the parameters that produced them.
///
/// The first score is the one optimisers work on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveScores {
    scores: IndexMap<String, f64>,
    parameters: Hypercube,
    maximizable: bool,
}

impl ObjectiveScores {
    pub fn new(
        scores: IndexMap<String, f64>,
        parameters: Hypercube,
        maximizable: bool,
    ) -> CalibrationResult<Self> {
        if scores.is_empty() {
            return Err(CalibrationError::Configuration(
                "an evaluation must produce at least one score".to_string(),
            ));
        }
        Ok(Self {
            scores,
            parameters,
            maximizable,
        })
    }

    /// Scores of a candidate whose evaluation failed. Every other candidate is better.
    pub fn dominated(names: &[String], parameters: Hypercube, maximizable: bool) -> Self {
        let worst = if maximizable {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        let mut scores: IndexMap<String, f64> =
            names.iter().map(|n| (n.clone(), worst)).collect();
        if scores.is_empty() {
            scores.insert("score".to_string(), worst);
        }
        Self {
            scores,
            parameters,
            maximizable,
        }
    }

    pub fn primary_name(&self) -> &str {
        self.scores.keys().next().map(String::as_str).unwrap_or_default()
    }

    /// Value of the primary score.
    pub fn value(&self) -> f64 {
        self.scores.values().next().copied().unwrap_or(f64::NAN)
    }

    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.get(name).copied()
    }

    pub fn scores(&self) -> &IndexMap<String, f64> {
        &self.scores
    }

    pub fn parameters(&self) -> &Hypercube {
        &self.parameters
    }

    pub fn is_maximizable(&self) -> bool {
        self.maximizable
    }

    /// Primary score as a quantity to minimise. Undefined scores are the worst possible.
    pub fn cost(&self) -> f64 {
        to_cost(self.value(), self.maximizable)
    }

    pub fn is_better_than(&self, other: &ObjectiveScores) -> bool {
        self.cost() < other.cost()
    }
}

pub(crate) fn to_cost(value: f64, maximizable: bool) -> f64 {
    let cost = if maximizable { -value } else { value };
    if cost.is_nan() {
        f64::INFINITY
    } else {
        cost
    }
}

/// Sort a set of scores, best first, by the named score.
pub fn sort_by_score(scores: &mut [ObjectiveScores], name: &str) -> CalibrationResult<()> {
    if let Some(missing) = scores.iter().find(|s| s.score(name).is_none()) {
        return Err(CalibrationError::Configuration(format!(
            "score '{}' is not one of {:?}",
            name,
            missing.scores().keys().collect::<Vec<_>>()
        )));
    }
    let key = |s: &ObjectiveScores| to_cost(s.score(name).unwrap_or(f64::NAN), s.maximizable);
    scores.sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal));
    Ok(())
}

/// Best of a set of scores by the named score.
pub fn best_score<'a>(
    scores: &'a [ObjectiveScores],
    name: &str,
) -> CalibrationResult<&'a ObjectiveScores> {
    let mut best: Option<(&ObjectiveScores, f64)> = None;
    for s in scores {
        let value = s.score(name).ok_or_else(|| {
            CalibrationError::Configuration(format!("score '{}' is not defined", name))
        })?;
        let cost = to_cost(value, s.maximizable);
        if best.map_or(true, |(_, c)| cost < c) {
            best = Some((s, cost));
        }
    }
    best.map(|(s, _)| s)
        .ok_or_else(|| CalibrationError::Configuration("the set of scores is empty".to_string()))
}

/// Parameter sets of a population of scores, in the same order.
pub fn scores_to_parameter_spaces(scores: &[ObjectiveScores]) -> Vec<Hypercube> {
    scores.iter().map(|s| s.parameters.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrosim_core::parameters::ParameterSpace;

    fn scores(nse: f64, bias: f64) -> ObjectiveScores {
        let mut parameters = Hypercube::new();
        parameters.add_parameter("x", -1e4, 1e4, nse * 10.0).unwrap();
        let values = IndexMap::from([("NSE".to_string(), nse), ("Bias".to_string(), bias)]);
        ObjectiveScores::new(values, parameters, true).unwrap()
    }

    #[test]
    fn sort_and_best() {
        let mut population = vec![scores(0.5, 0.1), scores(0.9, 0.3), scores(0.7, 0.0)];
        sort_by_score(&mut population, "NSE").unwrap();
        let order: Vec<f64> = population.iter().map(|s| s.value()).collect();
        assert_eq!(order, vec![0.9, 0.7, 0.5]);
        assert_eq!(best_score(&population, "NSE").unwrap().value(), 0.9);
        assert!(sort_by_score(&mut population, "KGE").is_err());

        let spaces = scores_to_parameter_spaces(&population);
        assert_eq!(spaces[0].value("x").unwrap(), 9.0);
    }

    #[test]
    fn dominated_scores_lose() {
        let failed = ObjectiveScores::dominated(&["NSE".to_string()], Hypercube::new(), true);
        assert_eq!(failed.value(), f64::NEG_INFINITY);
        assert!(scores(-100.0, 0.0).is_better_than(&failed));
        assert_eq!(failed.cost(), f64::INFINITY);
    }

    #[test]
    fn nan_scores_cost_the_most() {
        assert_eq!(to_cost(f64::NAN, false), f64::INFINITY);
        assert_eq!(to_cost(2.0, true), -2.0);
    }
}
