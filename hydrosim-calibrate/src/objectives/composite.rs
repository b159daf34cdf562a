use super::{ObjectiveEvaluator, ObjectiveScores};
use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::parameters::ParameterSpace;
use indexmap::IndexMap;

#[derive(Debug, Clone)]
struct WeightedObjective {
    name: String,
    weight: f64,
    objective: Box<dyn ObjectiveEvaluator>,
}

/// Weighted average of independent evaluators.
///
/// The primary score is the weighted average, followed by the score of every component
/// under the component's name. Components must agree on the direction of optimisation.
#[derive(Debug, Clone)]
pub struct CompositeObjective {
    name: String,
    components: Vec<WeightedObjective>,
}

impl CompositeObjective {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            components: Vec::new(),
        }
    }

    pub fn add(
        &mut self,
        name: &str,
        weight: f64,
        objective: Box<dyn ObjectiveEvaluator>,
    ) -> CalibrationResult<()> {
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(CalibrationError::Configuration(format!(
                "weight {} of '{}' must be finite and positive",
                weight, name
            )));
        }
        if name == self.name || self.components.iter().any(|c| c.name == name) {
            return Err(CalibrationError::Configuration(format!(
                "objective name '{}' is already used",
                name
            )));
        }
        if let Some(first) = self.components.first() {
            if first.objective.is_maximizable() != objective.is_maximizable() {
                return Err(CalibrationError::Configuration(format!(
                    "'{}' is not optimised in the same direction as '{}'",
                    name, first.name
                )));
            }
        }
        self.components.push(WeightedObjective {
            name: name.to_string(),
            weight,
            objective,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn evaluate_each<F>(&mut self, mut evaluate: F) -> CalibrationResult<ObjectiveScores>
    where
        F: FnMut(&mut dyn ObjectiveEvaluator) -> CalibrationResult<ObjectiveScores>,
    {
        if self.components.is_empty() {
            return Err(CalibrationError::Configuration(format!(
                "composite objective '{}' has no component",
                self.name
            )));
        }
        let mut parts = IndexMap::new();
        let mut total = 0.0;
        let mut weights = 0.0;
        let mut parameters = None;
        for component in self.components.iter_mut() {
            let scores = evaluate(component.objective.as_mut())?;
            total += component.weight * scores.value();
            weights += component.weight;
            parts.insert(component.name.clone(), scores.value());
            parameters.get_or_insert_with(|| scores.parameters().clone());
        }
        if weights == 0.0 {
            return Err(CalibrationError::Configuration(format!(
                "the weights of '{}' sum to zero",
                self.name
            )));
        }
        let mut values = IndexMap::from([(self.name.clone(), total / weights)]);
        values.extend(parts);
        ObjectiveScores::new(
            values,
            parameters.unwrap_or_default(),
            self.is_maximizable(),
        )
    }
}

impl ObjectiveEvaluator for CompositeObjective {
    fn is_maximizable(&self) -> bool {
        self.components
            .first()
            .map_or(false, |c| c.objective.is_maximizable())
    }

    fn score_names(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.components.iter().map(|c| c.name.clone()))
            .collect()
    }

    fn evaluate_score(&mut self) -> CalibrationResult<ObjectiveScores> {
        self.evaluate_each(|o| o.evaluate_score())
    }

    fn evaluate_score_for_parameters(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        self.evaluate_each(|o| o.evaluate_score_for_parameters(parameters))
    }

    fn evaluate_score_for_parameters_init_state(
        &mut self,
        parameters: &dyn ParameterSpace,
    ) -> CalibrationResult<ObjectiveScores> {
        self.evaluate_each(|o| o.evaluate_score_for_parameters_init_state(parameters))
    }

    fn box_clone(&self) -> Box<dyn ObjectiveEvaluator> {
        Box::new(self.clone())
    }

    fn supports_thread_safe_cloning(&self) -> bool {
        self.components
            .iter()
            .all(|c| c.objective.supports_thread_safe_cloning())
    }
}
