use crate::errors::{HydroError, HydroResult};
use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{unknown_parameter, Parameter, ParameterSpace};

/// Selects parameter names to show or hide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameSelector {
    /// Exact names.
    Names(Vec<String>),
    /// Names starting with a prefix.
    Prefix(String),
    /// Names matching a regular expression.
    Pattern(String),
}

impl NameSelector {
    fn select(&self, available: &[String], strict: bool) -> HydroResult<Vec<String>> {
        let selected: Vec<String> = match self {
            NameSelector::Names(names) => {
                if strict {
                    if let Some(missing) = names.iter().find(|n| !available.contains(n)) {
                        return Err(unknown_parameter(missing));
                    }
                }
                names
                    .iter()
                    .filter(|n| available.contains(n))
                    .cloned()
                    .collect()
            }
            NameSelector::Prefix(prefix) => available
                .iter()
                .filter(|n| n.starts_with(prefix.as_str()))
                .cloned()
                .collect(),
            NameSelector::Pattern(pattern) => {
                let regex = Regex::new(pattern).map_err(|e| {
                    HydroError::Configuration(format!("invalid pattern '{}': {}", pattern, e))
                })?;
                available
                    .iter()
                    .filter(|n| regex.is_match(n))
                    .cloned()
                    .collect()
            }
        };
        if strict && selected.is_empty() {
            return Err(HydroError::UnknownParameter(format!("{:?}", self)));
        }
        Ok(selected)
    }
}

/// Hides some parameters of the inner space.
///
/// Hidden parameters keep their value and are still applied to simulations, so hiding is the
/// way to fix parameters out of a calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteringParameterSpace {
    inner: Box<dyn ParameterSpace>,
    hidden: IndexSet<String>,
}

impl FilteringParameterSpace {
    /// Wrap a space with every parameter visible.
    pub fn new(inner: Box<dyn ParameterSpace>) -> Self {
        Self {
            inner,
            hidden: IndexSet::new(),
        }
    }

    /// Hide the selected parameters. With `strict`, selecting names that do not exist fails.
    pub fn hide(&mut self, selector: &NameSelector, strict: bool) -> HydroResult<()> {
        let selected = selector.select(&self.inner.names(), strict)?;
        self.hidden.extend(selected);
        Ok(())
    }

    /// Show the selected parameters again.
    pub fn show(&mut self, selector: &NameSelector, strict: bool) -> HydroResult<()> {
        let selected = selector.select(&self.inner.names(), strict)?;
        for name in selected {
            self.hidden.shift_remove(&name);
        }
        Ok(())
    }

    pub fn show_all(&mut self) {
        self.hidden.clear();
    }

    pub fn hide_all(&mut self) {
        self.hidden = self.inner.names().into_iter().collect();
    }

    pub fn hidden_names(&self) -> Vec<String> {
        self.hidden.iter().cloned().collect()
    }

    /// The wrapped space, hidden parameters included.
    pub fn inner(&self) -> &dyn ParameterSpace {
        self.inner.as_ref()
    }

    fn visible(&self, name: &str) -> HydroResult<()> {
        if self.hidden.contains(name) {
            return Err(unknown_parameter(name));
        }
        Ok(())
    }
}

#[typetag::serde]
impl ParameterSpace for FilteringParameterSpace {
    fn names(&self) -> Vec<String> {
        self.inner
            .names()
            .into_iter()
            .filter(|n| !self.hidden.contains(n))
            .collect()
    }

    fn get(&self, name: &str) -> HydroResult<Parameter> {
        self.visible(name)?;
        self.inner.get(name)
    }

    fn set_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        self.visible(name)?;
        self.inner.set_value(name, value)
    }

    fn set_min(&mut self, name: &str, min: f64) -> HydroResult<()> {
        self.visible(name)?;
        self.inner.set_min(name, min)
    }

    fn set_max(&mut self, name: &str, max: f64) -> HydroResult<()> {
        self.visible(name)?;
        self.inner.set_max(name, max)
    }

    fn box_clone(&self) -> Box<dyn ParameterSpace> {
        Box::new(self.clone())
    }

    fn set_definition(&mut self, name: &str, min: f64, max: f64, value: f64) -> HydroResult<()> {
        self.visible(name)?;
        self.inner.set_definition(name, min, max, value)
    }

    fn applies_to_model(&self) -> bool {
        self.inner.applies_to_model()
    }

    fn apply(&self, simulation: &mut crate::simulation::Simulation) -> HydroResult<()> {
        self.inner.apply(simulation)
    }

    fn supports_thread_safe_cloning(&self) -> bool {
        self.inner.supports_thread_safe_cloning()
    }

    fn to_hypercube(&self) -> HydroResult<super::Hypercube> {
        let mut hypercube = self.inner.to_hypercube()?;
        for name in &self.hidden {
            hypercube.remove_parameter(name)?;
        }
        Ok(hypercube)
    }
}
