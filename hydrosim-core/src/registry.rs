//! Catalog of known models.
//!
//! Models are registered by string identifier together with their kind and a factory.
//! Simulations look models up here when swapping the model of an element.

use crate::component::{Component, ComponentKind};
use crate::errors::{HydroError, HydroResult};
use indexmap::IndexMap;

/// Creates a component with default parameters and an initial state.
pub type ComponentFactory = fn() -> Box<dyn Component>;

#[derive(Debug, Clone)]
struct RegistryEntry {
    kind: ComponentKind,
    factory: ComponentFactory,
}

/// Lookup table of model identifiers.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: IndexMap<String, RegistryEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model. A later registration under the same identifier replaces the earlier one.
    pub fn register(
        &mut self,
        model_id: &str,
        kind: ComponentKind,
        factory: ComponentFactory,
    ) -> &mut Self {
        self.entries
            .insert(model_id.to_string(), RegistryEntry { kind, factory });
        self
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.entries.contains_key(model_id)
    }

    pub fn kind_of(&self, model_id: &str) -> HydroResult<ComponentKind> {
        self.entry(model_id).map(|e| e.kind)
    }

    /// Create a fresh instance of a model.
    pub fn create(&self, model_id: &str) -> HydroResult<Box<dyn Component>> {
        Ok((self.entry(model_id)?.factory)())
    }

    /// Create a fresh instance, checking that it is of the expected kind.
    pub fn create_of_kind(
        &self,
        model_id: &str,
        kind: ComponentKind,
    ) -> HydroResult<Box<dyn Component>> {
        let actual = self.kind_of(model_id)?;
        if actual != kind {
            return Err(HydroError::Configuration(format!(
                "model '{}' is a {} model, expected a {} model",
                model_id, actual, kind
            )));
        }
        self.create(model_id)
    }

    /// Identifiers of registered models, optionally restricted to a kind.
    pub fn model_ids(&self, kind: Option<ComponentKind>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| kind.map_or(true, |k| e.kind == k))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Variable identifiers exposed by a model.
    pub fn variable_ids(&self, model_id: &str) -> HydroResult<Vec<String>> {
        Ok(self.create(model_id)?.variable_ids())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, model_id: &str) -> HydroResult<&RegistryEntry> {
        self.entries
            .get(model_id)
            .ok_or_else(|| HydroError::UnknownModel(model_id.to_string()))
    }
}
