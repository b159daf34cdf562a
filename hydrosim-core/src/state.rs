//! Snapshots of model states.
//!
//! A [`ModelState`] is the internal state of a single component, keyed by state variable name.
//! [`MemoryStates`] gathers the states of every component of a network, together with the flows
//! through each element, so that a simulation can be restarted from a point in time without
//! re-running earlier steps. Snapshots are plain
//! values: they can be saved, reloaded and applied to any structurally compatible network.

use crate::component::ComponentKind;
use crate::errors::HydroResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Internal state of one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    values: BTreeMap<String, f64>,
}

impl ModelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Collect a sequence stored under indexed names (`{prefix}_{i}`).
    pub fn get_sequence(&self, prefix: &str, len: usize) -> Option<Vec<f64>> {
        (0..len)
            .map(|i| self.get(&format!("{}_{}", prefix, i)))
            .collect()
    }

    /// Store a sequence under indexed names (`{prefix}_{i}`).
    pub fn insert_sequence(&mut self, prefix: &str, values: &[f64]) {
        for (i, v) in values.iter().enumerate() {
            self.insert(format!("{}_{}", prefix, i), *v);
        }
    }
}

impl FromIterator<(String, f64)> for ModelState {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Flows through an element at the end of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementFlows {
    pub inflow: f64,
    pub lateral_inflow: f64,
    pub outflow: f64,
}

/// States of every component in a network, keyed by element key then component slot,
/// and the flows through each element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStates {
    elements: BTreeMap<String, BTreeMap<ComponentKind, ModelState>>,
    #[serde(default)]
    flows: BTreeMap<String, ElementFlows>,
}

impl MemoryStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, element_key: impl Into<String>, slot: ComponentKind, state: ModelState) {
        self.elements
            .entry(element_key.into())
            .or_default()
            .insert(slot, state);
    }

    pub fn get(&self, element_key: &str, slot: ComponentKind) -> Option<&ModelState> {
        self.elements.get(element_key).and_then(|e| e.get(&slot))
    }

    pub fn insert_flows(&mut self, element_key: impl Into<String>, flows: ElementFlows) {
        self.flows.insert(element_key.into(), flows);
    }

    pub fn flows(&self, element_key: &str) -> Option<ElementFlows> {
        self.flows.get(element_key).copied()
    }

    pub fn iter_flows(&self) -> impl Iterator<Item = (&String, &ElementFlows)> {
        self.flows.iter()
    }

    /// The states and flows of the elements for which `keep` holds.
    pub fn filtered(&self, keep: impl Fn(&str) -> bool) -> MemoryStates {
        MemoryStates {
            elements: self
                .elements
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            flows: self
                .flows
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    pub fn element(&self, element_key: &str) -> Option<&BTreeMap<ComponentKind, ModelState>> {
        self.elements.get(element_key)
    }

    pub fn element_keys(&self) -> impl Iterator<Item = &String> {
        self.elements.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<ComponentKind, ModelState>)> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.flows.is_empty()
    }

    pub fn to_json_string(&self) -> HydroResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(content: &str) -> HydroResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> HydroResult<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> HydroResult<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_round_trip() {
        let mut state = ModelState::new();
        state.insert_sequence("UH1", &[0.1, 0.2, 0.3]);
        assert_eq!(state.len(), 3);
        assert_eq!(state.get_sequence("UH1", 3).unwrap(), vec![0.1, 0.2, 0.3]);
        assert!(state.get_sequence("UH1", 4).is_none());
    }

    #[test]
    fn memory_states_to_disk() {
        let mut states = MemoryStates::new();
        states.insert(
            "subarea.a",
            ComponentKind::Runoff,
            ModelState::new().with("S", 120.0).with("R", 40.0),
        );
        states.insert(
            "node.dam",
            ComponentKind::Reservoir,
            ModelState::new().with("Storage", 1.0e6),
        );
        states.insert_flows(
            "node.dam",
            ElementFlows {
                inflow: 12.0,
                lateral_inflow: 0.0,
                outflow: 9.5,
            },
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.json");
        states.save_json(&path).unwrap();
        let loaded = MemoryStates::load_json(&path).unwrap();

        assert_eq!(loaded, states);
        assert_eq!(
            loaded
                .get("subarea.a", ComponentKind::Runoff)
                .unwrap()
                .get("S"),
            Some(120.0)
        );
        assert_eq!(loaded.flows("node.dam").unwrap().outflow, 9.5);
    }

    #[test]
    fn snapshots_without_flows_still_load() {
        let states = MemoryStates::from_json_str(r#"{"elements": {}}"#).unwrap();
        assert!(states.is_empty());
        assert!(states.flows("node.dam").is_none());
    }

    #[test]
    fn filtering_keeps_flows_of_kept_elements() {
        let mut states = MemoryStates::new();
        states.insert("link.a", ComponentKind::Routing, ModelState::new());
        states.insert_flows("link.a", ElementFlows::default());
        states.insert_flows("link.b", ElementFlows::default());
        let kept = states.filtered(|k| k == "link.a");
        assert_eq!(kept.len(), 1);
        assert!(kept.flows("link.a").is_some());
        assert!(kept.flows("link.b").is_none());
    }
}
