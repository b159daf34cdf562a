//! The catchment network: a directed acyclic graph of nodes, links and subareas.
//!
//! Edges follow the direction of flow. A link receives water from at most one upstream node
//! and from the subareas draining into it, and delivers it to at most one downstream node.
//! Nodes sum the outflows of their upstream links.
//!
//! Elements are solved once per time step in a topological order chosen by an
//! [`OrderingMethod`], so every element sees the outflows of its upstream elements for the
//! same step.

mod element;
mod ordering;
mod subset;

pub use element::{element_variables, Element};
pub use ordering::{known_ordering_methods, OrderingMethod};
pub use subset::SubsetOptions;

use crate::component::{ComponentKind, StepContext};
use crate::errors::{HydroError, HydroResult};
use crate::state::MemoryStates;
use crate::variable::{ElementKind, VariableId};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Catchment-wide streamflow: the summed outflow of the outlets.
pub const STREAMFLOW_RATE: &str = "StreamflowRate";

/// The element graph of a catchment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    graph: DiGraph<Element, ()>,
    index: BTreeMap<String, NodeIndex>,
    ordering: OrderingMethod,
    run_order: Vec<NodeIndex>,
}

impl Network {
    pub fn new(ordering: OrderingMethod) -> Self {
        Self {
            ordering,
            ..Default::default()
        }
    }

    /// Append an element. Keys must be unique.
    pub fn add_element(&mut self, element: Element) -> HydroResult<NodeIndex> {
        let key = element.key();
        if self.index.contains_key(&key) {
            return Err(HydroError::Configuration(format!(
                "element '{}' is declared twice",
                key
            )));
        }
        let ix = self.graph.add_node(element);
        self.index.insert(key, ix);
        self.refresh_order()?;
        Ok(ix)
    }

    /// Connect two elements in the direction of flow.
    pub fn connect(&mut self, from: &str, to: &str) -> HydroResult<()> {
        let a = self.index_of(from)?;
        let b = self.index_of(to)?;
        let (from_kind, to_kind) = (self.graph[a].kind(), self.graph[b].kind());
        let allowed = matches!(
            (from_kind, to_kind),
            (ElementKind::Node, ElementKind::Link)
                | (ElementKind::Link, ElementKind::Node)
                | (ElementKind::Subarea, ElementKind::Link)
        );
        if !allowed {
            return Err(HydroError::Configuration(format!(
                "cannot connect a {} to a {} ({} -> {})",
                from_kind, to_kind, from, to
            )));
        }
        if self.graph.find_edge(a, b).is_some() {
            return Err(HydroError::Configuration(format!(
                "{} is already connected to {}",
                from, to
            )));
        }
        let count_of = |ix: NodeIndex, dir: Direction, kind: ElementKind| {
            self.graph
                .neighbors_directed(ix, dir)
                .filter(|n| self.graph[*n].kind() == kind)
                .count()
        };
        let conflict = match (from_kind, to_kind) {
            (ElementKind::Node, ElementKind::Link) => {
                count_of(b, Direction::Incoming, ElementKind::Node) > 0
            }
            (ElementKind::Link, ElementKind::Node) | (ElementKind::Subarea, ElementKind::Link) => {
                self.graph.neighbors_directed(a, Direction::Outgoing).count() > 0
            }
            _ => false,
        };
        if conflict {
            return Err(HydroError::Configuration(format!(
                "connecting {} to {} would give an element more than one upstream node or downstream element",
                from, to
            )));
        }
        self.graph.add_edge(a, b, ());
        if let Err(e) = self.refresh_order() {
            if let Some(edge) = self.graph.find_edge(a, b) {
                self.graph.remove_edge(edge);
            }
            self.refresh_order()?;
            return Err(e);
        }
        Ok(())
    }

    pub fn ordering(&self) -> OrderingMethod {
        self.ordering
    }

    pub fn set_ordering(&mut self, method: OrderingMethod) -> HydroResult<()> {
        self.ordering = method;
        self.refresh_order()
    }

    fn refresh_order(&mut self) -> HydroResult<()> {
        self.run_order = ordering::execution_order(&self.graph, self.ordering)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    fn index_of(&self, key: &str) -> HydroResult<NodeIndex> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| HydroError::UnknownElement(key.to_string()))
    }

    pub fn element(&self, key: &str) -> HydroResult<&Element> {
        Ok(&self.graph[self.index_of(key)?])
    }

    pub fn element_mut(&mut self, key: &str) -> HydroResult<&mut Element> {
        let ix = self.index_of(key)?;
        Ok(&mut self.graph[ix])
    }

    /// Elements in declaration order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.graph.node_weights()
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.graph.node_weights_mut()
    }

    /// Elements of a kind in declaration order.
    pub fn elements_of(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.elements().filter(move |e| e.kind() == kind)
    }

    pub fn keys(&self, kind: Option<ElementKind>) -> Vec<String> {
        self.elements()
            .filter(|e| kind.map_or(true, |k| e.kind() == k))
            .map(|e| e.key())
            .collect()
    }

    pub fn ids(&self, kind: ElementKind) -> Vec<String> {
        self.elements_of(kind).map(|e| e.id().to_string()).collect()
    }

    pub fn names(&self, kind: ElementKind) -> Vec<String> {
        self.elements_of(kind).map(|e| e.name().to_string()).collect()
    }

    pub fn count(&self, kind: ElementKind) -> usize {
        self.elements_of(kind).count()
    }

    /// Resolve an element key, or a bare identifier if it is unique across kinds.
    pub fn resolve_key(&self, id_or_key: &str) -> HydroResult<String> {
        if self.index.contains_key(id_or_key) {
            return Ok(id_or_key.to_string());
        }
        let matches: Vec<String> = self
            .elements()
            .filter(|e| e.id() == id_or_key)
            .map(|e| e.key())
            .collect();
        match matches.len() {
            1 => Ok(matches[0].clone()),
            0 => Err(HydroError::UnknownElement(id_or_key.to_string())),
            _ => Err(HydroError::Configuration(format!(
                "identifier '{}' is ambiguous, use one of {:?}",
                id_or_key, matches
            ))),
        }
    }

    /// Keys in the order elements are solved.
    pub fn execution_order(&self) -> Vec<String> {
        self.run_order
            .iter()
            .map(|ix| self.graph[*ix].key())
            .collect()
    }

    /// Sort element keys by execution order under a method.
    pub fn sort_by_execution_order(
        &self,
        keys: &[String],
        method: OrderingMethod,
    ) -> HydroResult<Vec<String>> {
        let order = ordering::execution_order(&self.graph, method)?;
        let position: BTreeMap<NodeIndex, usize> =
            order.iter().enumerate().map(|(i, ix)| (*ix, i)).collect();
        let mut indexed = keys
            .iter()
            .map(|k| Ok((position[&self.index_of(k)?], k.clone())))
            .collect::<HydroResult<Vec<_>>>()?;
        indexed.sort();
        Ok(indexed.into_iter().map(|(_, k)| k).collect())
    }

    pub fn upstream_keys(&self, key: &str) -> HydroResult<Vec<String>> {
        self.neighbour_keys(key, Direction::Incoming)
    }

    pub fn downstream_keys(&self, key: &str) -> HydroResult<Vec<String>> {
        self.neighbour_keys(key, Direction::Outgoing)
    }

    fn neighbour_keys(&self, key: &str, direction: Direction) -> HydroResult<Vec<String>> {
        let ix = self.index_of(key)?;
        let mut keys: Vec<String> = self
            .graph
            .neighbors_directed(ix, direction)
            .map(|n| self.graph[n].key())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Nodes and links with nothing downstream.
    pub fn outlets(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .filter(|ix| self.graph[*ix].kind() != ElementKind::Subarea)
            .filter(|ix| {
                self.graph
                    .neighbors_directed(*ix, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|ix| self.graph[ix].key())
            .collect()
    }

    /// Solve every element once, in execution order.
    pub(crate) fn step(&mut self, context: &StepContext) -> HydroResult<()> {
        for position in 0..self.run_order.len() {
            let ix = self.run_order[position];
            let (upstream, lateral) = self.incoming_flows(ix);
            self.graph[ix].step(context, upstream, lateral)?;
        }
        Ok(())
    }

    fn incoming_flows(&self, ix: NodeIndex) -> (f64, f64) {
        let mut upstream = 0.0;
        let mut lateral = 0.0;
        for edge in self.graph.edges_directed(ix, Direction::Incoming) {
            let source = &self.graph[edge.source()];
            match source.kind() {
                ElementKind::Subarea => lateral += source.outflow(),
                _ => upstream += source.outflow(),
            }
        }
        (upstream, lateral)
    }

    pub fn reset(&mut self) {
        for element in self.graph.node_weights_mut() {
            element.reset();
        }
    }

    pub fn get_variable(&self, id: &VariableId) -> HydroResult<f64> {
        match id {
            VariableId::Catchment { name } if name == STREAMFLOW_RATE => {
                let mut total = 0.0;
                for key in self.outlets() {
                    total += self.element(&key)?.outflow();
                }
                Ok(total)
            }
            VariableId::Catchment { .. } => Err(HydroError::UnknownVariable(id.to_string())),
            VariableId::Element {
                kind,
                id: element_id,
                slot,
                name,
            } => self
                .element(&kind.key(element_id))?
                .get_variable(name, *slot),
        }
    }

    pub fn set_variable(&mut self, id: &VariableId, value: f64) -> HydroResult<()> {
        match id {
            VariableId::Catchment { .. } => Err(HydroError::Configuration(format!(
                "catchment variable '{}' is read only",
                id
            ))),
            VariableId::Element {
                kind,
                id: element_id,
                slot,
                name,
            } => self
                .element_mut(&kind.key(element_id))?
                .set_variable(name, *slot, value),
        }
    }

    /// Check that a variable exists, and is writable if `writable` is set.
    pub fn check_variable(&self, id: &VariableId, writable: bool) -> HydroResult<()> {
        match id {
            VariableId::Catchment { name } if name == STREAMFLOW_RATE && !writable => Ok(()),
            VariableId::Catchment { .. } => Err(HydroError::UnknownVariable(id.to_string())),
            VariableId::Element {
                kind,
                id: element_id,
                slot,
                name,
            } => {
                let element = self.element(&kind.key(element_id))?;
                match element.role(name, *slot) {
                    None => Err(HydroError::UnknownVariable(id.to_string())),
                    Some(role) if writable && !role.is_writable() => Err(
                        HydroError::Configuration(format!("variable '{}' is read only", id)),
                    ),
                    Some(_) => Ok(()),
                }
            }
        }
    }

    pub fn snapshot_states(&self) -> MemoryStates {
        let mut states = MemoryStates::new();
        for element in self.elements() {
            for (slot, state) in element.get_states() {
                states.insert(element.key(), slot, state);
            }
            states.insert_flows(element.key(), element.flows());
        }
        states
    }

    /// Apply states and flows to the matching elements. Every element key must exist.
    pub fn apply_states(&mut self, states: &MemoryStates) -> HydroResult<()> {
        for (key, _) in states.iter_flows() {
            self.element(key)?;
        }
        for (key, slots) in states.iter() {
            let element = self.element(key)?;
            if let Some(slot) = slots.keys().find(|s| element.component(**s).is_none()) {
                return Err(HydroError::Configuration(format!(
                    "{} has no {} model to receive a state",
                    key, slot
                )));
            }
        }
        for (key, slots) in states.iter() {
            self.element_mut(key)?.set_states(slots)?;
        }
        for (key, flows) in states.iter_flows() {
            self.element_mut(key)?.set_flows(flows);
        }
        Ok(())
    }

    /// A new network made of the elements upstream or downstream of `key`.
    pub fn subset(&self, key: &str, options: &SubsetOptions) -> HydroResult<Network> {
        let start = self.index_of(key)?;
        let terminations = options
            .termination_elements
            .iter()
            .map(|k| self.index_of(k))
            .collect::<HydroResult<HashSet<_>>>()?;
        let selected = subset::select(&self.graph, start, &terminations, options);
        self.retain(&selected)
    }

    fn retain(&self, selected: &BTreeSet<NodeIndex>) -> HydroResult<Network> {
        let mut network = Network::new(self.ordering);
        let mut mapping = BTreeMap::new();
        // Declaration order is preserved since indices are visited in ascending order
        for ix in selected {
            let new_ix = network.graph.add_node(self.graph[*ix].clone());
            network.index.insert(self.graph[*ix].key(), new_ix);
            mapping.insert(*ix, new_ix);
        }
        for edge in self.graph.edge_references() {
            if let (Some(a), Some(b)) = (mapping.get(&edge.source()), mapping.get(&edge.target()))
            {
                network.graph.add_edge(*a, *b, ());
            }
        }
        network.refresh_order()?;
        Ok(network)
    }

    /// Swap the component of one slot on an element, returning the previous one.
    pub fn set_component(
        &mut self,
        key: &str,
        component: Box<dyn crate::component::Component>,
    ) -> HydroResult<Option<Box<dyn crate::component::Component>>> {
        self.element_mut(key)?.set_component(component)
    }

    pub fn remove_component(&mut self, key: &str, slot: ComponentKind) -> HydroResult<()> {
        let element = self.element_mut(key)?;
        if slot == ComponentKind::Runoff {
            return Err(HydroError::Configuration(format!(
                "the runoff model of {} cannot be removed, swap it instead",
                key
            )));
        }
        element.remove_component(slot).map(|_| ()).ok_or_else(|| {
            HydroError::Configuration(format!("{} has no {} model", key, slot))
        })
    }

    /// DOT description of the element graph, for external visualisation tools.
    pub fn to_dot(&self) -> String {
        let dot = Dot::with_attr_getters(
            &self.graph,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, _| String::new(),
            &|_, (_, element)| {
                let models = element.model_ids().join(", ");
                let label = if models.is_empty() {
                    element.key()
                } else {
                    format!("{}\\n{}", element.key(), models)
                };
                let shape = match element.kind() {
                    ElementKind::Node => "circle",
                    ElementKind::Link => "box",
                    ElementKind::Subarea => "house",
                };
                format!(
                    "label = \"{}\" shape = {}",
                    label.replace('"', "\\\""),
                    shape
                )
            },
        );
        format!("{:?}", dot)
    }
}
