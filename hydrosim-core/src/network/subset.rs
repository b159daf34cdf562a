//! Selection of parts of a network.

use crate::errors::{HydroError, HydroResult};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashSet};

use super::element::Element;

/// How to select a sub-network relative to an element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsetOptions {
    /// Select the elements upstream of the element (true) or downstream (false).
    pub select_network_above_element: bool,
    /// Whether the element itself is part of the selection.
    pub include_element_in_selection: bool,
    /// Keep everything but the selection.
    pub invert_selection: bool,
    /// Keys of elements beyond which the traversal does not continue. They are selected.
    pub termination_elements: Vec<String>,
}

impl SubsetOptions {
    /// Options for the named actions `keep above`, `keep above exclusive`,
    /// `keep below` and `keep below exclusive`.
    pub fn from_action(action: &str) -> HydroResult<Self> {
        let (above, include) = match action.trim().to_lowercase().as_str() {
            "keep above" => (true, true),
            "keep above exclusive" => (true, false),
            "keep below" => (false, true),
            "keep below exclusive" => (false, false),
            other => {
                return Err(HydroError::Configuration(format!(
                    "unknown subset action '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            select_network_above_element: above,
            include_element_in_selection: include,
            ..Default::default()
        })
    }

    pub fn with_termination_elements(mut self, keys: Vec<String>) -> Self {
        self.termination_elements = keys;
        self
    }
}

/// Indices of the selected elements.
pub(crate) fn select(
    graph: &DiGraph<Element, ()>,
    start: NodeIndex,
    terminations: &HashSet<NodeIndex>,
    options: &SubsetOptions,
) -> BTreeSet<NodeIndex> {
    let direction = if options.select_network_above_element {
        Direction::Incoming
    } else {
        Direction::Outgoing
    };

    let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
    let mut stack = vec![start];
    while let Some(ix) = stack.pop() {
        if !visited.insert(ix) {
            continue;
        }
        if ix != start && terminations.contains(&ix) {
            continue;
        }
        stack.extend(graph.neighbors_directed(ix, direction));
    }
    if !options.include_element_in_selection {
        visited.remove(&start);
    }

    if options.invert_selection {
        graph
            .node_indices()
            .filter(|ix| !visited.contains(ix))
            .collect()
    } else {
        visited
    }
}
