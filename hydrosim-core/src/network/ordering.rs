//! Execution order of the elements.
//!
//! Elements are solved in a topological order of the flow graph. Several orders are usually
//! valid; the ordering method decides which ready element is taken next:
//!
//! - `declaration`: the element declared first in the network.
//! - `identifier`: the element whose key (`kind.id`) sorts first.
//!
//! Both are deterministic and independent of hash ordering.

use crate::errors::{HydroError, HydroResult};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::element::Element;

/// Tie-break policy of the topological sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderingMethod {
    #[default]
    Declaration,
    Identifier,
}

impl OrderingMethod {
    pub fn name(&self) -> &'static str {
        match self {
            OrderingMethod::Declaration => "declaration",
            OrderingMethod::Identifier => "identifier",
        }
    }
}

/// Names of the available ordering methods.
pub fn known_ordering_methods() -> Vec<&'static str> {
    vec![
        OrderingMethod::Declaration.name(),
        OrderingMethod::Identifier.name(),
    ]
}

impl Display for OrderingMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for OrderingMethod {
    type Err = HydroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "declaration" => Ok(OrderingMethod::Declaration),
            "identifier" => Ok(OrderingMethod::Identifier),
            other => Err(HydroError::Configuration(format!(
                "unknown ordering method '{}', expected one of {:?}",
                other,
                known_ordering_methods()
            ))),
        }
    }
}

/// Sort key of a ready element under a method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    Declaration(usize),
    Identifier(String),
}

fn priority(graph: &DiGraph<Element, ()>, ix: NodeIndex, method: OrderingMethod) -> Priority {
    match method {
        OrderingMethod::Declaration => Priority::Declaration(ix.index()),
        OrderingMethod::Identifier => Priority::Identifier(graph[ix].key()),
    }
}

/// Topological order of the graph.
///
/// Node indices follow declaration order since elements are only ever appended.
/// Fails with [`HydroError::Cycle`] if the graph is not acyclic.
pub(crate) fn execution_order(
    graph: &DiGraph<Element, ()>,
    method: OrderingMethod,
) -> HydroResult<Vec<NodeIndex>> {
    toposort(graph, None).map_err(|cycle| HydroError::Cycle(graph[cycle.node_id()].key()))?;

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|ix| graph.neighbors_directed(ix, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<(Priority, NodeIndex)>> = graph
        .node_indices()
        .filter(|ix| in_degree[ix.index()] == 0)
        .map(|ix| Reverse((priority(graph, ix, method), ix)))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse((_, ix))) = ready.pop() {
        order.push(ix);
        for next in graph.neighbors_directed(ix, Direction::Outgoing) {
            in_degree[next.index()] -= 1;
            if in_degree[next.index()] == 0 {
                ready.push(Reverse((priority(graph, next, method), next)));
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> DiGraph<Element, ()> {
        // Two headwater branches joining at n3:
        //   z -> lz -> n3, a -> la -> n3
        let mut g = DiGraph::new();
        let z = g.add_node(Element::node("z", "Z").unwrap());
        let lz = g.add_node(Element::link("lz", "LZ").unwrap());
        let a = g.add_node(Element::node("a", "A").unwrap());
        let la = g.add_node(Element::link("la", "LA").unwrap());
        let n3 = g.add_node(Element::node("n3", "N3").unwrap());
        g.add_edge(z, lz, ());
        g.add_edge(lz, n3, ());
        g.add_edge(a, la, ());
        g.add_edge(la, n3, ());
        g
    }

    fn keys(g: &DiGraph<Element, ()>, order: &[NodeIndex]) -> Vec<String> {
        order.iter().map(|ix| g[*ix].key()).collect()
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let g = graph();
        let order = execution_order(&g, OrderingMethod::Declaration).unwrap();
        assert_eq!(
            keys(&g, &order),
            vec!["node.z", "link.lz", "node.a", "link.la", "node.n3"]
        );
    }

    #[test]
    fn identifier_order_breaks_ties() {
        let g = graph();
        let order = execution_order(&g, OrderingMethod::Identifier).unwrap();
        assert_eq!(
            keys(&g, &order),
            vec!["node.a", "link.la", "node.z", "link.lz", "node.n3"]
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut g = graph();
        let n3 = NodeIndex::new(4);
        let z = NodeIndex::new(0);
        g.add_edge(n3, z, ());
        assert!(matches!(
            execution_order(&g, OrderingMethod::Declaration),
            Err(HydroError::Cycle(_))
        ));
    }

    #[test]
    fn method_names() {
        assert_eq!(
            "identifier".parse::<OrderingMethod>().unwrap(),
            OrderingMethod::Identifier
        );
        assert!("alphabetical".parse::<OrderingMethod>().is_err());
        assert_eq!(known_ordering_methods(), vec!["declaration", "identifier"]);
    }
}
