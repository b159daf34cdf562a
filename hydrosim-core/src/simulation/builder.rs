//! Simulation builder for constructing simulations from a catchment description.

use crate::component::ComponentKind;
use crate::errors::{HydroError, HydroResult};
use crate::network::{Element, Network, OrderingMethod};
use crate::registry::ModelRegistry;
use crate::timeseries::{Instant, TimeStep};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::runtime::Simulation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: String,
    pub name: String,
}

/// A link, optionally fed by an upstream node and draining into a downstream node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDescription {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// A subarea draining into a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubareaDescription {
    pub id: String,
    pub name: String,
    pub link: String,
    pub area_km2: f64,
}

/// Topology and physical attributes of a catchment.
///
/// Node and link references use bare identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatchmentStructure {
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub subareas: Vec<SubareaDescription>,
}

impl CatchmentStructure {
    pub fn from_json_str(content: &str) -> HydroResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Build a new simulation from a catchment description and model identifiers.
///
/// Every subarea is given a fresh instance of the runoff model, and every link a fresh
/// instance of the routing model if one is set.
pub struct SimulationBuilder {
    structure: CatchmentStructure,
    runoff_model: Option<String>,
    routing_model: Option<String>,
    time_step: TimeStep,
    span: Option<(Instant, Instant)>,
    ordering: OrderingMethod,
    registry: Arc<ModelRegistry>,
}

impl SimulationBuilder {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            structure: CatchmentStructure::default(),
            runoff_model: None,
            routing_model: None,
            time_step: TimeStep::DAILY,
            span: None,
            ordering: OrderingMethod::default(),
            registry,
        }
    }

    pub fn with_structure(&mut self, structure: CatchmentStructure) -> &mut Self {
        self.structure = structure;
        self
    }

    pub fn with_node(&mut self, id: &str, name: &str) -> &mut Self {
        self.structure.nodes.push(NodeDescription {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_link(
        &mut self,
        id: &str,
        name: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> &mut Self {
        self.structure.links.push(LinkDescription {
            id: id.to_string(),
            name: name.to_string(),
            from: from.map(String::from),
            to: to.map(String::from),
        });
        self
    }

    pub fn with_subarea(&mut self, id: &str, name: &str, link: &str, area_km2: f64) -> &mut Self {
        self.structure.subareas.push(SubareaDescription {
            id: id.to_string(),
            name: name.to_string(),
            link: link.to_string(),
            area_km2,
        });
        self
    }

    pub fn with_runoff_model(&mut self, model_id: &str) -> &mut Self {
        self.runoff_model = Some(model_id.to_string());
        self
    }

    pub fn with_routing_model(&mut self, model_id: &str) -> &mut Self {
        self.routing_model = Some(model_id.to_string());
        self
    }

    pub fn with_time_step(&mut self, time_step: TimeStep) -> &mut Self {
        self.time_step = time_step;
        self
    }

    pub fn with_span(&mut self, start: Instant, end: Instant) -> &mut Self {
        self.span = Some((start, end));
        self
    }

    pub fn with_ordering_method(&mut self, ordering: OrderingMethod) -> &mut Self {
        self.ordering = ordering;
        self
    }

    /// Builds the simulation.
    ///
    /// Fails if a model identifier is unknown, a reference points to a missing element,
    /// the connections break the topology rules or form a cycle, or no span was given.
    pub fn build(&self) -> HydroResult<Simulation> {
        let (start, end) = self.span.ok_or_else(|| {
            HydroError::Configuration("no simulation span was given".to_string())
        })?;
        let runoff_model = self.runoff_model.as_deref().ok_or_else(|| {
            HydroError::Configuration("no runoff model was given".to_string())
        })?;
        let runoff = self
            .registry
            .create_of_kind(runoff_model, ComponentKind::Runoff)?;
        let routing = self
            .routing_model
            .as_deref()
            .map(|id| self.registry.create_of_kind(id, ComponentKind::Routing))
            .transpose()?;

        let mut network = Network::new(self.ordering);
        for node in &self.structure.nodes {
            network.add_element(Element::node(&node.id, &node.name)?)?;
        }
        for link in &self.structure.links {
            let mut element = Element::link(&link.id, &link.name)?;
            if let Some(routing) = &routing {
                element.set_component(routing.clone())?;
            }
            network.add_element(element)?;
        }
        for subarea in &self.structure.subareas {
            let mut element = Element::subarea(&subarea.id, &subarea.name, subarea.area_km2)?;
            element.set_component(runoff.clone())?;
            network.add_element(element)?;
        }

        for link in &self.structure.links {
            let key = format!("link.{}", link.id);
            if let Some(from) = &link.from {
                network.connect(&format!("node.{}", from), &key)?;
            }
            if let Some(to) = &link.to {
                network.connect(&key, &format!("node.{}", to))?;
            }
        }
        for subarea in &self.structure.subareas {
            network.connect(
                &format!("subarea.{}", subarea.id),
                &format!("link.{}", subarea.link),
            )?;
        }

        Simulation::new(network, self.time_step, start, end, self.registry.clone())
    }
}
