//! Variable definitions and identifiers.
//!
//! Variables are addressed by strings of the form `<kind>.<element id>.<variable>`,
//! e.g. `subarea.lnk1.x1` or `node.n2.OutflowRate`. The variable part may be qualified by the
//! component slot holding it (`node.dam.reservoir.Storage`) when an element carries several
//! components exposing the same name. `Catchment.<variable>` addresses catchment-wide values.

use crate::component::ComponentKind;
use crate::errors::{HydroError, HydroResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Storage type of a variable.
///
/// All values travel as `f64`; integers and booleans are rounded and compared to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    Double,
    Integer,
    Boolean,
}

/// What a variable is used for inside a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableRole {
    /// Calibration parameter, writable.
    Parameter,
    /// Internal state carried between steps, writable.
    State,
    /// Externally driven input, writable ("played").
    Input,
    /// Computed output, read only.
    Output,
}

impl VariableRole {
    pub fn is_writable(&self) -> bool {
        !matches!(self, VariableRole::Output)
    }
}

/// Definition of a variable exposed by a component or an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    pub variable_type: VariableType,
    pub role: VariableRole,
    pub unit: String,
}

impl VariableDefinition {
    pub fn new(name: &str, variable_type: VariableType, role: VariableRole, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            variable_type,
            role,
            unit: unit.to_string(),
        }
    }

    pub fn parameter(name: &str, unit: &str) -> Self {
        Self::new(name, VariableType::Double, VariableRole::Parameter, unit)
    }

    pub fn state(name: &str, unit: &str) -> Self {
        Self::new(name, VariableType::Double, VariableRole::State, unit)
    }

    pub fn input(name: &str, unit: &str) -> Self {
        Self::new(name, VariableType::Double, VariableRole::Input, unit)
    }

    pub fn output(name: &str, unit: &str) -> Self {
        Self::new(name, VariableType::Double, VariableRole::Output, unit)
    }

    pub fn with_type(mut self, variable_type: VariableType) -> Self {
        self.variable_type = variable_type;
        self
    }
}

/// Kind of element in the catchment graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    Node,
    Link,
    Subarea,
}

impl ElementKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Link => "link",
            ElementKind::Subarea => "subarea",
        }
    }

    /// Key of an element of this kind, e.g. `link.lnk1`.
    pub fn key(&self, id: &str) -> String {
        format!("{}.{}", self.tag(), id)
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for ElementKind {
    type Err = HydroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "node" => Ok(ElementKind::Node),
            "link" => Ok(ElementKind::Link),
            "subarea" => Ok(ElementKind::Subarea),
            _ => Err(HydroError::Configuration(format!(
                "unknown element kind '{}'",
                s
            ))),
        }
    }
}

/// Parsed variable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableId {
    Element {
        kind: ElementKind,
        id: String,
        slot: Option<ComponentKind>,
        name: String,
    },
    Catchment {
        name: String,
    },
}

pub const CATCHMENT_PREFIX: &str = "Catchment";

impl VariableId {
    /// Parse a fully qualified identifier.
    pub fn parse(value: &str) -> HydroResult<Self> {
        let unknown = || HydroError::UnknownVariable(value.to_string());
        let parts: Vec<&str> = value.split('.').collect();
        if parts.len() == 2 && parts[0] == CATCHMENT_PREFIX {
            return Ok(VariableId::Catchment {
                name: parts[1].to_string(),
            });
        }
        if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(unknown());
        }
        let kind = ElementKind::from_str(parts[0]).map_err(|_| unknown())?;
        let rest = &parts[2..];
        let (slot, name) = match ComponentKind::from_tag(rest[0]) {
            Some(slot) if rest.len() > 1 => (Some(slot), rest[1..].join(".")),
            _ => (None, rest.join(".")),
        };
        Ok(VariableId::Element {
            kind,
            id: parts[1].to_string(),
            slot,
            name,
        })
    }

    /// Whether a string looks like a fully qualified identifier rather than a generic name.
    pub fn is_qualified(value: &str) -> bool {
        VariableId::parse(value).is_ok()
    }

    /// Key of the element holding the variable.
    pub fn element_key(&self) -> Option<String> {
        match self {
            VariableId::Element { kind, id, .. } => Some(kind.key(id)),
            VariableId::Catchment { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VariableId::Element { name, .. } => name,
            VariableId::Catchment { name } => name,
        }
    }
}

impl Display for VariableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableId::Element {
                kind,
                id,
                slot: Some(slot),
                name,
            } => write!(f, "{}.{}.{}.{}", kind, id, slot.tag(), name),
            VariableId::Element {
                kind,
                id,
                slot: None,
                name,
            } => write!(f, "{}.{}.{}", kind, id, name),
            VariableId::Catchment { name } => write!(f, "{}.{}", CATCHMENT_PREFIX, name),
        }
    }
}
