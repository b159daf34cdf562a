//! Elements of the catchment graph.

use crate::component::{names, Component, ComponentKind, StepContext};
use crate::errors::{HydroError, HydroResult};
use crate::state::{ElementFlows, ModelState};
use crate::variable::{ElementKind, VariableDefinition, VariableRole, VariableType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Element-level variable names.
pub mod element_variables {
    pub const INFLOW_RATE: &str = "InflowRate";
    pub const OUTFLOW_RATE: &str = "OutflowRate";
    pub const LATERAL_INFLOW_RATE: &str = "LateralInflowRate";
    pub const ADDITIONAL_INFLOW: &str = "AdditionalInflow";
    pub const AREA: &str = "areaKm2";
}

use element_variables::*;

/// mm over km2 to m3.
const MM_KM2_TO_M3: f64 = 1000.0;

/// A node, link or subarea with the components bound to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    id: String,
    name: String,
    kind: ElementKind,
    area_km2: f64,
    components: BTreeMap<ComponentKind, Box<dyn Component>>,
    inflow: f64,
    lateral_inflow: f64,
    additional_inflow: f64,
    outflow: f64,
}

impl Element {
    pub fn new(kind: ElementKind, id: &str, name: &str) -> HydroResult<Self> {
        if id.is_empty() || id.contains('.') {
            return Err(HydroError::Configuration(format!(
                "invalid element identifier '{}': it must be non-empty and contain no '.'",
                id
            )));
        }
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            area_km2: 0.0,
            components: BTreeMap::new(),
            inflow: 0.0,
            lateral_inflow: 0.0,
            additional_inflow: 0.0,
            outflow: 0.0,
        })
    }

    pub fn node(id: &str, name: &str) -> HydroResult<Self> {
        Self::new(ElementKind::Node, id, name)
    }

    pub fn link(id: &str, name: &str) -> HydroResult<Self> {
        Self::new(ElementKind::Link, id, name)
    }

    pub fn subarea(id: &str, name: &str, area_km2: f64) -> HydroResult<Self> {
        let mut element = Self::new(ElementKind::Subarea, id, name)?;
        element.set_area(area_km2)?;
        Ok(element)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Key unique across kinds, e.g. `subarea.a`.
    pub fn key(&self) -> String {
        self.kind.key(&self.id)
    }

    pub fn area_km2(&self) -> f64 {
        self.area_km2
    }

    pub fn outflow(&self) -> f64 {
        self.outflow
    }

    fn set_area(&mut self, area_km2: f64) -> HydroResult<()> {
        if !(area_km2.is_finite() && area_km2 >= 0.0) {
            return Err(HydroError::BoundViolation {
                name: format!("{}.{}", self.key(), AREA),
                value: area_km2,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        self.area_km2 = area_km2;
        Ok(())
    }

    /// Component slots an element of this kind may hold.
    pub fn allowed_slots(kind: ElementKind) -> &'static [ComponentKind] {
        match kind {
            ElementKind::Subarea => &[ComponentKind::Preprocessing, ComponentKind::Runoff],
            ElementKind::Link => &[ComponentKind::Routing, ComponentKind::ErrorCorrection],
            ElementKind::Node => &[ComponentKind::Reservoir, ComponentKind::ErrorCorrection],
        }
    }

    pub fn component(&self, slot: ComponentKind) -> Option<&dyn Component> {
        self.components.get(&slot).map(|c| c.as_ref())
    }

    pub fn component_mut(&mut self, slot: ComponentKind) -> Option<&mut Box<dyn Component>> {
        self.components.get_mut(&slot)
    }

    pub fn components(&self) -> impl Iterator<Item = (&ComponentKind, &Box<dyn Component>)> {
        self.components.iter()
    }

    /// Bind a component to the slot matching its kind, returning the component it replaces.
    pub fn set_component(
        &mut self,
        component: Box<dyn Component>,
    ) -> HydroResult<Option<Box<dyn Component>>> {
        let slot = component.kind();
        if !Self::allowed_slots(self.kind).contains(&slot) {
            return Err(HydroError::Configuration(format!(
                "a {} model cannot be attached to {}",
                slot,
                self.key()
            )));
        }
        Ok(self.components.insert(slot, component))
    }

    pub fn remove_component(&mut self, slot: ComponentKind) -> Option<Box<dyn Component>> {
        self.components.remove(&slot)
    }

    /// Identifiers of the models bound to the element.
    pub fn model_ids(&self) -> Vec<String> {
        self.components
            .values()
            .map(|c| c.model_id().to_string())
            .collect()
    }

    fn element_definitions(&self) -> Vec<VariableDefinition> {
        let mut definitions = vec![VariableDefinition::output(OUTFLOW_RATE, "m3/s")];
        match self.kind {
            ElementKind::Subarea => {
                definitions.push(VariableDefinition::parameter(AREA, "km2"));
            }
            ElementKind::Link => {
                definitions.push(VariableDefinition::output(INFLOW_RATE, "m3/s"));
                definitions.push(VariableDefinition::output(LATERAL_INFLOW_RATE, "m3/s"));
            }
            ElementKind::Node => {
                definitions.push(VariableDefinition::output(INFLOW_RATE, "m3/s"));
                definitions.push(VariableDefinition::input(ADDITIONAL_INFLOW, "m3/s"));
            }
        }
        definitions
    }

    /// Find the definition of a variable, and the slot holding it when it belongs to a component.
    pub fn definition(
        &self,
        name: &str,
        slot: Option<ComponentKind>,
    ) -> Option<(Option<ComponentKind>, VariableDefinition)> {
        if let Some(slot) = slot {
            return self
                .component(slot)
                .and_then(|c| c.definition(name))
                .map(|d| (Some(slot), d));
        }
        if let Some(d) = self.element_definitions().into_iter().find(|d| d.name == name) {
            return Some((None, d));
        }
        self.components
            .iter()
            .find_map(|(slot, c)| c.definition(name).map(|d| (Some(*slot), d)))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.definition(name, None).is_some()
    }

    pub fn variable_type(&self, name: &str, slot: Option<ComponentKind>) -> Option<VariableType> {
        self.definition(name, slot).map(|(_, d)| d.variable_type)
    }

    /// Every variable name of the element, component variables qualified by their slot
    /// when the same name is exposed more than once.
    pub fn variable_names(&self) -> Vec<String> {
        let mut result: Vec<String> = self
            .element_definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        for (slot, component) in &self.components {
            for name in component.variable_ids() {
                if result.contains(&name) {
                    result.push(format!("{}.{}", slot.tag(), name));
                } else {
                    result.push(name);
                }
            }
        }
        result
    }

    pub fn get_variable(&self, name: &str, slot: Option<ComponentKind>) -> HydroResult<f64> {
        let unknown = || HydroError::UnknownVariable(format!("{}.{}", self.key(), name));
        match self.definition(name, slot).ok_or_else(unknown)? {
            (None, _) => Ok(match name {
                OUTFLOW_RATE => self.outflow,
                INFLOW_RATE => self.inflow,
                LATERAL_INFLOW_RATE => self.lateral_inflow,
                ADDITIONAL_INFLOW => self.additional_inflow,
                AREA => self.area_km2,
                _ => return Err(unknown()),
            }),
            (Some(slot), _) => self
                .components
                .get(&slot)
                .and_then(|c| c.get_variable(name))
                .ok_or_else(unknown),
        }
    }

    pub fn set_variable(
        &mut self,
        name: &str,
        slot: Option<ComponentKind>,
        value: f64,
    ) -> HydroResult<()> {
        let key = self.key();
        let (slot, definition) = self
            .definition(name, slot)
            .ok_or_else(|| HydroError::UnknownVariable(format!("{}.{}", key, name)))?;
        if !definition.role.is_writable() {
            return Err(HydroError::Configuration(format!(
                "variable '{}.{}' is read only",
                key, name
            )));
        }
        match slot {
            None => match name {
                AREA => self.set_area(value),
                ADDITIONAL_INFLOW => {
                    self.additional_inflow = value;
                    Ok(())
                }
                _ => Err(HydroError::UnknownVariable(format!("{}.{}", key, name))),
            },
            Some(slot) => match self.components.get_mut(&slot) {
                Some(component) => component.set_variable(name, value),
                None => Err(HydroError::UnknownVariable(format!("{}.{}", key, name))),
            },
        }
    }

    pub fn is_writable(&self, name: &str, slot: Option<ComponentKind>) -> bool {
        self.definition(name, slot)
            .map_or(false, |(_, d)| d.role.is_writable())
    }

    pub fn role(&self, name: &str, slot: Option<ComponentKind>) -> Option<VariableRole> {
        self.definition(name, slot).map(|(_, d)| d.role)
    }

    /// Reset every component to its initial state and clear the flows.
    pub fn reset(&mut self) {
        for component in self.components.values_mut() {
            component.reset();
        }
        self.inflow = 0.0;
        self.lateral_inflow = 0.0;
        self.outflow = 0.0;
    }

    pub fn get_states(&self) -> BTreeMap<ComponentKind, ModelState> {
        self.components
            .iter()
            .map(|(slot, c)| (*slot, c.get_state()))
            .collect()
    }

    pub fn flows(&self) -> ElementFlows {
        ElementFlows {
            inflow: self.inflow,
            lateral_inflow: self.lateral_inflow,
            outflow: self.outflow,
        }
    }

    pub fn set_flows(&mut self, flows: &ElementFlows) {
        self.inflow = flows.inflow;
        self.lateral_inflow = flows.lateral_inflow;
        self.outflow = flows.outflow;
    }

    pub fn set_states(&mut self, states: &BTreeMap<ComponentKind, ModelState>) -> HydroResult<()> {
        for (slot, state) in states {
            match self.components.get_mut(slot) {
                Some(component) => component.set_state(state)?,
                None => {
                    return Err(HydroError::Configuration(format!(
                        "{} has no {} model to receive a state",
                        self.key(),
                        slot
                    )))
                }
            }
        }
        Ok(())
    }

    /// Solve the element for one step.
    ///
    /// `upstream` is the flow arriving from upstream links or nodes and `lateral` the
    /// flow from subareas draining into a link.
    pub(crate) fn step(
        &mut self,
        context: &StepContext,
        upstream: f64,
        lateral: f64,
    ) -> HydroResult<()> {
        let outflow = match self.kind {
            ElementKind::Subarea => self.step_subarea(context)?,
            ElementKind::Link => {
                self.inflow = upstream;
                self.lateral_inflow = lateral;
                let routed = self.pass_through(ComponentKind::Routing, context, upstream + lateral)?;
                self.pass_through(ComponentKind::ErrorCorrection, context, routed)?
            }
            ElementKind::Node => {
                self.inflow = upstream + self.additional_inflow;
                let released = self.pass_through(ComponentKind::Reservoir, context, self.inflow)?;
                self.pass_through(ComponentKind::ErrorCorrection, context, released)?
            }
        };
        if !outflow.is_finite() {
            return Err(HydroError::simulation(
                self.key(),
                format!("non-finite outflow at step {}", context.time_index),
            ));
        }
        self.outflow = outflow;
        Ok(())
    }

    fn step_subarea(&mut self, context: &StepContext) -> HydroResult<f64> {
        let key = self.key();
        let forwarded = match self.components.get_mut(&ComponentKind::Preprocessing) {
            Some(preprocessor) => {
                preprocessor.step(context)?;
                preprocessor.forwarded_inputs()
            }
            None => Vec::new(),
        };
        let runoff_model = self
            .components
            .get_mut(&ComponentKind::Runoff)
            .ok_or_else(|| HydroError::simulation(&key, "no runoff model"))?;
        for (name, value) in forwarded {
            runoff_model.set_variable(&name, value)?;
        }
        runoff_model.step(context)?;
        let runoff = runoff_model
            .get_variable(names::RUNOFF)
            .ok_or_else(|| HydroError::simulation(&key, "runoff model has no runoff output"))?;
        Ok(runoff * self.area_km2 * MM_KM2_TO_M3 / context.dt_seconds)
    }

    /// Feed a flow through the component in `slot`, or return it unchanged if the slot is empty.
    fn pass_through(
        &mut self,
        slot: ComponentKind,
        context: &StepContext,
        flow: f64,
    ) -> HydroResult<f64> {
        let key = self.key();
        match self.components.get_mut(&slot) {
            None => Ok(flow),
            Some(component) => {
                component.set_variable(names::INFLOW, flow)?;
                component.step(context)?;
                component.get_variable(names::OUTFLOW).ok_or_else(|| {
                    HydroError::simulation(key, format!("{} model has no outflow", slot))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example_components::{LinearStore, ScaledRunoff};
    use chrono::NaiveDate;

    fn context() -> StepContext {
        StepContext {
            time_index: 0,
            time: NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            dt_seconds: 86_400.0,
            seed: 0,
        }
    }

    #[test]
    fn identifiers_cannot_contain_dots() {
        assert!(Element::node("a.b", "bad").is_err());
        assert!(Element::node("", "bad").is_err());
    }

    #[test]
    fn subarea_converts_depth_to_rate() {
        let mut subarea = Element::subarea("a", "A", 86.4).unwrap();
        subarea.set_component(ScaledRunoff::create()).unwrap();
        subarea.set_variable("P", None, 10.0).unwrap();
        subarea.step(&context(), 0.0, 0.0).unwrap();
        // 10 mm over 86.4 km2 in a day is 10 m3/s
        assert!((subarea.outflow() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn slots_are_restricted_by_kind() {
        let mut node = Element::node("n", "N").unwrap();
        assert!(node.set_component(ScaledRunoff::create()).is_err());
        let mut link = Element::link("l", "L").unwrap();
        assert!(link.set_component(LinearStore::create()).unwrap().is_none());
        assert_eq!(link.model_ids(), vec![LinearStore::ID.to_string()]);
    }

    #[test]
    fn outputs_are_read_only() {
        let mut link = Element::link("l", "L").unwrap();
        assert!(link.set_variable(OUTFLOW_RATE, None, 1.0).is_err());
        assert!(link.set_variable("missing", None, 1.0).is_err());
    }

    #[test]
    fn link_routes_upstream_and_lateral_flow() {
        let mut link = Element::link("l", "L").unwrap();
        link.step(&context(), 2.0, 3.0).unwrap();
        assert_eq!(link.outflow(), 5.0);
        assert_eq!(link.get_variable(LATERAL_INFLOW_RATE, None).unwrap(), 3.0);

        link.set_component(LinearStore::create()).unwrap();
        link.step(&context(), 2.0, 2.0).unwrap();
        assert_eq!(link.outflow(), 2.0);
        assert_eq!(link.get_variable("Storage", None).unwrap(), 2.0);
    }

    #[test]
    fn variable_names_include_components() {
        let mut subarea = Element::subarea("a", "A", 1.0).unwrap();
        subarea.set_component(ScaledRunoff::create()).unwrap();
        let names = subarea.variable_names();
        assert!(names.contains(&"areaKm2".to_string()));
        assert!(names.contains(&"scale".to_string()));
        assert!(names.contains(&"runoff".to_string()));
    }
}
