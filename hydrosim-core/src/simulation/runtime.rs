//! Simulation struct and time-stepped execution.

use crate::component::{ComponentKind, ReservoirCurve, StepContext};
use crate::errors::{HydroError, HydroResult};
use crate::interpolate::PiecewiseLinear;
use crate::network::{Network, OrderingMethod, SubsetOptions, STREAMFLOW_RATE};
use crate::parameters::ParameterSpace;
use crate::registry::ModelRegistry;
use crate::state::MemoryStates;
use crate::timeseries::{Instant, TimeSeries, TimeStep, TsGeometry};
use crate::variable::{ElementKind, VariableId, VariableType};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Key of the part of a split catchment below every split element.
pub const REMAINDER: &str = "remainder";

/// A catchment network solved over a time span.
///
/// Inputs are driven by "played" series and outputs are captured by recorders, both addressed
/// by variable identifier (`subarea.a.P`, `node.outlet.OutflowRate`, `Catchment.StreamflowRate`).
/// The simulation exclusively owns the state of its elements. Cloning a simulation deep-copies
/// the network together with its state, so clones can be run independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    network: Network,
    span: TsGeometry,
    played: IndexMap<String, TimeSeries>,
    recorders: IndexMap<String, Vec<f64>>,
    /// States applied when the simulation is reset.
    memory_states: Option<MemoryStates>,
    /// Parameter spaces applied, in insertion order, after every reset.
    state_initializers: IndexMap<String, Box<dyn ParameterSpace>>,
    seed: u64,
    #[serde(skip)]
    registry: Arc<ModelRegistry>,
}

impl Simulation {
    /// Create a simulation over the inclusive span `[start, end]`.
    pub fn new(
        network: Network,
        time_step: TimeStep,
        start: Instant,
        end: Instant,
        registry: Arc<ModelRegistry>,
    ) -> HydroResult<Self> {
        Ok(Self {
            network,
            span: TsGeometry::from_span(start, end, time_step)?,
            played: IndexMap::new(),
            recorders: IndexMap::new(),
            memory_states: None,
            state_initializers: IndexMap::new(),
            seed: 0,
            registry,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Attach a model catalog, e.g. after loading a simulation from JSON.
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    // ------------------------------------------------------------------------
    // Time span
    // ------------------------------------------------------------------------

    pub fn start(&self) -> Instant {
        self.span.start
    }

    pub fn end(&self) -> Instant {
        self.span.end().unwrap_or(self.span.start)
    }

    pub fn time_step(&self) -> TimeStep {
        self.span.time_step
    }

    /// Geometry of the simulation span, which is also the geometry of recorded series.
    pub fn span(&self) -> &TsGeometry {
        &self.span
    }

    pub fn num_steps(&self) -> usize {
        self.span.length
    }

    /// Redefine the simulation horizon. `end` must be aligned with `start`.
    pub fn set_span(&mut self, start: Instant, end: Instant) -> HydroResult<()> {
        self.span = TsGeometry::from_span(start, end, self.span.time_step)?;
        Ok(())
    }

    /// Change the time step, keeping the start and end of the span.
    pub fn set_time_step(&mut self, time_step: TimeStep) -> HydroResult<()> {
        self.span = TsGeometry::from_span(self.start(), self.end(), time_step)?;
        let mismatched: Vec<&String> = self
            .played
            .iter()
            .filter(|(_, ts)| ts.geometry().time_step != time_step)
            .map(|(k, _)| k)
            .collect();
        if !mismatched.is_empty() {
            warn!(
                "played series {:?} no longer match the {} time step",
                mismatched, time_step
            );
        }
        Ok(())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seed handed to stochastic components through the step context.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Run every time step of the span.
    ///
    /// With `reset_initial_states` the components are first returned to their initial state,
    /// the stored memory states applied and the state initialisers run. Otherwise execution
    /// continues from the current states.
    ///
    /// Played series are checked for coverage of the span before anything is modified.
    pub fn execute(&mut self, reset_initial_states: bool) -> HydroResult<()> {
        let played = self.played_bindings()?;
        let recorded = self
            .recorders
            .keys()
            .map(|k| VariableId::parse(k))
            .collect::<HydroResult<Vec<_>>>()?;

        if reset_initial_states {
            self.reset_states()?;
        }

        let n = self.num_steps();
        debug!(
            "executing {} steps of {} from {}",
            n,
            self.span.time_step,
            self.start()
        );
        for buffer in self.recorders.values_mut() {
            buffer.clear();
            buffer.reserve(n);
        }

        for i in 0..n {
            let time = self.span.time_at(i)?;
            for (id, key, offset) in &played {
                let value = self.played[key.as_str()].at(offset + i)?;
                self.network.set_variable(id, value)?;
            }
            let context = StepContext {
                time_index: i,
                time,
                dt_seconds: self.span.time_step.seconds_at(time),
                seed: self.seed,
            };
            self.network.step(&context)?;
            for (position, id) in recorded.iter().enumerate() {
                let value = self.network.get_variable(id)?;
                if let Some((_, buffer)) = self.recorders.get_index_mut(position) {
                    buffer.push(value);
                }
            }
        }
        Ok(())
    }

    /// Resolve played series to variables and offsets into the series for the current span.
    fn played_bindings(&self) -> HydroResult<Vec<(VariableId, String, usize)>> {
        let mut bindings = Vec::with_capacity(self.played.len());
        for (key, series) in &self.played {
            let geometry = series.geometry();
            if geometry.time_step != self.span.time_step {
                return Err(HydroError::DataAvailability(format!(
                    "series played into {} has a {} time step, the simulation is {}",
                    key, geometry.time_step, self.span.time_step
                )));
            }
            let offset = match geometry.index_of(self.start()) {
                Some(offset) if geometry.covers(self.start(), self.end()) => offset,
                _ => {
                    return Err(HydroError::DataAvailability(format!(
                        "series played into {} does not cover {} to {}",
                        key,
                        self.start(),
                        self.end()
                    )))
                }
            };
            bindings.push((VariableId::parse(key)?, key.clone(), offset));
        }
        Ok(bindings)
    }

    /// Return every component to its initial state, then apply memory states and initialisers.
    pub fn reset_states(&mut self) -> HydroResult<()> {
        self.network.reset();
        if let Some(states) = &self.memory_states {
            self.network.apply_states(states)?;
        }
        let initializers = std::mem::take(&mut self.state_initializers);
        let result = initializers.values().try_for_each(|p| p.apply(self));
        // Applying a state initialiser must not register further initialisers
        self.state_initializers = initializers;
        result
    }

    // ------------------------------------------------------------------------
    // Played and recorded series
    // ------------------------------------------------------------------------

    /// Drive a writable variable with a series.
    pub fn play(&mut self, variable_id: &str, series: TimeSeries) -> HydroResult<()> {
        let id = VariableId::parse(variable_id)?;
        self.network.check_variable(&id, true)?;
        if series.geometry().time_step != self.span.time_step {
            return Err(HydroError::Configuration(format!(
                "cannot play a {} series into a {} simulation",
                series.geometry().time_step,
                self.span.time_step
            )));
        }
        self.played.insert(id.to_string(), series);
        Ok(())
    }

    /// Play values starting at the start of the simulation.
    pub fn play_values(&mut self, variable_id: &str, values: &[f64]) -> HydroResult<()> {
        let series = TimeSeries::from_vec(self.start(), self.span.time_step, values.to_vec());
        self.play(variable_id, series)
    }

    pub fn get_played(&self, variable_id: &str) -> HydroResult<&TimeSeries> {
        let key = VariableId::parse(variable_id)?.to_string();
        self.played.get(&key).ok_or_else(|| {
            HydroError::DataAvailability(format!("no series is played into {}", variable_id))
        })
    }

    pub fn played_variables(&self) -> Vec<String> {
        self.played.keys().cloned().collect()
    }

    pub fn remove_played(&mut self, variable_id: &str) -> HydroResult<()> {
        let key = VariableId::parse(variable_id)?.to_string();
        self.played.shift_remove(&key).map(|_| ()).ok_or_else(|| {
            HydroError::DataAvailability(format!("no series is played into {}", variable_id))
        })
    }

    /// Attach a recorder to a variable.
    pub fn record(&mut self, variable_id: &str) -> HydroResult<()> {
        let id = VariableId::parse(variable_id)?;
        self.network.check_variable(&id, false)?;
        self.recorders.entry(id.to_string()).or_default();
        Ok(())
    }

    pub fn recorded_variables(&self) -> Vec<String> {
        self.recorders.keys().cloned().collect()
    }

    pub fn remove_recorder(&mut self, variable_id: &str) -> HydroResult<()> {
        let key = VariableId::parse(variable_id)?.to_string();
        self.recorders.shift_remove(&key).map(|_| ()).ok_or_else(|| {
            HydroError::DataAvailability(format!("no recorder is attached to {}", variable_id))
        })
    }

    pub fn clear_recorders(&mut self) {
        self.recorders.clear();
    }

    fn recorded_buffer(&self, variable_id: &str) -> HydroResult<&Vec<f64>> {
        let key = VariableId::parse(variable_id)?.to_string();
        self.recorders.get(&key).ok_or_else(|| {
            HydroError::DataAvailability(format!("no recorder is attached to {}", variable_id))
        })
    }

    /// Recorded output of the last execution.
    pub fn get_recorded(&self, variable_id: &str) -> HydroResult<TimeSeries> {
        let values = self.recorded_buffer(variable_id)?;
        Ok(TimeSeries::from_vec(
            self.start(),
            self.span.time_step,
            values.clone(),
        ))
    }

    /// Copy recorded output into a caller buffer of exactly the recorded length.
    pub fn get_recorded_into(&self, variable_id: &str, buffer: &mut [f64]) -> HydroResult<()> {
        let values = self.recorded_buffer(variable_id)?;
        if values.len() != buffer.len() {
            return Err(HydroError::Configuration(format!(
                "buffer of length {} given for {} recorded values of {}",
                buffer.len(),
                values.len(),
                variable_id
            )));
        }
        buffer.copy_from_slice(values);
        Ok(())
    }

    pub fn recorded_length(&self, variable_id: &str) -> HydroResult<usize> {
        Ok(self.recorded_buffer(variable_id)?.len())
    }

    // ------------------------------------------------------------------------
    // Variables and parameters
    // ------------------------------------------------------------------------

    pub fn get_variable(&self, variable_id: &str) -> HydroResult<f64> {
        self.network.get_variable(&VariableId::parse(variable_id)?)
    }

    pub fn set_variable(&mut self, variable_id: &str, value: f64) -> HydroResult<()> {
        self.network
            .set_variable(&VariableId::parse(variable_id)?, value)
    }

    /// Write a parameter value.
    ///
    /// A fully qualified identifier addresses a single variable. Any other name is generic and
    /// is written to every element exposing a writable variable of that name.
    /// Names that resolve to nothing fail with a binding error.
    pub fn set_parameter_value(&mut self, name: &str, value: f64) -> HydroResult<()> {
        self.check_parameter(name)?;
        if let Ok(id) = VariableId::parse(name) {
            return self.network.set_variable(&id, value);
        }
        for key in self.elements_with(name) {
            self.network
                .element_mut(&key)?
                .set_variable(name, None, value)?;
        }
        Ok(())
    }

    /// Check that a parameter name resolves to at least one writable variable.
    pub fn check_parameter(&self, name: &str) -> HydroResult<()> {
        match VariableId::parse(name) {
            Ok(id) => self
                .network
                .check_variable(&id, true)
                .map_err(|e| binding_error(name, e)),
            Err(_) if self.elements_with(name).is_empty() => {
                Err(HydroError::Binding(name.to_string()))
            }
            Err(_) => Ok(()),
        }
    }

    /// Read a parameter value. Generic names read the first element exposing the variable.
    pub fn get_parameter_value(&self, name: &str) -> HydroResult<f64> {
        if let Ok(id) = VariableId::parse(name) {
            return self
                .network
                .get_variable(&id)
                .map_err(|e| binding_error(name, e));
        }
        let key = self
            .elements_with(name)
            .into_iter()
            .next()
            .ok_or_else(|| HydroError::Binding(name.to_string()))?;
        self.network.element(&key)?.get_variable(name, None)
    }

    /// Keys of the elements with a writable variable called `name`.
    fn elements_with(&self, name: &str) -> Vec<String> {
        self.network
            .elements()
            .filter(|e| e.is_writable(name, None))
            .map(|e| e.key())
            .collect()
    }

    /// Fully qualified variable identifiers of an element.
    pub fn variable_ids(&self, element: &str) -> HydroResult<Vec<String>> {
        let key = self.network.resolve_key(element)?;
        let element = self.network.element(&key)?;
        Ok(element
            .variable_names()
            .into_iter()
            .map(|name| format!("{}.{}", key, name))
            .collect())
    }

    pub fn variable_type(&self, variable_id: &str) -> HydroResult<VariableType> {
        let id = VariableId::parse(variable_id)?;
        match &id {
            VariableId::Catchment { name } if name == STREAMFLOW_RATE => Ok(VariableType::Double),
            VariableId::Catchment { .. } => Err(HydroError::UnknownVariable(id.to_string())),
            VariableId::Element {
                kind,
                id: element_id,
                slot,
                name,
            } => self
                .network
                .element(&kind.key(element_id))?
                .variable_type(name, *slot)
                .ok_or_else(|| HydroError::UnknownVariable(variable_id.to_string())),
        }
    }

    pub fn is_valid_variable(&self, variable_id: &str) -> bool {
        VariableId::parse(variable_id)
            .and_then(|id| self.network.check_variable(&id, false))
            .is_ok()
    }

    // ------------------------------------------------------------------------
    // Element queries
    // ------------------------------------------------------------------------

    pub fn element_ids(&self, kind: ElementKind) -> Vec<String> {
        self.network.ids(kind)
    }

    pub fn element_names(&self, kind: ElementKind) -> Vec<String> {
        self.network.names(kind)
    }

    pub fn element_count(&self, kind: ElementKind) -> usize {
        self.network.count(kind)
    }

    /// Identifiers of the models bound to an element.
    pub fn model_ids(&self, element: &str) -> HydroResult<Vec<String>> {
        let key = self.network.resolve_key(element)?;
        Ok(self.network.element(&key)?.model_ids())
    }

    pub fn set_ordering_method(&mut self, method: OrderingMethod) -> HydroResult<()> {
        self.network.set_ordering(method)
    }

    pub fn sort_by_execution_order(
        &self,
        elements: &[String],
        method: OrderingMethod,
    ) -> HydroResult<Vec<String>> {
        let keys = elements
            .iter()
            .map(|e| self.network.resolve_key(e))
            .collect::<HydroResult<Vec<_>>>()?;
        self.network.sort_by_execution_order(&keys, method)
    }

    // ------------------------------------------------------------------------
    // Model swapping
    // ------------------------------------------------------------------------

    /// Bind a fresh instance of `model_id` to each element. Every element is checked
    /// before any is modified.
    fn set_models(
        &mut self,
        model_id: &str,
        kind: ComponentKind,
        keys: &[String],
    ) -> HydroResult<()> {
        let template = self.registry.create_of_kind(model_id, kind)?;
        for key in keys {
            let element = self.network.element(key)?;
            if !crate::network::Element::allowed_slots(element.kind()).contains(&kind) {
                return Err(HydroError::Configuration(format!(
                    "a {} model cannot be attached to {}",
                    kind, key
                )));
            }
        }
        for key in keys {
            if let Some(previous) = self.network.set_component(key, template.clone())? {
                warn!(
                    "{} model {} of {} replaced by {}, its state is discarded",
                    kind,
                    previous.model_id(),
                    key,
                    model_id
                );
            }
        }
        Ok(())
    }

    fn resolve_keys(&self, elements: &[String], kind: ElementKind) -> HydroResult<Vec<String>> {
        if elements.is_empty() {
            return Ok(self.network.keys(Some(kind)));
        }
        elements
            .iter()
            .map(|e| self.network.resolve_key(e))
            .collect()
    }

    /// Replace the runoff model of every subarea.
    pub fn set_runoff_model(&mut self, model_id: &str) -> HydroResult<()> {
        let keys = self.network.keys(Some(ElementKind::Subarea));
        self.set_models(model_id, ComponentKind::Runoff, &keys)
    }

    /// A copy of the simulation in which every subarea runs `model_id`.
    pub fn swap_runoff_model(&self, model_id: &str) -> HydroResult<Simulation> {
        let mut simulation = self.clone();
        simulation.set_runoff_model(model_id)?;
        Ok(simulation)
    }

    /// Set the channel routing model of links. An empty list selects every link.
    pub fn set_routing_model(&mut self, model_id: &str, links: &[String]) -> HydroResult<()> {
        let keys = self.resolve_keys(links, ElementKind::Link)?;
        self.set_models(model_id, ComponentKind::Routing, &keys)
    }

    pub fn set_reservoir_model(&mut self, model_id: &str, node: &str) -> HydroResult<()> {
        let key = self.network.resolve_key(node)?;
        self.set_models(model_id, ComponentKind::Reservoir, &[key])
    }

    /// Attach an error-correction model to the outflow of a node or link.
    pub fn set_error_correction_model(&mut self, model_id: &str, element: &str) -> HydroResult<()> {
        let key = self.network.resolve_key(element)?;
        self.set_models(model_id, ComponentKind::ErrorCorrection, &[key])
    }

    /// Set the input preprocessor of subareas. An empty list selects every subarea.
    pub fn set_preprocessing_model(
        &mut self,
        model_id: &str,
        subareas: &[String],
    ) -> HydroResult<()> {
        let keys = self.resolve_keys(subareas, ElementKind::Subarea)?;
        self.set_models(model_id, ComponentKind::Preprocessing, &keys)
    }

    /// Remove an optional model from an element.
    pub fn remove_model(&mut self, element: &str, slot: ComponentKind) -> HydroResult<()> {
        let key = self.network.resolve_key(element)?;
        self.network.remove_component(&key, slot)
    }

    // ------------------------------------------------------------------------
    // Reservoir curves
    // ------------------------------------------------------------------------

    fn set_reservoir_curves(
        &mut self,
        node: &str,
        curves: Vec<(ReservoirCurve, PiecewiseLinear)>,
    ) -> HydroResult<()> {
        let key = self.network.resolve_key(node)?;
        let reservoir = self
            .network
            .element_mut(&key)?
            .component_mut(ComponentKind::Reservoir)
            .ok_or_else(|| HydroError::Configuration(format!("{} has no reservoir model", key)))?;
        for (curve, values) in curves {
            reservoir.set_curve(curve, values)?;
        }
        Ok(())
    }

    /// Level to storage and level to surface area relationships.
    pub fn set_reservoir_geometry(
        &mut self,
        node: &str,
        levels: &[f64],
        storages: &[f64],
        areas: &[f64],
    ) -> HydroResult<()> {
        let storage = PiecewiseLinear::new(levels.to_vec(), storages.to_vec())?;
        let area = PiecewiseLinear::new(levels.to_vec(), areas.to_vec())?;
        self.set_reservoir_curves(
            node,
            vec![
                (ReservoirCurve::LevelStorage, storage),
                (ReservoirCurve::LevelArea, area),
            ],
        )
    }

    pub fn set_reservoir_min_discharge(
        &mut self,
        node: &str,
        levels: &[f64],
        discharges: &[f64],
    ) -> HydroResult<()> {
        let curve = PiecewiseLinear::new(levels.to_vec(), discharges.to_vec())?;
        self.set_reservoir_curves(node, vec![(ReservoirCurve::MinDischarge, curve)])
    }

    pub fn set_reservoir_max_discharge(
        &mut self,
        node: &str,
        levels: &[f64],
        discharges: &[f64],
    ) -> HydroResult<()> {
        let curve = PiecewiseLinear::new(levels.to_vec(), discharges.to_vec())?;
        self.set_reservoir_curves(node, vec![(ReservoirCurve::MaxDischarge, curve)])
    }

    pub fn set_reservoir_ops_release(
        &mut self,
        node: &str,
        levels: &[f64],
        releases: &[f64],
    ) -> HydroResult<()> {
        let curve = PiecewiseLinear::new(levels.to_vec(), releases.to_vec())?;
        self.set_reservoir_curves(node, vec![(ReservoirCurve::OpsRelease, curve)])
    }

    // ------------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------------

    /// Component states and element flows as they stand.
    pub fn snapshot_states(&self) -> MemoryStates {
        self.network.snapshot_states()
    }

    pub fn apply_states(&mut self, states: &MemoryStates) -> HydroResult<()> {
        self.network.apply_states(states)
    }

    /// Store states applied on every reset.
    pub fn set_memory_states(&mut self, states: MemoryStates) {
        self.memory_states = Some(states);
    }

    pub fn memory_states(&self) -> Option<&MemoryStates> {
        self.memory_states.as_ref()
    }

    pub fn clear_memory_states(&mut self) {
        self.memory_states = None;
    }

    /// Register a parameter space applied after every reset. An existing initialiser with
    /// the same identifier is replaced.
    pub fn add_state_initializer(&mut self, id: &str, parameters: Box<dyn ParameterSpace>) {
        self.state_initializers.insert(id.to_string(), parameters);
    }

    pub fn remove_state_initializer(&mut self, id: &str) -> HydroResult<()> {
        self.state_initializers
            .shift_remove(id)
            .map(|_| ())
            .ok_or_else(|| HydroError::Configuration(format!("no state initialiser '{}'", id)))
    }

    pub fn state_initializer_ids(&self) -> Vec<String> {
        self.state_initializers.keys().cloned().collect()
    }

    pub fn clear_state_initializers(&mut self) {
        self.state_initializers.clear();
    }

    // ------------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------------

    /// A simulation over part of the network.
    ///
    /// Models, parameters and states of the retained elements are kept, as are the played
    /// series and recorders that address them.
    pub fn subset(&self, element: &str, options: &SubsetOptions) -> HydroResult<Simulation> {
        let key = self.network.resolve_key(element)?;
        let network = self.network.subset(&key, options)?;
        let retained = |variable: &String| match VariableId::parse(variable) {
            Ok(id) => id.element_key().map_or(true, |k| network.contains(&k)),
            Err(_) => false,
        };
        let played = self
            .played
            .iter()
            .filter(|(k, _)| retained(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let recorders = self
            .recorders
            .keys()
            .filter(|k| retained(k))
            .map(|k| (k.clone(), Vec::new()))
            .collect();
        let memory_states = self
            .memory_states
            .as_ref()
            .map(|states| states.filtered(|k| network.contains(k)));
        Ok(Simulation {
            network,
            span: self.span.clone(),
            played,
            recorders,
            memory_states,
            state_initializers: self.state_initializers.clone(),
            seed: self.seed,
            registry: self.registry.clone(),
        })
    }

    /// Split the catchment at the given elements, from upstream to downstream.
    ///
    /// Each element yields the part of the remaining network above it, keyed by the element
    /// key. Where `include_upstream` is set for an element it belongs to the part above it,
    /// otherwise it stays in the remaining network. Elements left below the last split form a
    /// last part keyed `remainder`. Without `include_upstream` every element is included.
    pub fn split_to_subcatchments(
        &self,
        elements: &[String],
        include_upstream: Option<&[bool]>,
    ) -> HydroResult<IndexMap<String, Simulation>> {
        let include = match include_upstream {
            Some(flags) if flags.len() != elements.len() => {
                return Err(HydroError::Configuration(format!(
                    "{} inclusion flags given for {} split elements",
                    flags.len(),
                    elements.len()
                )))
            }
            Some(flags) => flags.to_vec(),
            None => vec![true; elements.len()],
        };
        let mut included: IndexMap<String, bool> = IndexMap::new();
        for (element, flag) in elements.iter().zip(include) {
            let key = self.network.resolve_key(element)?;
            if included.insert(key.clone(), flag).is_some() {
                return Err(HydroError::Configuration(format!(
                    "{} appears more than once in the split elements",
                    key
                )));
            }
        }
        let keys: Vec<String> = included.keys().cloned().collect();
        let sorted = self
            .network
            .sort_by_execution_order(&keys, self.network.ordering())?;

        let mut parts = IndexMap::new();
        let mut remaining = self.clone();
        for key in sorted {
            let mut options = SubsetOptions {
                select_network_above_element: true,
                include_element_in_selection: included[&key],
                ..Default::default()
            };
            let upstream = remaining.subset(&key, &options)?;
            options.invert_selection = true;
            remaining = remaining.subset(&key, &options)?;
            debug!(
                "split at {}: {} elements above, {} remaining",
                key,
                upstream.network.len(),
                remaining.network.len()
            );
            parts.insert(key, upstream);
        }
        if !remaining.network.is_empty() {
            parts.insert(REMAINDER.to_string(), remaining);
        }
        Ok(parts)
    }

    /// DOT description of the element graph.
    pub fn as_dot(&self) -> String {
        self.network.to_dot()
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    pub fn to_json_string(&self) -> HydroResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a simulation, attaching the model catalog used for later model swaps.
    pub fn from_json_str(content: &str, registry: Arc<ModelRegistry>) -> HydroResult<Self> {
        let simulation: Simulation = serde_json::from_str(content)?;
        Ok(simulation.with_registry(registry))
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> HydroResult<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>, registry: Arc<ModelRegistry>) -> HydroResult<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?, registry)
    }
}

fn binding_error(name: &str, error: HydroError) -> HydroError {
    match error {
        HydroError::UnknownVariable(_) | HydroError::UnknownElement(_) => {
            HydroError::Binding(name.to_string())
        }
        other => other,
    }
}
