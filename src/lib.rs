//! Catchment simulation and model calibration.
//!
//! This crate gathers the member crates of the workspace:
//!
//! - [`engine`]: the element network, the simulation engine and parameter spaces.
//! - [`components`]: the standard runoff, routing, reservoir and error-correction models.
//! - [`calibrate`]: statistics, objective evaluators, the SCE optimiser and the staged
//!   ERRIS/MAERRIS calibration.

pub use hydrosim_calibrate as calibrate;
pub use hydrosim_components as components;
pub use hydrosim_core as engine;

use hydrosim_components::standard_registry;
use hydrosim_core::simulation::SimulationBuilder;
use std::sync::Arc;

/// A simulation builder resolving model identifiers against the standard models.
pub fn standard_simulation_builder() -> SimulationBuilder {
    SimulationBuilder::new(Arc::new(standard_registry()))
}
