//! A simulation solves a catchment network over a time span.
//!
//! At each time step the played inputs are written to their variables, every element is
//! solved once in execution order, and the recorded variables are read back. Element state
//! is carried from one step to the next and can be snapshotted, stored and reapplied.
//!
//! Simulations are built from a [`CatchmentStructure`] with a [`SimulationBuilder`], and
//! may be replicated into ensemble forecasts with [`EnsembleForecastSimulation`].

mod builder;
mod ensemble;
mod runtime;

#[cfg(test)]
mod tests;

pub use builder::{
    CatchmentStructure, LinkDescription, NodeDescription, SimulationBuilder, SubareaDescription,
};
pub use ensemble::EnsembleForecastSimulation;
pub use runtime::{Simulation, REMAINDER};
