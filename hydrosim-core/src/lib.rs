pub mod component;
pub mod config;
pub mod example_components;
pub mod interpolate;
pub mod network;
pub mod parameters;
pub mod registry;
pub mod simulation;
pub mod state;
pub mod timeseries;
pub mod variable;

pub mod errors;
