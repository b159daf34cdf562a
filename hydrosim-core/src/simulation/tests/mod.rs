//! Integration tests for the simulation module.
//!
//! Most tests use a linear catchment `n1 -> l1 -> n2 -> l2 -> n3` with a subarea draining
//! into `l1`. The subarea covers 86.4 km2, so on a daily step a runoff depth of 1 mm is a
//! flow of 1 m3/s.

use crate::example_components::example_registry;
use crate::simulation::{Simulation, SimulationBuilder};
use crate::timeseries::Instant;
use chrono::NaiveDate;
use std::sync::Arc;

#[cfg(test)]
mod ensemble;
#[cfg(test)]
mod parameters;
#[cfg(test)]
mod states;

pub(super) fn date(year: i32, month: u32, day: u32) -> Instant {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub(super) fn builder() -> SimulationBuilder {
    let mut builder = SimulationBuilder::new(Arc::new(example_registry()));
    builder
        .with_node("n1", "Headwater")
        .with_node("n2", "Junction")
        .with_node("n3", "Outlet")
        .with_link("l1", "Upper reach", Some("n1"), Some("n2"))
        .with_link("l2", "Lower reach", Some("n2"), Some("n3"))
        .with_subarea("l1", "Upper subarea", "l1", 86.4)
        .with_runoff_model("ScaledRunoff")
        .with_span(date(2020, 1, 1), date(2020, 1, 5));
    builder
}

/// The linear catchment over 5 daily steps, without routing.
pub(super) fn linear_catchment() -> Simulation {
    builder().build().unwrap()
}
