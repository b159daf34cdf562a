//! Reservoir models attached to nodes.
//!
//! Storages are volumes (m3) and flows rates (m3/s); the step length converts between the two.

mod controlled_release;
mod level_volume_area;

pub use controlled_release::ControlledReleaseReservoir;
pub use level_volume_area::LevelVolumeAreaReservoir;

/// Split a storage above `capacity` into the kept storage and a spill rate.
fn split_spill(storage: f64, capacity: f64, dt_seconds: f64) -> (f64, f64) {
    if storage > capacity {
        (capacity, (storage - capacity) / dt_seconds)
    } else {
        (storage, 0.0)
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use chrono::NaiveDate;
    use hydrosim_core::component::StepContext;

    pub fn daily() -> StepContext {
        StepContext {
            time_index: 0,
            time: NaiveDate::from_ymd_opt(2000, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            dt_seconds: 86_400.0,
            seed: 0,
        }
    }
}
