//! Time series and their geometry.
//!
//! A [`TsGeometry`] describes where a series lives in time: a start instant, a [`TimeStep`]
//! and a number of steps. Regular steps have a fixed length in seconds while monthly steps
//! follow the calendar, so a monthly step has no fixed second count.

use crate::errors::{HydroError, HydroResult};
use chrono::{Datelike, Months, NaiveDateTime, TimeDelta};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Instants are naive calendar date-times, interpreted in the time zone of the data.
pub type Instant = NaiveDateTime;

/// Length of a time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeStep {
    /// A strictly regular step of a fixed number of seconds.
    Regular { seconds: i64 },
    /// A calendar month.
    Monthly,
}

impl TimeStep {
    pub const DAILY: TimeStep = TimeStep::Regular { seconds: 86_400 };
    pub const HOURLY: TimeStep = TimeStep::Regular { seconds: 3_600 };

    /// Look up a time step by name: `daily`, `hourly` or `monthly`.
    pub fn from_name(name: &str) -> HydroResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(Self::DAILY),
            "hourly" | "hour" => Ok(Self::HOURLY),
            "monthly" | "month" => Ok(Self::Monthly),
            other => Err(HydroError::Configuration(format!(
                "unknown time step name '{}'",
                other
            ))),
        }
    }

    /// Create a regular time step.
    pub fn regular(seconds: i64) -> HydroResult<Self> {
        if seconds <= 0 {
            return Err(HydroError::Configuration(format!(
                "a regular time step must be positive, got {} seconds",
                seconds
            )));
        }
        Ok(TimeStep::Regular { seconds })
    }

    /// Fixed length in seconds, if any.
    pub fn seconds(&self) -> Option<i64> {
        match self {
            TimeStep::Regular { seconds } => Some(*seconds),
            TimeStep::Monthly => None,
        }
    }

    /// Length in seconds of the step starting at `t`.
    pub fn seconds_at(&self, t: Instant) -> f64 {
        match self {
            TimeStep::Regular { seconds } => *seconds as f64,
            TimeStep::Monthly => match t.checked_add_months(Months::new(1)) {
                Some(next) => (next - t).num_seconds() as f64,
                None => 31.0 * 86_400.0,
            },
        }
    }

    /// The instant `n` steps away from `t`. `n` may be negative.
    pub fn add_steps(&self, t: Instant, n: i64) -> HydroResult<Instant> {
        let result = match self {
            TimeStep::Regular { seconds } => seconds
                .checked_mul(n)
                .and_then(TimeDelta::try_seconds)
                .and_then(|delta| t.checked_add_signed(delta)),
            TimeStep::Monthly => {
                let months = Months::new(n.unsigned_abs() as u32);
                if n >= 0 {
                    t.checked_add_months(months)
                } else {
                    t.checked_sub_months(months)
                }
            }
        };
        result.ok_or_else(|| {
            HydroError::Configuration(format!("time {} plus {} steps is out of range", t, n))
        })
    }

    /// Signed number of steps from `start` to `end`.
    ///
    /// Fails if `end` is not reachable from `start` by a whole number of steps.
    pub fn steps_between(&self, start: Instant, end: Instant) -> HydroResult<i64> {
        let steps = match self {
            TimeStep::Regular { seconds } => {
                let elapsed = (end - start).num_seconds();
                if elapsed % seconds != 0 {
                    return Err(misaligned(start, end, self));
                }
                elapsed / seconds
            }
            TimeStep::Monthly => {
                let months = |t: Instant| t.year() as i64 * 12 + t.month0() as i64;
                let steps = months(end) - months(start);
                if self.add_steps(start, steps)? != end {
                    return Err(misaligned(start, end, self));
                }
                steps
            }
        };
        Ok(steps)
    }

    /// Number of steps in the inclusive span `[start, end]`.
    pub fn num_steps(&self, start: Instant, end: Instant) -> HydroResult<usize> {
        let steps = self.steps_between(start, end)?;
        if steps < 0 {
            return Err(HydroError::Configuration(format!(
                "end {} is before start {}",
                end, start
            )));
        }
        Ok(steps as usize + 1)
    }
}

fn misaligned(start: Instant, end: Instant, time_step: &TimeStep) -> HydroError {
    HydroError::Configuration(format!(
        "{} is not aligned with {} for a {} time step",
        end, start, time_step
    ))
}

impl Display for TimeStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeStep::Regular { seconds: 86_400 } => write!(f, "daily"),
            TimeStep::Regular { seconds: 3_600 } => write!(f, "hourly"),
            TimeStep::Regular { seconds } => write!(f, "{}s", seconds),
            TimeStep::Monthly => write!(f, "monthly"),
        }
    }
}

/// Position of a series in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsGeometry {
    pub start: Instant,
    pub time_step: TimeStep,
    pub length: usize,
}

impl TsGeometry {
    pub fn new(start: Instant, time_step: TimeStep, length: usize) -> Self {
        Self {
            start,
            time_step,
            length,
        }
    }

    /// Geometry covering the inclusive span `[start, end]`.
    pub fn from_span(start: Instant, end: Instant, time_step: TimeStep) -> HydroResult<Self> {
        let length = time_step.num_steps(start, end)?;
        Ok(Self::new(start, time_step, length))
    }

    /// Instant of the `index`-th step.
    pub fn time_at(&self, index: usize) -> HydroResult<Instant> {
        if index >= self.length {
            return Err(HydroError::DataAvailability(format!(
                "index {} is past the length {} of the series",
                index, self.length
            )));
        }
        self.time_step.add_steps(self.start, index as i64)
    }

    /// Instant of the last step, `None` for an empty geometry.
    pub fn end(&self) -> Option<Instant> {
        if self.length == 0 {
            return None;
        }
        self.time_step
            .add_steps(self.start, self.length as i64 - 1)
            .ok()
    }

    /// Index of the step starting exactly at `t`.
    pub fn index_of(&self, t: Instant) -> Option<usize> {
        let steps = self.time_step.steps_between(self.start, t).ok()?;
        if steps < 0 || steps as usize >= self.length {
            return None;
        }
        Some(steps as usize)
    }

    /// Whether the inclusive span `[start, end]` is covered by this geometry.
    pub fn covers(&self, start: Instant, end: Instant) -> bool {
        self.index_of(start).is_some() && self.index_of(end).is_some()
    }
}

/// A regular time series of `f64` values. Missing values are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    geometry: TsGeometry,
    values: Array1<f64>,
}

impl TimeSeries {
    /// Create a series, checking that the number of values matches the geometry.
    pub fn new(geometry: TsGeometry, values: Array1<f64>) -> HydroResult<Self> {
        if geometry.length != values.len() {
            return Err(HydroError::Configuration(format!(
                "geometry declares {} steps but {} values were given",
                geometry.length,
                values.len()
            )));
        }
        Ok(Self { geometry, values })
    }

    pub fn from_vec(start: Instant, time_step: TimeStep, values: Vec<f64>) -> Self {
        let geometry = TsGeometry::new(start, time_step, values.len());
        Self {
            geometry,
            values: Array1::from_vec(values),
        }
    }

    /// A series filled with a single value.
    pub fn constant(geometry: TsGeometry, value: f64) -> Self {
        let values = Array1::from_elem(geometry.length, value);
        Self { geometry, values }
    }

    /// A series of missing values.
    pub fn missing(geometry: TsGeometry) -> Self {
        Self::constant(geometry, f64::NAN)
    }

    pub fn geometry(&self) -> &TsGeometry {
        &self.geometry
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.to_vec()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn start(&self) -> Instant {
        self.geometry.start
    }

    pub fn end(&self) -> Option<Instant> {
        self.geometry.end()
    }

    /// Value at index `index`.
    pub fn at(&self, index: usize) -> HydroResult<f64> {
        self.values.get(index).copied().ok_or_else(|| {
            HydroError::DataAvailability(format!(
                "index {} is past the length {} of the series",
                index,
                self.len()
            ))
        })
    }

    /// Value of the step starting at `t`.
    pub fn value_at(&self, t: Instant) -> HydroResult<f64> {
        let index = self.geometry.index_of(t).ok_or_else(|| {
            HydroError::DataAvailability(format!("no value at {} in the series", t))
        })?;
        Ok(self.values[index])
    }

    /// Overwrite the value at `index`. Writing past the declared length fails.
    pub fn set(&mut self, index: usize, value: f64) -> HydroResult<()> {
        let length = self.len();
        let slot = self.values.get_mut(index).ok_or_else(|| {
            HydroError::DataAvailability(format!(
                "cannot write index {} past the declared length {}",
                index, length
            ))
        })?;
        *slot = value;
        Ok(())
    }

    /// Sub-series for the inclusive span `[start, end]`.
    pub fn window(&self, start: Instant, end: Instant) -> HydroResult<TimeSeries> {
        let (first, last) = match (self.geometry.index_of(start), self.geometry.index_of(end)) {
            (Some(first), Some(last)) if first <= last => (first, last),
            _ => {
                return Err(HydroError::DataAvailability(format!(
                    "the series does not cover the window {} to {}",
                    start, end
                )))
            }
        };
        let values = self.values.slice(ndarray::s![first..=last]).to_owned();
        TimeSeries::new(
            TsGeometry::new(start, self.geometry.time_step, last - first + 1),
            values,
        )
    }
}
