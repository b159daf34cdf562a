use crate::{CalibrationError, CalibrationResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Granularity of the optimiser log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    /// One row per generation, holding the best point.
    #[default]
    Generation,
    /// Also one row per evaluated candidate.
    Detailed,
}

impl FromStr for LogLevel {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(LogLevel::None),
            "generation" => Ok(LogLevel::Generation),
            "detailed" => Ok(LogLevel::Detailed),
            other => Err(CalibrationError::Configuration(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

/// Tabular record of an optimisation: named numeric and string columns of equal length.
///
/// A column first seen in a later row is back-filled, with NaN for numeric columns and an
/// empty string for string columns. Rows that omit a column are filled the same way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerLog {
    numeric: IndexMap<String, Vec<f64>>,
    strings: IndexMap<String, Vec<String>>,
    rows: usize,
}

impl OptimizerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, numeric: &[(&str, f64)], strings: &[(&str, &str)]) {
        let rows = self.rows;
        for (name, value) in numeric {
            self.numeric
                .entry(name.to_string())
                .or_insert_with(|| vec![f64::NAN; rows])
                .push(*value);
        }
        for (name, value) in strings {
            self.strings
                .entry(name.to_string())
                .or_insert_with(|| vec![String::new(); rows])
                .push(value.to_string());
        }
        self.rows += 1;
        let rows = self.rows;
        self.numeric
            .values_mut()
            .for_each(|c| c.resize(rows, f64::NAN));
        self.strings
            .values_mut()
            .for_each(|c| c.resize(rows, String::new()));
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Rows, numeric columns and string columns.
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.rows, self.numeric.len(), self.strings.len())
    }

    pub fn numeric_column_names(&self) -> Vec<&str> {
        self.numeric.keys().map(String::as_str).collect()
    }

    pub fn string_column_names(&self) -> Vec<&str> {
        self.strings.keys().map(String::as_str).collect()
    }

    pub fn numeric_column(&self, name: &str) -> CalibrationResult<&[f64]> {
        self.numeric
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| unknown_column(name))
    }

    pub fn string_column(&self, name: &str) -> CalibrationResult<&[String]> {
        self.strings
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| unknown_column(name))
    }

    /// Append the rows of `other`, tagging every appended row with `label` in the string
    /// column `tag_column`.
    pub fn append(&mut self, other: &OptimizerLog, tag_column: &str, label: &str) {
        for row in 0..other.rows {
            let numeric: Vec<(&str, f64)> = other
                .numeric
                .iter()
                .map(|(name, values)| (name.as_str(), values[row]))
                .collect();
            let mut strings: Vec<(&str, &str)> = vec![(tag_column, label)];
            strings.extend(
                other
                    .strings
                    .iter()
                    .map(|(name, values)| (name.as_str(), values[row].as_str())),
            );
            self.push_row(&numeric, &strings);
        }
    }

    /// Stack several logs, with the label of each in the string column `tag_column`.
    pub fn concat<'a>(
        logs: impl IntoIterator<Item = (&'a str, &'a OptimizerLog)>,
        tag_column: &str,
    ) -> Self {
        let mut result = Self::new();
        for (label, log) in logs {
            result.append(log, tag_column, label);
        }
        result
    }
}

fn unknown_column(name: &str) -> CalibrationError {
    CalibrationError::Configuration(format!("the optimiser log has no column '{}'", name))
}
