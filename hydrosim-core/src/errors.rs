use thiserror::Error;

/// Error type for invalid operations on networks, simulations and parameter spaces.
#[derive(Error, Debug)]
pub enum HydroError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Unknown model identifier '{0}'")]
    UnknownModel(String),
    #[error("Unknown element '{0}'")]
    UnknownElement(String),
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("Parameter '{0}' is already defined")]
    DuplicateParameter(String),
    #[error("The element graph contains a cycle involving '{0}'")]
    Cycle(String),
    #[error("Parameter '{0}' does not match any model variable")]
    Binding(String),
    #[error("Value {value} for '{name}' is outside of the bounds [{min}, {max}]")]
    BoundViolation {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Data not available: {0}")]
    DataAvailability(String),
    #[error("Simulation failed at '{element}': {message}")]
    Simulation { element: String, message: String },
    #[error("Invalid usage: {0}")]
    Usage(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HydroError {
    /// Numeric failures raised while stepping an element.
    pub fn simulation(element: impl Into<String>, message: impl Into<String>) -> Self {
        HydroError::Simulation {
            element: element.into(),
            message: message.into(),
        }
    }

    /// Whether the error is a numeric failure of the simulation itself,
    /// as opposed to a configuration or usage problem.
    pub fn is_numeric_failure(&self) -> bool {
        matches!(self, HydroError::Simulation { .. })
    }
}

/// Convenience type for `Result<T, HydroError>`.
pub type HydroResult<T> = Result<T, HydroError>;
