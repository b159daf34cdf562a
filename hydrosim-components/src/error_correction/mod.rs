//! Error-correction models, updating simulated flows with observations.

mod erris;
mod log_sinh;

pub use erris::{Erris, ErrisParameters, Maerris};
pub use log_sinh::LogSinh;
