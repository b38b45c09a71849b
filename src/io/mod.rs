//! Input sequences and result output.

pub mod results_logger;
pub mod synthetic;

pub use results_logger::ResultsLogger;
pub use synthetic::{SyntheticConfig, SyntheticSequence};
