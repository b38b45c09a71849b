//! Pipeline error types.

use thiserror::Error;

use crate::system::queue::QueueClosed;
use crate::system::shared_state::WorkerKind;

/// Result type alias for orchestrator operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by the pipeline orchestrator.
///
/// Every variant except `NotRunning` is fatal: `spin` shuts the pipeline
/// down before returning it.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An input invariant was violated (e.g. empty IMU interval).
    #[error("precheck failed: {0}")]
    Precheck(String),

    /// Invalid or unsupported configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A queue was shut down while the orchestrator was using it.
    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),

    /// A worker thread terminated abnormally.
    #[error("{worker} worker failed: {reason}")]
    WorkerFailed {
        /// The worker that failed.
        worker: WorkerKind,
        /// Error or panic message.
        reason: String,
    },

    /// `spin` was called after the pipeline shut down.
    #[error("pipeline is not running")]
    NotRunning,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config parse error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Error raised by a frontend/backend/mesher/visualizer collaborator.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether this error leaves the pipeline unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::NotRunning)
    }
}
