//! Pipeline orchestration and thread management.
//!
//! This module contains the top-level [`Pipeline`] that drives the frontend
//! and coordinates the backend, mesher and visualizer threads, along with the
//! stage queues, shared state and inter-thread payload types.

pub mod messages;
pub mod pipeline;
pub mod queue;
pub mod shared_state;
pub mod workers;

pub use messages::{BackendInput, BackendOutput, MesherInput, MesherOutput, VisualizerInput, VisualizerOutput};
pub use pipeline::{Collaborators, Pipeline, PipelineState, SegmentationHook, SpinOutcome};
pub use queue::{Queue, QueueClosed};
pub use shared_state::{SharedState, WorkerFailure, WorkerKind};
pub use workers::WorkerThreads;
