//! State shared between the orchestrator and the worker threads.
//!
//! The `SharedState` struct owns the six stage queues plus the shutdown and
//! failure flags. Nothing else is shared: orchestrator-owned data (IMU
//! buffer, plane registry) only crosses threads as snapshots inside payloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use super::messages::{
    BackendInput, BackendOutput, MesherInput, MesherOutput, VisualizerInput, VisualizerOutput,
};
use super::queue::Queue;

/// The three worker threads of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Backend,
    Mesher,
    Visualizer,
}

impl WorkerKind {
    /// Fixed join order.
    pub const ALL: [WorkerKind; 3] = [WorkerKind::Backend, WorkerKind::Mesher, WorkerKind::Visualizer];

    pub fn thread_name(self) -> &'static str {
        match self {
            WorkerKind::Backend => "vio-backend",
            WorkerKind::Mesher => "vio-mesher",
            WorkerKind::Visualizer => "vio-visualizer",
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerKind::Backend => "Backend",
            WorkerKind::Mesher => "Mesher",
            WorkerKind::Visualizer => "Visualizer",
        };
        f.write_str(name)
    }
}

/// Abnormal termination of a worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: WorkerKind,
    pub reason: String,
}

/// Queue capacities for the stage queues.
#[derive(Debug, Clone, Copy)]
pub struct QueueCapacities {
    pub backend: usize,
    pub mesher: usize,
    /// The orchestrator never waits on the visualizer: a full input queue
    /// drops its oldest payload.
    pub visualizer: usize,
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            backend: 1,
            mesher: 1,
            visualizer: 1,
        }
    }
}

/// Input/output queues of every worker.
#[derive(Debug)]
pub struct PipelineQueues {
    pub backend_input: Queue<BackendInput>,
    pub backend_output: Queue<Arc<BackendOutput>>,
    pub mesher_input: Queue<MesherInput>,
    pub mesher_output: Queue<MesherOutput>,
    pub visualizer_input: Queue<VisualizerInput>,
    pub visualizer_output: Queue<VisualizerOutput>,
}

impl PipelineQueues {
    pub fn new(capacities: QueueCapacities) -> Self {
        Self {
            backend_input: Queue::bounded("backend_input", capacities.backend),
            backend_output: Queue::bounded("backend_output", capacities.backend),
            mesher_input: Queue::bounded("mesher_input", capacities.mesher),
            mesher_output: Queue::bounded("mesher_output", capacities.mesher),
            visualizer_input: Queue::bounded("visualizer_input", capacities.visualizer),
            visualizer_output: Queue::bounded("visualizer_output", capacities.visualizer),
        }
    }

    /// Shut down every queue, waking all blocked callers.
    pub fn shutdown_all(&self) {
        self.backend_input.shutdown();
        self.backend_output.shutdown();
        self.mesher_input.shutdown();
        self.mesher_output.shutdown();
        self.visualizer_input.shutdown();
        self.visualizer_output.shutdown();
    }

    /// True once every queue is closed.
    pub fn all_shutdown(&self) -> bool {
        self.backend_input.is_shutdown()
            && self.backend_output.is_shutdown()
            && self.mesher_input.is_shutdown()
            && self.mesher_output.is_shutdown()
            && self.visualizer_input.is_shutdown()
            && self.visualizer_output.is_shutdown()
    }
}

/// State shared by the orchestrator and the three worker threads.
pub struct SharedState {
    pub queues: PipelineQueues,

    /// Request workers to finish their current iteration and exit.
    shutdown_requested: AtomicBool,

    /// First abnormal worker termination, if any.
    failure: Mutex<Option<WorkerFailure>>,
}

impl SharedState {
    pub fn new(capacities: QueueCapacities) -> Arc<Self> {
        Arc::new(Self {
            queues: PipelineQueues::new(capacities),
            shutdown_requested: AtomicBool::new(false),
            failure: Mutex::new(None),
        })
    }

    /// Set the shutdown flag and close every queue.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.queues.shutdown_all();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Record a worker failure and escalate to a full pipeline shutdown.
    ///
    /// Only the first failure is kept.
    pub fn report_failure(&self, worker: WorkerKind, reason: String) {
        error!("{} worker terminated abnormally: {}", worker, reason);
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(WorkerFailure { worker, reason });
            }
        }
        self.request_shutdown();
    }

    pub fn failure(&self) -> Option<WorkerFailure> {
        self.failure.lock().clone()
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("shutdown_requested", &self.is_shutdown_requested())
            .field("failure", &self.failure())
            .finish()
    }
}
