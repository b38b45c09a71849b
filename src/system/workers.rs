//! Worker thread lifecycle: launch, service loops and ordered shutdown.
//!
//! Every worker runs the same loop: block on its input queue, process one
//! item, push the result to its output queue. The visualizer never waits on
//! a full output queue and replaces the stale output instead. A closed queue
//! ends the loop normally. An error or a panic inside the loop is reported through
//! [`SharedState::report_failure`], which shuts the whole pipeline down.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use tracing::{debug, error, info};

use super::queue::Queue;
use super::shared_state::{SharedState, WorkerKind};
use crate::backend::Backend;
use crate::error::PipelineResult;
use crate::mesher::Mesher;
use crate::visualizer::Visualizer;

/// Handles of the running worker threads.
pub struct WorkerThreads {
    shared: Arc<SharedState>,
    /// Kept in join order.
    handles: Vec<(WorkerKind, JoinHandle<()>)>,
}

impl WorkerThreads {
    /// Spawn the backend, mesher and visualizer threads.
    ///
    /// If a spawn fails the threads already started are shut down again.
    pub fn launch(
        shared: Arc<SharedState>,
        mut backend: Box<dyn Backend>,
        mut mesher: Box<dyn Mesher>,
        mut visualizer: Box<dyn Visualizer>,
    ) -> PipelineResult<Self> {
        let mut workers = Self {
            shared: Arc::clone(&shared),
            handles: Vec::with_capacity(WorkerKind::ALL.len()),
        };

        workers.spawn(WorkerKind::Backend, move |shared| {
            let q = &shared.queues;
            service_loop(&q.backend_input, &q.backend_output, OutputPolicy::Wait, |input| {
                backend.spin_once(input).map(|out| Some(Arc::new(out)))
            })
        })?;
        workers.spawn(WorkerKind::Mesher, move |shared| {
            let q = &shared.queues;
            service_loop(&q.mesher_input, &q.mesher_output, OutputPolicy::Wait, |input| {
                mesher.spin_once(input).map(Some)
            })
        })?;
        workers.spawn(WorkerKind::Visualizer, move |shared| {
            let q = &shared.queues;
            service_loop(&q.visualizer_input, &q.visualizer_output, OutputPolicy::KeepLatest, |input| {
                visualizer.spin_once(input)
            })
        })?;

        Ok(workers)
    }

    fn spawn<F>(&mut self, kind: WorkerKind, body: F) -> PipelineResult<()>
    where
        F: FnOnce(&SharedState) -> Result<usize> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(kind.thread_name().to_string())
            .spawn(move || {
                info!("{} thread started", kind);
                match panic::catch_unwind(AssertUnwindSafe(|| body(&shared))) {
                    Ok(Ok(iterations)) => info!("{} thread stopped after {} iterations", kind, iterations),
                    Ok(Err(e)) => shared.report_failure(kind, format!("{e:#}")),
                    Err(payload) => shared.report_failure(kind, panic_message(payload.as_ref())),
                }
            });

        match spawned {
            Ok(handle) => {
                self.handles.push((kind, handle));
                Ok(())
            }
            Err(e) => {
                error!("Failed to spawn {} thread: {}", kind, e);
                self.shutdown();
                Err(e.into())
            }
        }
    }

    /// Number of threads not yet joined.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Close every queue and join the workers in the order backend, mesher,
    /// visualizer. Idempotent.
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.shared.request_shutdown();
        for (kind, handle) in self.handles.drain(..) {
            debug!("Joining {} thread", kind);
            if handle.join().is_err() {
                error!("{} thread panicked outside its service loop", kind);
            }
        }
        info!("All worker threads joined");
    }
}

impl Drop for WorkerThreads {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What a worker does when its output queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputPolicy {
    /// Wait for the consumer.
    Wait,
    /// Discard the oldest queued output.
    KeepLatest,
}

/// Pop, process, push until either queue is closed.
///
/// `step` may decline to produce an output by returning `None`.
/// Returns the number of processed items.
fn service_loop<I, O>(
    input: &Queue<I>,
    output: &Queue<O>,
    policy: OutputPolicy,
    mut step: impl FnMut(I) -> Result<Option<O>>,
) -> Result<usize> {
    let mut iterations = 0;
    while let Ok(item) = input.pop_blocking() {
        iterations += 1;
        let Some(out) = step(item)? else {
            continue;
        };
        let pushed = match policy {
            OutputPolicy::Wait => output.push_blocking(out),
            OutputPolicy::KeepLatest => output.push_dropping_oldest(out).map(|dropped| {
                if dropped > 0 {
                    debug!("{}: replaced {} unread output(s)", output.name(), dropped);
                }
            }),
        };
        if pushed.is_err() {
            break;
        }
    }
    Ok(iterations)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
