//! Shutdown-aware FIFO queue connecting the orchestrator and the workers.
//!
//! A `crossbeam_channel` carries the items. A second, message-less channel
//! acts as the shutdown signal: dropping its only sender disconnects it, which
//! wakes every `select!` blocked on it. After `shutdown` every push and pop
//! returns [`QueueClosed`], including the ones already blocked.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use thiserror::Error;

/// Returned by queue operations once the queue has been shut down.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("queue `{0}` is shut down")]
pub struct QueueClosed(pub &'static str);

pub struct Queue<T> {
    name: &'static str,
    tx: Sender<T>,
    rx: Receiver<T>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
}

impl<T> Queue<T> {
    /// Queue holding at most `capacity` items; `push_blocking` waits when full.
    pub fn bounded(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self::with_channel(name, tx, rx)
    }

    /// Queue without a capacity limit; `push_blocking` never waits.
    pub fn unbounded(name: &'static str) -> Self {
        let (tx, rx) = unbounded();
        Self::with_channel(name, tx, rx)
    }

    fn with_channel(name: &'static str, tx: Sender<T>, rx: Receiver<T>) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded(0);
        Self {
            name,
            tx,
            rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Push `item`, waiting while the queue is full.
    ///
    /// The item is dropped if the queue is (or gets) shut down.
    pub fn push_blocking(&self, item: T) -> Result<(), QueueClosed> {
        if self.is_shutdown() {
            return Err(self.closed_signal());
        }
        select! {
            send(self.tx, item) -> res => res.map_err(|_| self.closed_signal()),
            recv(self.shutdown_rx) -> _ => Err(self.closed_signal()),
        }
    }

    /// Push `item` without waiting. While the queue is full the oldest items
    /// are discarded to make room.
    ///
    /// Returns how many items were discarded.
    pub fn push_dropping_oldest(&self, mut item: T) -> Result<usize, QueueClosed> {
        let mut dropped = 0;
        loop {
            if self.is_shutdown() {
                return Err(self.closed_signal());
            }
            match self.tx.try_send(item) {
                Ok(()) => return Ok(dropped),
                Err(TrySendError::Full(rejected)) => {
                    item = rejected;
                    // A consumer may have emptied the slot in between.
                    if self.rx.try_recv().is_ok() {
                        dropped += 1;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Err(self.closed_signal()),
            }
        }
    }

    /// Pop the oldest item, waiting until one is available.
    pub fn pop_blocking(&self) -> Result<T, QueueClosed> {
        if self.is_shutdown() {
            return Err(self.closed_signal());
        }
        select! {
            recv(self.rx) -> msg => msg.map_err(|_| self.closed_signal()),
            recv(self.shutdown_rx) -> _ => Err(self.closed_signal()),
        }
    }

    /// Pop the oldest item if one is available right now.
    pub fn pop_nonblocking(&self) -> Result<Option<T>, QueueClosed> {
        if self.is_shutdown() {
            return Err(self.closed_signal());
        }
        match self.rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.closed_signal()),
        }
    }

    /// Close the queue and wake every blocked caller. Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the only sender disconnects `shutdown_rx`.
        self.shutdown_tx.lock().take();
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn closed_signal(&self) -> QueueClosed {
        QueueClosed(self.name)
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
