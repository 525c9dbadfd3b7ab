//! Ready batches and the sink they are delivered to.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::warn;

/// What produced a batch of ready files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOrigin {
    /// First scan of a local directory right after it was subscribed.
    InitialScan(PathBuf),
    /// OS change notification for a local directory.
    LocalChange(PathBuf),
    /// Periodic poll over every network directory.
    NetworkPoll,
    /// Partial files that became valid on a reconciliation tick.
    Reconcile,
}

/// Files that became ready for ingestion in one scan or reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyBatch {
    pub origin: BatchOrigin,
    pub files: Vec<PathBuf>,
}

impl ReadyBatch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Receives every non-empty ready batch.
pub trait ReadySink: Send {
    fn files_ready(&self, batch: ReadyBatch);
}

impl ReadySink for mpsc::UnboundedSender<ReadyBatch> {
    fn files_ready(&self, batch: ReadyBatch) {
        if let Err(err) = self.send(batch) {
            warn!(
                "ready batch dropped, receiver is gone ({} files)",
                err.0.len()
            );
        }
    }
}

/// Sink that keeps every batch in memory. Mostly useful in tests.
#[derive(Clone, Default)]
pub struct CollectingSink {
    batches: Arc<Mutex<Vec<ReadyBatch>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every batch collected so far.
    pub fn take(&self) -> Vec<ReadyBatch> {
        let mut guard = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

impl ReadySink for CollectingSink {
    fn files_ready(&self, batch: ReadyBatch) {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch);
    }
}

impl fmt::Debug for CollectingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .batches
            .lock()
            .map(|guard| guard.len())
            .unwrap_or_default();
        f.debug_struct("CollectingSink")
            .field("pending_batches", &pending)
            .finish()
    }
}
