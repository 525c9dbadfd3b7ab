//! Messages processed by the control task.
//!
//! Commands come from [`WatchService`](super::service::WatchService) handles;
//! events come from OS subscriptions and timers. Both travel on one channel so
//! the control task sees them in arrival order.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

/// Something that happened and needs the watcher's attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The contents of a subscribed local directory changed.
    DirectoryChanged(PathBuf),
    /// The OS notification backend reported an error for a directory.
    NotifyError { dir: PathBuf, message: String },
    /// The network poll timer fired.
    NetworkPollTick { generation: u64 },
    /// The partial reconciliation timer fired.
    ReconcileTick { generation: u64 },
}

/// Requests from service handles.
#[derive(Debug)]
pub enum WatchCommand {
    AddPath(PathBuf),
    RemovePath(PathBuf),
    Directories(oneshot::Sender<BTreeSet<PathBuf>>),
    Shutdown,
}

#[derive(Debug)]
pub enum WatchMessage {
    Command(WatchCommand),
    Event(WatchEvent),
}

/// Sending half handed to notifiers and timers.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<WatchMessage>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<WatchMessage>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns `false` once the control task is gone.
    pub fn send(&self, event: WatchEvent) -> bool {
        self.tx.send(WatchMessage::Event(event)).is_ok()
    }
}

/// Create the control channel.
pub fn control_channel() -> (
    mpsc::UnboundedSender<WatchMessage>,
    mpsc::UnboundedReceiver<WatchMessage>,
) {
    mpsc::unbounded_channel()
}
