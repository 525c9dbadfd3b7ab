use std::collections::BTreeSet;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, timeout_at};
use tracing::{debug, error};

use crate::batch::ReadySink;
use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::watch::events::{
    EventSender, WatchCommand, WatchEvent, WatchMessage, control_channel,
};
use crate::watch::watcher::{Collaborators, DropFolderWatcher};

/// Handle to a running watcher.
///
/// Every registry mutation, notification and timer tick is processed by one
/// control task in arrival order, so the watcher state is never touched
/// concurrently. Dropping the handle stops the task.
#[derive(Debug)]
pub struct WatchService {
    tx: mpsc::UnboundedSender<WatchMessage>,
    task: Option<JoinHandle<()>>,
}

impl WatchService {
    /// Start the control task on the current tokio runtime.
    pub fn spawn(
        config: WatchConfig,
        collaborators: Collaborators,
        sink: impl ReadySink + 'static,
    ) -> Self {
        let (tx, rx) = control_channel();
        let watcher =
            DropFolderWatcher::new(&config, collaborators, EventSender::new(tx.clone()), sink);
        let task = tokio::spawn(run_control_loop(watcher, rx, config.debounce_window()));
        Self {
            tx,
            task: Some(task),
        }
    }

    /// Queue `path` for watching; errors only if the control task is gone.
    pub fn add_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.command(WatchCommand::AddPath(path.into()))
    }

    /// Queue `path` for removal; errors only if the control task is gone.
    pub fn remove_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.command(WatchCommand::RemovePath(path.into()))
    }

    /// Watched directories once every earlier command has been applied.
    pub async fn directories(&self) -> Result<BTreeSet<PathBuf>> {
        let (reply, response) = oneshot::channel();
        self.command(WatchCommand::Directories(reply))?;
        response.await.map_err(|_| WatchError::ServiceClosed)
    }

    /// Stop the control task and wait for it to release every subscription
    /// and timer.
    pub async fn shutdown(mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let _ = self.tx.send(WatchMessage::Command(WatchCommand::Shutdown));
        task.await.map_err(|err| {
            error!("watch control task failed: {err}");
            WatchError::ServiceClosed
        })
    }

    fn command(&self, command: WatchCommand) -> Result<()> {
        self.tx
            .send(WatchMessage::Command(command))
            .map_err(|_| WatchError::ServiceClosed)
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.tx.send(WatchMessage::Command(WatchCommand::Shutdown));
        }
    }
}

/// Directory changes are held for `debounce` after the first one arrives, so
/// a burst of notifications for the same directory costs one rescan.
async fn run_control_loop(
    mut watcher: DropFolderWatcher,
    mut rx: mpsc::UnboundedReceiver<WatchMessage>,
    debounce: Duration,
) {
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    let mut flush_at = Instant::now();
    loop {
        let message = if pending.is_empty() {
            rx.recv().await
        } else {
            match timeout_at(flush_at, rx.recv()).await {
                Ok(message) => message,
                Err(_) => {
                    flush_pending(&mut watcher, &mut pending);
                    continue;
                }
            }
        };
        let Some(message) = message else {
            break;
        };
        match message {
            WatchMessage::Command(WatchCommand::AddPath(path)) => watcher.add_path(&path),
            WatchMessage::Command(WatchCommand::RemovePath(path)) => watcher.remove_path(&path),
            WatchMessage::Command(WatchCommand::Directories(reply)) => {
                let _ = reply.send(watcher.directories());
            }
            WatchMessage::Command(WatchCommand::Shutdown) => break,
            WatchMessage::Event(WatchEvent::DirectoryChanged(dir)) if !debounce.is_zero() => {
                if pending.is_empty() {
                    flush_at = Instant::now() + debounce;
                }
                pending.insert(dir);
            }
            WatchMessage::Event(event) => watcher.handle(event),
        }
    }
    if !pending.is_empty() {
        debug!(dirs = pending.len(), "dropping pending rescans on shutdown");
    }
    watcher.shutdown();
    debug!("watch control task stopped");
}

fn flush_pending(watcher: &mut DropFolderWatcher, pending: &mut BTreeSet<PathBuf>) {
    for dir in std::mem::take(pending) {
        watcher.handle(WatchEvent::DirectoryChanged(dir));
    }
}
