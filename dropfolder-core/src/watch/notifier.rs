//! OS change notification for local directories.
//!
//! A subscription is an owned handle: dropping it stops the notifications.
//! Each subscription reports its own directory, so the control task never has
//! to map raw event paths back to a watched root.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

use crate::error::{Result, WatchError};
use crate::watch::events::{EventSender, WatchEvent};

/// Keeps a directory subscription alive.
pub struct SubscriptionHandle {
    _guard: Box<dyn Any + Send>,
}

impl SubscriptionHandle {
    pub fn new<G: Any + Send>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubscriptionHandle")
    }
}

/// Subscribes directories to OS push notifications.
pub trait ChangeNotifier: Send {
    /// Start delivering [`WatchEvent::DirectoryChanged`] for `dir` on
    /// `events` until the returned handle is dropped.
    fn subscribe(&mut self, dir: &Path, events: EventSender) -> Result<SubscriptionHandle>;
}

/// `notify`-backed notifier; one non-recursive watcher per directory.
#[derive(Debug, Default, Clone)]
pub struct NotifyNotifier {
    config: NotifyConfig,
}

impl NotifyNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeNotifier for NotifyNotifier {
    fn subscribe(&mut self, dir: &Path, events: EventSender) -> Result<SubscriptionHandle> {
        let watched = dir.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if is_directory_change(&event.kind)
                        && !events.send(WatchEvent::DirectoryChanged(watched.clone()))
                    {
                        warn!(
                            "change notification for {} dropped, control task is gone",
                            watched.display()
                        );
                    }
                }
                Err(err) => {
                    let _ = events.send(WatchEvent::NotifyError {
                        dir: watched.clone(),
                        message: err.to_string(),
                    });
                }
            },
            self.config.clone(),
        )
        .map_err(|source| WatchError::Subscribe {
            path: dir.to_path_buf(),
            source,
        })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Subscribe {
                path: dir.to_path_buf(),
                source,
            })?;

        Ok(SubscriptionHandle::new(watcher))
    }
}

/// Whether a raw notify event changes the directory listing in a way that can
/// make a new file appear. Writes into existing files do not; a file still
/// being written is picked up by partial reconciliation instead.
fn is_directory_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(_) | ModifyKind::Any)
            | EventKind::Any
            | EventKind::Other
    )
}

/// Notifier that never delivers events but counts live subscriptions.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    active: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    subscribed: Arc<std::sync::Mutex<Vec<PathBuf>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every subscription attempt fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Subscriptions whose handle is still alive.
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Subscriptions ever handed out.
    pub fn total_subscriptions(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn subscribed_paths(&self) -> Vec<PathBuf> {
        self.subscribed
            .lock()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn subscribe(&mut self, dir: &Path, _events: EventSender) -> Result<SubscriptionHandle> {
        if self.fail {
            return Err(WatchError::Subscribe {
                path: dir.to_path_buf(),
                source: notify::Error::generic("subscriptions disabled"),
            });
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut paths) = self.subscribed.lock() {
            paths.push(dir.to_path_buf());
        }
        Ok(SubscriptionHandle::new(ActiveGuard(Arc::clone(&self.active))))
    }
}

#[cfg(test)]
mod tests {
    use notify::event::{
        AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode,
    };

    use super::*;

    #[test]
    fn only_listing_changes_count() {
        assert!(is_directory_change(&EventKind::Create(CreateKind::File)));
        assert!(is_directory_change(&EventKind::Modify(ModifyKind::Name(
            RenameMode::To
        ))));
        assert!(is_directory_change(&EventKind::Modify(ModifyKind::Name(
            RenameMode::Both
        ))));

        // One write produces these as well; none of them may trigger a rescan.
        assert!(!is_directory_change(&EventKind::Modify(ModifyKind::Data(
            DataChange::Any
        ))));
        assert!(!is_directory_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Any
        ))));
        assert!(!is_directory_change(&EventKind::Access(AccessKind::Close(
            AccessMode::Write
        ))));
        assert!(!is_directory_change(&EventKind::Access(AccessKind::Open(
            AccessMode::Read
        ))));
        assert!(!is_directory_change(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn recording_notifier_tracks_handle_lifetime() {
        let (tx, _rx) = crate::watch::events::control_channel();
        let mut notifier = RecordingNotifier::new();
        let handle = notifier
            .subscribe(Path::new("/drop"), EventSender::new(tx))
            .unwrap();
        assert_eq!(notifier.active_subscriptions(), 1);
        drop(handle);
        assert_eq!(notifier.active_subscriptions(), 0);
        assert_eq!(notifier.total_subscriptions(), 1);
        assert_eq!(notifier.subscribed_paths(), vec![PathBuf::from("/drop")]);
    }

    #[tokio::test]
    async fn notify_backend_reports_new_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = crate::watch::events::control_channel();
        let mut notifier = NotifyNotifier::new();
        let _handle = notifier.subscribe(tmp.path(), EventSender::new(tx)).unwrap();

        std::fs::write(tmp.path().join("a.magnet"), b"magnet:?xt=urn:btih:abc").unwrap();

        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("no notification within 5s")
            .expect("channel closed");
        match msg {
            crate::watch::events::WatchMessage::Event(WatchEvent::DirectoryChanged(dir)) => {
                assert_eq!(dir, tmp.path())
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_write_is_one_notification() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = crate::watch::events::control_channel();
        let mut notifier = NotifyNotifier::new();
        let _handle = notifier.subscribe(tmp.path(), EventSender::new(tx)).unwrap();

        std::fs::write(tmp.path().join("a.torrent"), b"d4:infod4:name1:aee").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let mut changes = 0;
        while let Ok(msg) = rx.try_recv() {
            if matches!(
                msg,
                crate::watch::events::WatchMessage::Event(WatchEvent::DirectoryChanged(_))
            ) {
                changes += 1;
            }
        }
        assert_eq!(changes, 1);
    }
}
