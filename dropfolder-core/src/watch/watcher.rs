//! The watch-folder state machine.
//!
//! [`DropFolderWatcher`] owns the registry, the partial tracker and both
//! timers, and reacts to one [`WatchEvent`] at a time through
//! [`DropFolderWatcher::handle`]. It never blocks beyond short metadata reads
//! and directory listings, so it can live inside a single control task.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::batch::{BatchOrigin, ReadyBatch, ReadySink};
use crate::classify::{PathClassifier, StatfsClassifier, WatchMode};
use crate::config::WatchConfig;
use crate::fs::{RealFs, WatchFs};
use crate::scan::{DirectoryScanner, MetadataValidator, PartialTracker};
use crate::watch::events::{EventSender, WatchEvent};
use crate::watch::notifier::{ChangeNotifier, NotifyNotifier};
use crate::watch::registry::{DirectoryWatch, WatchRegistry, canonical_path};
use crate::watch::scheduler::PollScheduler;

/// External capabilities the watcher consumes.
pub struct Collaborators {
    /// Decides between notification and polling for each added directory.
    pub classifier: Box<dyn PathClassifier>,
    /// Judges whether a metadata file is complete.
    pub validator: Arc<dyn MetadataValidator>,
    /// Subscribes local directories to change notifications.
    pub notifier: Box<dyn ChangeNotifier>,
    /// Listing, existence checks and renames.
    pub fs: Arc<dyn WatchFs>,
}

impl Collaborators {
    /// Real filesystem, `statfs` classification and `notify` subscriptions.
    pub fn system(validator: impl MetadataValidator + 'static) -> Self {
        Self {
            classifier: Box::new(StatfsClassifier::new()),
            validator: Arc::new(validator),
            notifier: Box::new(NotifyNotifier::new()),
            fs: Arc::new(RealFs::new()),
        }
    }

    pub fn with_classifier(mut self, classifier: impl PathClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn with_notifier(mut self, notifier: impl ChangeNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn WatchFs>) -> Self {
        self.fs = fs;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Watches directories for `.torrent` and `.magnet` files and reports the
/// ones that are ready for ingestion.
pub struct DropFolderWatcher {
    scanner: DirectoryScanner,
    partials: PartialTracker,
    registry: WatchRegistry,
    scheduler: PollScheduler,
    collaborators: Collaborators,
    events: EventSender,
    sink: Box<dyn ReadySink>,
}

impl fmt::Debug for DropFolderWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropFolderWatcher")
            .field("directories", &self.registry.len())
            .field("partials", &self.partials.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl DropFolderWatcher {
    /// Build a watcher. Timers and subscriptions deliver their events on
    /// `events`; the owner must feed them back through [`Self::handle`].
    /// Timers are spawned on the current tokio runtime.
    pub fn new(
        config: &WatchConfig,
        collaborators: Collaborators,
        events: EventSender,
        sink: impl ReadySink + 'static,
    ) -> Self {
        Self {
            scanner: DirectoryScanner::new(config),
            partials: PartialTracker::new(config.max_partial_retries, config.invalid_suffix.clone()),
            registry: WatchRegistry::new(),
            scheduler: PollScheduler::new(config.poll_interval(), events.clone()),
            collaborators,
            events,
            sink: Box::new(sink),
        }
    }

    /// Start watching `path`.
    ///
    /// Missing paths and paths already watched are ignored. Network
    /// directories join the poll set; local directories are subscribed and
    /// scanned right away so files present before the subscription are not
    /// missed.
    pub fn add_path(&mut self, path: &Path) {
        if !self.collaborators.fs.is_dir(path) {
            debug!("not watching {}: no such directory", path.display());
            return;
        }
        let dir = canonical_path(path);
        if self.registry.contains(&dir) {
            debug!("{} is already watched", dir.display());
            return;
        }

        match self.collaborators.classifier.classify(&dir) {
            WatchMode::Network => {
                info!("network folder detected at {}, using polling mode", dir.display());
                self.add_network(dir);
            }
            WatchMode::Local => {
                match self
                    .collaborators
                    .notifier
                    .subscribe(&dir, self.events.clone())
                {
                    Ok(subscription) => {
                        info!("watching {} in normal mode", dir.display());
                        self.registry
                            .insert(dir.clone(), DirectoryWatch::Notified(subscription));
                        let ready = self.scan_directory(&dir);
                        self.report(BatchOrigin::InitialScan(dir), ready);
                    }
                    Err(err) => {
                        warn!("{err}; falling back to polling {}", dir.display());
                        self.add_network(dir);
                    }
                }
            }
        }
    }

    fn add_network(&mut self, dir: PathBuf) {
        self.registry.insert(dir, DirectoryWatch::Polled);
        self.scheduler.ensure_network_poll();
    }

    /// Stop watching `path`. Unknown paths are ignored.
    pub fn remove_path(&mut self, path: &Path) {
        let dir = canonical_path(path);
        let removed = self
            .registry
            .remove(&dir)
            .or_else(|| self.registry.remove(path));
        match removed {
            Some(mode) => {
                info!("stopped watching {} ({mode})", dir.display());
                if mode == WatchMode::Network && !self.registry.has_network_directories() {
                    self.scheduler.stop_network_poll();
                }
            }
            None => debug!("{} was not watched", path.display()),
        }
    }

    /// Canonical paths of every watched directory.
    pub fn directories(&self) -> BTreeSet<PathBuf> {
        self.registry.directories()
    }

    /// Single dispatch point for notifications and timer ticks.
    pub fn handle(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::DirectoryChanged(dir) => self.scan_local_directory(&dir),
            WatchEvent::NotifyError { dir, message } => {
                // Events may have been lost; a rescan catches up.
                warn!("change notification error for {}: {}", dir.display(), message);
                self.scan_local_directory(&dir);
            }
            WatchEvent::NetworkPollTick { generation } => {
                if self.scheduler.accepts_network_tick(generation) {
                    self.scan_network_directories();
                } else {
                    debug!("ignoring stale network poll tick {generation}");
                }
            }
            WatchEvent::ReconcileTick { generation } => {
                if self.scheduler.accepts_reconcile_tick(generation) {
                    self.reconcile_partials();
                } else {
                    debug!("ignoring stale reconcile tick {generation}");
                }
            }
        }
    }

    /// Rescan one subscribed local directory and report it on its own.
    pub fn scan_local_directory(&mut self, dir: &Path) {
        if self.registry.mode(dir) != Some(WatchMode::Local) {
            debug!("ignoring change in unwatched directory {}", dir.display());
            return;
        }
        let ready = self.scan_directory(dir);
        self.report(BatchOrigin::LocalChange(dir.to_path_buf()), ready);
    }

    /// Scan every network directory and report the union as one batch.
    pub fn scan_network_directories(&mut self) {
        let mut ready = Vec::new();
        for dir in self.registry.network_directories() {
            ready.extend(self.scan_directory(&dir));
        }
        self.report(BatchOrigin::NetworkPoll, ready);
    }

    /// One reconciliation tick over every partial file.
    pub fn reconcile_partials(&mut self) {
        let outcome = self.partials.reconcile(
            self.collaborators.fs.as_ref(),
            self.collaborators.validator.as_ref(),
        );

        if self.partials.is_empty() {
            self.scheduler.stop_reconcile();
            debug!("no longer any partial torrent");
        } else {
            self.scheduler.rearm_reconcile();
            debug!(
                "still {} partial torrents after delayed processing",
                self.partials.len()
            );
        }

        self.report(BatchOrigin::Reconcile, outcome.ready);
    }

    /// Drop every subscription and timer.
    pub fn shutdown(&mut self) {
        self.registry.clear();
        self.scheduler.shutdown();
    }

    fn scan_directory(&mut self, dir: &Path) -> Vec<PathBuf> {
        let outcome = self.scanner.scan(
            dir,
            self.collaborators.fs.as_ref(),
            self.collaborators.validator.as_ref(),
            &mut self.partials,
        );
        if !self.partials.is_empty() {
            self.scheduler.ensure_reconcile();
        }
        outcome.ready
    }

    fn report(&self, origin: BatchOrigin, files: Vec<PathBuf>) {
        if files.is_empty() {
            return;
        }
        info!("{} torrent files ready ({:?})", files.len(), origin);
        debug!(
            "the following files are being reported: {}",
            files
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.sink.files_ready(ReadyBatch { origin, files });
    }

    /// How `path` is watched, if it is registered.
    pub fn mode_of(&self, path: &Path) -> Option<WatchMode> {
        self.registry.mode(&canonical_path(path))
    }

    /// Failed reconciliation ticks of a tracked partial file.
    pub fn partial_retry_count(&self, path: &Path) -> Option<u32> {
        self.partials.retry_count(path)
    }

    /// Number of partial files awaiting reconciliation.
    pub fn partial_count(&self) -> usize {
        self.partials.len()
    }

    /// Whether the network poll timer is armed.
    pub fn is_network_poll_active(&self) -> bool {
        self.scheduler.is_network_poll_active()
    }

    /// Whether the reconciliation timer is armed.
    pub fn is_reconcile_active(&self) -> bool {
        self.scheduler.is_reconcile_active()
    }
}

impl Drop for DropFolderWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
