//! Retry bookkeeping for metadata files that failed validation.
//!
//! Every tracked path sits in `Partial(n)` with `0 <= n <= ceiling`. Each
//! reconciliation tick evaluates [`transition`] once per path; only `Retry`
//! keeps the entry, and it always moves `n` towards the ceiling, so a path
//! leaves tracking within `ceiling + 1` ticks.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::fs::WatchFs;
use crate::scan::validate::MetadataValidator;

/// Outcome of evaluating one tracked path on a reconciliation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The file is gone. Dropped without a report.
    Vanished,
    /// The file validates now. Dropped and reported.
    Ready,
    /// Retries exhausted. Renamed with the invalid suffix and dropped.
    Invalidate,
    /// Still invalid. Counter goes up by one.
    Retry,
}

/// Decide what happens to a partial file that has been retried
/// `retry_count` times. `is_valid` is only consulted when the file exists.
pub fn transition(
    retry_count: u32,
    ceiling: u32,
    exists: bool,
    is_valid: impl FnOnce() -> bool,
) -> Transition {
    if !exists {
        Transition::Vanished
    } else if is_valid() {
        Transition::Ready
    } else if retry_count >= ceiling {
        Transition::Invalidate
    } else {
        Transition::Retry
    }
}

/// `path` with `suffix` appended to its file name.
pub fn invalid_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Files that became valid, in path order.
    pub ready: Vec<PathBuf>,
    /// Files whose retries ran out (rename attempted).
    pub invalidated: Vec<PathBuf>,
    /// Files that disappeared.
    pub vanished: Vec<PathBuf>,
}

/// Owns the retry counter of every partial metadata file.
#[derive(Debug, Clone)]
pub struct PartialTracker {
    entries: BTreeMap<PathBuf, u32>,
    max_retries: u32,
    invalid_suffix: String,
}

impl PartialTracker {
    /// Empty tracker that gives up on a file after `max_retries` failed
    /// ticks and renames it by appending `invalid_suffix`.
    pub fn new(max_retries: u32, invalid_suffix: impl Into<String>) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_retries,
            invalid_suffix: invalid_suffix.into(),
        }
    }

    /// Start tracking `path` at retry count 0. Returns `false` (and leaves
    /// the counter untouched) when the path is already tracked.
    pub fn register(&mut self, path: PathBuf) -> bool {
        if self.entries.contains_key(&path) {
            return false;
        }
        debug!("partial torrent detected at {}, delaying processing", path.display());
        self.entries.insert(path, 0);
        true
    }

    /// Stop tracking `path`. Returns whether it was tracked.
    pub fn forget(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn retry_count(&self, path: &Path) -> Option<u32> {
        self.entries.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run one reconciliation tick over every tracked path.
    pub fn reconcile(
        &mut self,
        fs: &dyn WatchFs,
        validator: &dyn MetadataValidator,
    ) -> ReconcileOutcome {
        // Decide first, mutate after: the map is never edited while iterated.
        let decisions: Vec<(PathBuf, Transition)> = self
            .entries
            .iter()
            .map(|(path, &retries)| {
                let step = transition(retries, self.max_retries, fs.exists(path), || {
                    validator.is_valid(path)
                });
                (path.clone(), step)
            })
            .collect();

        let mut outcome = ReconcileOutcome::default();
        for (path, step) in decisions {
            match step {
                Transition::Retry => {
                    if let Some(retries) = self.entries.get_mut(&path) {
                        *retries += 1;
                    }
                }
                Transition::Vanished => {
                    self.entries.remove(&path);
                    outcome.vanished.push(path);
                }
                Transition::Ready => {
                    self.entries.remove(&path);
                    outcome.ready.push(path);
                }
                Transition::Invalidate => {
                    self.entries.remove(&path);
                    let target = invalid_path(&path, &self.invalid_suffix);
                    match fs.rename(&path, &target) {
                        Ok(()) => info!(
                            "giving up on {} after {} retries, renamed to {}",
                            path.display(),
                            self.max_retries,
                            target.display()
                        ),
                        Err(err) => warn!(
                            "giving up on {} after {} retries, rename failed: {}",
                            path.display(),
                            self.max_retries,
                            err
                        ),
                    }
                    outcome.invalidated.push(path);
                }
            }
        }

        outcome
    }
}
