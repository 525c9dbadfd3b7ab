use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use normpath::PathExt;

use crate::classify::WatchMode;
use crate::watch::notifier::SubscriptionHandle;

/// How one registered directory is being observed.
#[derive(Debug)]
pub enum DirectoryWatch {
    /// OS push notifications; the subscription lives as long as the entry.
    Notified(SubscriptionHandle),
    /// Covered by the network poll timer.
    Polled,
}

impl DirectoryWatch {
    pub fn mode(&self) -> WatchMode {
        match self {
            DirectoryWatch::Notified(_) => WatchMode::Local,
            DirectoryWatch::Polled => WatchMode::Network,
        }
    }
}

/// Every watched directory, keyed by canonical path.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    entries: BTreeMap<PathBuf, DirectoryWatch>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`. Returns `false` and keeps the existing entry when the
    /// path is already registered; the rejected watch is dropped.
    pub fn insert(&mut self, path: PathBuf, watch: DirectoryWatch) -> bool {
        if self.entries.contains_key(&path) {
            return false;
        }
        self.entries.insert(path, watch);
        true
    }

    /// Unregister `path`, dropping its subscription if it had one.
    pub fn remove(&mut self, path: &Path) -> Option<WatchMode> {
        self.entries.remove(path).map(|watch| watch.mode())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn mode(&self, path: &Path) -> Option<WatchMode> {
        self.entries.get(path).map(DirectoryWatch::mode)
    }

    /// Polled directories, in path order.
    pub fn network_directories(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, watch)| matches!(watch, DirectoryWatch::Polled))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn has_network_directories(&self) -> bool {
        self.entries
            .values()
            .any(|watch| matches!(watch, DirectoryWatch::Polled))
    }

    /// Canonical paths of every registered directory.
    pub fn directories(&self) -> BTreeSet<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and subscription.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Canonical form of a directory path used as registry key.
///
/// Existing paths are resolved through the filesystem (symlinks, relative
/// components); anything else is cleaned lexically so removal of a directory
/// that no longer exists still finds its entry.
pub fn canonical_path(path: &Path) -> PathBuf {
    match path.normalize() {
        Ok(normalized) => normalized.into_path_buf(),
        Err(_) => lexical_clean(path),
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    clean.push(component);
                }
            }
            other => clean.push(other),
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_keeps_first_entry() {
        let mut registry = WatchRegistry::new();
        assert!(registry.insert(PathBuf::from("/a"), DirectoryWatch::Polled));
        assert!(!registry.insert(
            PathBuf::from("/a"),
            DirectoryWatch::Notified(SubscriptionHandle::new(()))
        ));
        assert_eq!(registry.mode(Path::new("/a")), Some(WatchMode::Network));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn network_directories_exclude_local_ones() {
        let mut registry = WatchRegistry::new();
        registry.insert(PathBuf::from("/net"), DirectoryWatch::Polled);
        registry.insert(
            PathBuf::from("/local"),
            DirectoryWatch::Notified(SubscriptionHandle::new(())),
        );
        assert_eq!(registry.network_directories(), vec![PathBuf::from("/net")]);
        assert_eq!(registry.directories().len(), 2);

        assert_eq!(registry.remove(Path::new("/net")), Some(WatchMode::Network));
        assert!(!registry.has_network_directories());
        assert_eq!(registry.remove(Path::new("/net")), None);
    }

    #[test]
    fn lexical_clean_drops_dot_components() {
        assert_eq!(
            lexical_clean(Path::new("/srv/./drop/../drop/")),
            PathBuf::from("/srv/drop")
        );
        assert_eq!(canonical_path(Path::new("/no/such/./dir")), PathBuf::from("/no/such/dir"));
    }

    #[test]
    fn canonical_path_resolves_existing_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("drop");
        std::fs::create_dir(&nested).unwrap();
        let dotted = tmp.path().join(".").join("drop").join("..").join("drop");
        assert_eq!(canonical_path(&dotted), canonical_path(&nested));
    }
}
