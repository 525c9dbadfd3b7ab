use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Minimal filesystem abstraction used by the scanner and partial tracker.
///
/// Every call is a short synchronous metadata read, listing or rename; the
/// control task runs each handler to completion.
pub trait WatchFs: Send + Sync {
    /// Check whether a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Check whether a path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Regular files directly inside `dir`. Not recursive.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Real filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl WatchFs for RealFs {
    fn exists(&self, path: &Path) -> bool {
        // try_exists avoids errors for permission issues by returning false
        path.try_exists().unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            // Symlinks count when they resolve to a regular file.
            if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}

/// In-memory filesystem for tests.
/// Note: Paths are treated literally; callers should use consistent absolute paths.
#[derive(Default)]
pub struct InMemoryFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
}

#[derive(Clone)]
enum Node {
    Dir,
    File { contents: Vec<u8> },
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_dir<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        let mut nodes = self.nodes();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
    }

    /// Create or overwrite a file, creating parent directories as needed.
    pub fn write_file<P: Into<PathBuf>>(&self, path: P, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.nodes().insert(
            path,
            Node::File {
                contents: contents.into(),
            },
        );
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.nodes().remove(path).is_some()
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        match self.nodes().get(path) {
            Some(Node::File { contents }) => Some(contents.clone()),
            _ => None,
        }
    }
}

impl WatchFs for InMemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.nodes().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes().get(path), Some(Node::Dir))
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let nodes = self.nodes();
        if !matches!(nodes.get(dir), Some(Node::Dir)) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            ));
        }
        Ok(nodes
            .iter()
            .filter(|(path, node)| {
                matches!(node, Node::File { .. }) && path.parent() == Some(dir)
            })
            .map(|(path, _)| path.clone())
            .collect())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut nodes = self.nodes();
        let node = nodes.remove(from).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", from.display()),
            )
        })?;
        nodes.insert(to.to_path_buf(), node);
        Ok(())
    }
}

impl fmt::Debug for InMemoryFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryFs")
            .field("node_count", &self.nodes().len())
            .finish()
    }
}
