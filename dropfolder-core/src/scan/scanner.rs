use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::WatchConfig;
use crate::fs::WatchFs;
use crate::scan::partial::PartialTracker;
use crate::scan::validate::MetadataValidator;

/// Kind of file the scanner cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Torrent metadata; must validate before it is reported.
    Metadata,
    /// Magnet link; always reported.
    Magnet,
}

/// Result of a single directory pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Files ready for ingestion, in path order.
    pub ready: Vec<PathBuf>,
    /// Metadata files that started being tracked as partial in this pass.
    pub newly_partial: usize,
}

/// Lists the candidate files of one directory and splits them into ready,
/// partial and ignorable.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    metadata_ext: String,
    magnet_ext: String,
}

impl DirectoryScanner {
    /// Scanner matching the extensions configured in `config`.
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            metadata_ext: config.metadata_ext().to_ascii_lowercase(),
            magnet_ext: config.magnet_ext().to_ascii_lowercase(),
        }
    }

    /// Extension match, case-insensitive.
    pub fn candidate_kind(&self, path: &Path) -> Option<CandidateKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == self.magnet_ext {
            Some(CandidateKind::Magnet)
        } else if ext == self.metadata_ext {
            Some(CandidateKind::Metadata)
        } else {
            None
        }
    }

    /// Scan `dir` once, non-recursively.
    ///
    /// Magnet files are always ready. Metadata files are ready when they
    /// validate; a valid file that was being tracked as partial is dropped
    /// from the tracker so it is never reported twice. Invalid metadata files
    /// not yet tracked are registered at retry count 0. A listing failure is
    /// logged and yields an empty outcome.
    pub fn scan(
        &self,
        dir: &Path,
        fs: &dyn WatchFs,
        validator: &dyn MetadataValidator,
        partials: &mut PartialTracker,
    ) -> ScanOutcome {
        let mut files = match fs.list_files(dir) {
            Ok(files) => files,
            Err(err) => {
                warn!("failed to list {}: {}", dir.display(), err);
                return ScanOutcome::default();
            }
        };
        files.sort();

        let mut outcome = ScanOutcome::default();
        for path in files {
            match self.candidate_kind(&path) {
                Some(CandidateKind::Magnet) => outcome.ready.push(path),
                Some(CandidateKind::Metadata) => {
                    if validator.is_valid(&path) {
                        partials.forget(&path);
                        outcome.ready.push(path);
                    } else if partials.register(path) {
                        outcome.newly_partial += 1;
                    }
                }
                None => {}
            }
        }

        debug!(
            "scanned {}: {} ready, {} newly partial",
            dir.display(),
            outcome.ready.len(),
            outcome.newly_partial
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    fn scanner() -> DirectoryScanner {
        DirectoryScanner::new(&WatchConfig::default())
    }

    #[test]
    fn classifies_extensions_case_insensitively() {
        let scanner = scanner();
        assert_eq!(
            scanner.candidate_kind(Path::new("/d/A.TORRENT")),
            Some(CandidateKind::Metadata)
        );
        assert_eq!(
            scanner.candidate_kind(Path::new("/d/link.Magnet")),
            Some(CandidateKind::Magnet)
        );
        assert_eq!(scanner.candidate_kind(Path::new("/d/a.torrent.invalid")), None);
        assert_eq!(scanner.candidate_kind(Path::new("/d/torrent")), None);
    }

    #[test]
    fn magnet_only_directory_is_ready_without_tracking() {
        let fs = InMemoryFs::new();
        fs.write_file("/drop/x.magnet", "magnet:?xt=urn:btih:abc");
        let mut partials = PartialTracker::new(5, ".invalid");
        let never = |_: &Path| -> bool { panic!("magnet links are not validated") };

        let outcome = scanner().scan(Path::new("/drop"), &fs, &never, &mut partials);

        assert_eq!(outcome.ready, vec![PathBuf::from("/drop/x.magnet")]);
        assert_eq!(outcome.newly_partial, 0);
        assert!(partials.is_empty());
    }

    #[test]
    fn invalid_metadata_is_tracked_once() {
        let fs = InMemoryFs::new();
        fs.write_file("/drop/a.torrent", "partial");
        fs.write_file("/drop/notes.txt", "ignored");
        let mut partials = PartialTracker::new(5, ".invalid");
        let invalid = |_: &Path| false;

        let first = scanner().scan(Path::new("/drop"), &fs, &invalid, &mut partials);
        let second = scanner().scan(Path::new("/drop"), &fs, &invalid, &mut partials);

        assert!(first.ready.is_empty());
        assert_eq!(first.newly_partial, 1);
        assert_eq!(second.newly_partial, 0);
        assert_eq!(partials.retry_count(Path::new("/drop/a.torrent")), Some(0));
    }

    #[test]
    fn valid_file_leaves_partial_tracking() {
        let fs = InMemoryFs::new();
        fs.write_file("/drop/a.torrent", "done");
        let mut partials = PartialTracker::new(5, ".invalid");
        partials.register(PathBuf::from("/drop/a.torrent"));

        let outcome = scanner().scan(Path::new("/drop"), &fs, &|_: &Path| true, &mut partials);

        assert_eq!(outcome.ready, vec![PathBuf::from("/drop/a.torrent")]);
        assert!(partials.is_empty());
    }

    #[test]
    fn listing_failure_yields_nothing() {
        let fs = InMemoryFs::new();
        let mut partials = PartialTracker::new(5, ".invalid");
        let outcome = scanner().scan(Path::new("/gone"), &fs, &|_: &Path| true, &mut partials);
        assert_eq!(outcome, ScanOutcome::default());
    }
}
