//! Local vs. network filesystem detection.
//!
//! Network shares (CIFS/SMB/NFS) do not deliver reliable change
//! notifications, so directories living on them are polled instead. Any
//! failure to determine the filesystem type classifies the directory as
//! local.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// `statfs::f_type` of a CIFS mount.
pub const CIFS_MAGIC_NUMBER: u32 = 0xFF53_4D42;
/// `statfs::f_type` of an SMB2/SMB3 mount on recent kernels.
pub const SMB2_MAGIC_NUMBER: u32 = 0xFE53_4D42;
/// `statfs::f_type` of an NFS mount.
pub const NFS_SUPER_MAGIC: u32 = 0x6969;
/// `statfs::f_type` of a legacy smbfs mount.
pub const SMB_SUPER_MAGIC: u32 = 0x517B;

/// How a watched directory is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// OS push notifications.
    Local,
    /// Periodic polling.
    Network,
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMode::Local => f.write_str("local"),
            WatchMode::Network => f.write_str("network"),
        }
    }
}

pub trait PathClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> WatchMode;
}

impl<F> PathClassifier for F
where
    F: Fn(&Path) -> WatchMode + Send + Sync,
{
    fn classify(&self, path: &Path) -> WatchMode {
        self(path)
    }
}

/// Classify a Linux `statfs` magic number.
pub fn mode_for_magic(magic: u32) -> WatchMode {
    match magic {
        CIFS_MAGIC_NUMBER | SMB2_MAGIC_NUMBER | NFS_SUPER_MAGIC | SMB_SUPER_MAGIC => {
            WatchMode::Network
        }
        _ => WatchMode::Local,
    }
}

/// Classify a BSD-style filesystem type name (`statfs::f_fstypename`).
pub fn mode_for_type_name(name: &str) -> WatchMode {
    match name {
        "nfs" | "cifs" | "smbfs" => WatchMode::Network,
        _ => WatchMode::Local,
    }
}

/// Classifier backed by `statfs(2)` on platforms that expose the filesystem
/// type. Everywhere else every directory is local.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatfsClassifier;

impl StatfsClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl PathClassifier for StatfsClassifier {
    fn classify(&self, path: &Path) -> WatchMode {
        platform::classify(path)
    }
}

/// Classifier that always answers the same mode, e.g. to force polling.
#[derive(Debug, Clone, Copy)]
pub struct FixedClassifier(pub WatchMode);

impl PathClassifier for FixedClassifier {
    fn classify(&self, _path: &Path) -> WatchMode {
        self.0
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod platform {
    use std::path::Path;

    use nix::sys::statfs::statfs;
    use tracing::warn;

    use super::{WatchMode, mode_for_magic};

    pub(super) fn classify(path: &Path) -> WatchMode {
        match statfs(path) {
            // f_type width differs between libc flavours; every magic we
            // recognise fits in 32 bits.
            Ok(stat) => mode_for_magic(stat.filesystem_type().0 as u32),
            Err(errno) => {
                warn!(
                    path = %path.display(),
                    errno = errno as i32,
                    "statfs() failed ({}), supposing it is a local folder",
                    errno.desc()
                );
                WatchMode::Local
            }
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
mod platform {
    use std::path::Path;

    use nix::sys::statfs::statfs;
    use tracing::warn;

    use super::{WatchMode, mode_for_type_name};

    pub(super) fn classify(path: &Path) -> WatchMode {
        match statfs(path) {
            Ok(stat) => mode_for_type_name(stat.filesystem_type_name()),
            Err(errno) => {
                warn!(
                    path = %path.display(),
                    errno = errno as i32,
                    "statfs() failed ({}), supposing it is a local folder",
                    errno.desc()
                );
                WatchMode::Local
            }
        }
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "freebsd"
)))]
mod platform {
    use std::path::Path;

    use super::WatchMode;

    pub(super) fn classify(_path: &Path) -> WatchMode {
        WatchMode::Local
    }
}
