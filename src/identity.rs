//! Stable identifiers for the file behind an open handle.

use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// Distinguishes one underlying file from another reachable through the same path.
///
/// On Unix this is the device and inode pair, plus the creation time where the
/// file system reports one, so a recycled inode is still told apart. Elsewhere
/// only the creation time is available, which still changes when a rotated
/// file is recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    device: u64,
    index: u64,
    created: u64,
}

impl FileIdentity {
    /// Captures the identity described by `metadata`.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            device: metadata.dev(),
            index: metadata.ino(),
            created: created_nanos(metadata),
        }
    }

    /// Captures the identity described by `metadata`.
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            device: 0,
            index: 0,
            created: created_nanos(metadata),
        }
    }
}

/// Creation time in nanoseconds since the epoch, or 0 when unsupported.
fn created_nanos(metadata: &Metadata) -> u64 {
    metadata
        .created()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_nanos() as u64)
        .unwrap_or_default()
}
