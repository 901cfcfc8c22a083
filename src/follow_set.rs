//! The set of followed paths and their open handles.

use crate::error::{Error, InvalidTargetKind, Result};
use crate::identity::FileIdentity;
use crate::reader::{StartPosition, TrackedFile};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tracing::{debug, info, warn};

/// Result of comparing a path's on-disk identity with its open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The path still refers to the file being read.
    Unchanged,
    /// The path now refers to a different file.
    Rotated,
    /// Nothing can be stat'ed at the path.
    Vanished,
}

/// A line read by [`FollowSet::drain_lines`], flagged when it is the last
/// line of the batch.
pub type DrainedLine = (String, bool);

/// Followed paths in registration order, each with its own handle and cursor.
///
/// File system failures after registration never escape this type: the
/// affected path is closed and retried by the next [`FollowSet::ensure_open`].
#[derive(Default)]
pub struct FollowSet {
    files: Vec<TrackedFile>,
}

impl FollowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `path` and starts tracking it.
    ///
    /// Registering a path that is already tracked leaves the existing entry,
    /// and its read position, untouched. The file is not opened here.
    pub async fn register<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        validate_target(path).await?;

        if self.contains(path) {
            debug!(path = %path.display(), "path already followed");
            return Ok(());
        }

        self.files.push(TrackedFile::new(path.to_path_buf()));
        debug!(path = %path.display(), "registered followed path");
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Tracked paths in registration order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(TrackedFile::path)
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.get(path).is_some_and(TrackedFile::is_open)
    }

    /// Byte offset of the next unread line, if `path` is tracked.
    pub fn cursor(&self, path: &Path) -> Option<u64> {
        self.get(path).map(TrackedFile::cursor)
    }

    pub fn identity(&self, path: &Path) -> Option<FileIdentity> {
        self.get(path).and_then(TrackedFile::identity)
    }

    /// Opens `path` positioned at its current end, so only later appends are
    /// delivered. Returns whether the path is open afterwards.
    ///
    /// A file that cannot be opened right now leaves the entry unopened.
    pub async fn open_at_end(&mut self, path: &Path) -> bool {
        self.open_with(path, StartPosition::End).await
    }

    /// Opens `path` if it has no handle.
    ///
    /// The first open attempt of a session starts at end of file. Once an
    /// open has been attempted, even one that failed, any file found there
    /// later is new to the session and is read from its beginning.
    pub async fn ensure_open(&mut self, path: &Path) -> bool {
        let Some(tracked) = self.get(path) else {
            return false;
        };
        if tracked.is_open() {
            return true;
        }

        let start = if tracked.open_attempted() {
            StartPosition::Start
        } else {
            StartPosition::End
        };
        self.open_with(path, start).await
    }

    /// Reads every complete line available on `path` right now.
    ///
    /// A trailing partial line stays unread until its delimiter arrives. A
    /// read failure closes the handle and returns the lines read before it.
    pub async fn drain_lines(&mut self, path: &Path) -> Vec<DrainedLine> {
        self.begin_drain(path).await;

        let mut lines = Vec::new();
        while let Some(line) = self.next_line(path).await {
            lines.push(line);
        }
        mark_final(lines)
    }

    /// Compares the identity of whatever `path` refers to now against the
    /// identity captured when its handle was opened.
    pub async fn check_rotation(&self, path: &Path) -> RotationOutcome {
        let Some(tracked) = self.get(path) else {
            return RotationOutcome::Unchanged;
        };

        let on_disk = match fs::metadata(path).await {
            Ok(metadata) => FileIdentity::from_metadata(&metadata),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "followed path cannot be stat'ed");
                return RotationOutcome::Vanished;
            }
        };

        match tracked.identity() {
            Some(current) if current != on_disk => RotationOutcome::Rotated,
            _ => RotationOutcome::Unchanged,
        }
    }

    /// Acts on a [`RotationOutcome`].
    ///
    /// On `Rotated` the old handle is drained and its lines returned, then the
    /// new file is opened at its beginning. A partial line left at the end of
    /// the old file is dropped. On `Vanished` whatever the still-open handle
    /// can read is returned and the handle is parked. If the same file comes
    /// back at the path, reading resumes where it stopped; any other file is
    /// read from its beginning.
    pub async fn handle_rotation(&mut self, path: &Path, outcome: RotationOutcome) -> Vec<String> {
        let Some(tracked) = self.get_mut(path) else {
            return Vec::new();
        };

        match outcome {
            RotationOutcome::Unchanged => Vec::new(),
            RotationOutcome::Vanished => {
                if !tracked.is_open() {
                    return Vec::new();
                }
                let remaining = drain_retired(tracked).await;
                info!(
                    path = %path.display(),
                    drained = remaining.len(),
                    "followed file vanished"
                );
                tracked.park();
                remaining
            }
            RotationOutcome::Rotated => {
                let remaining = drain_retired(tracked).await;
                info!(
                    path = %path.display(),
                    drained = remaining.len(),
                    "followed file rotated, switching to new file"
                );
                tracked.release();
                self.open_with(path, StartPosition::Start).await;
                remaining
            }
        }
    }

    /// Resets the cursor of a copy-truncated file before reading.
    pub(crate) async fn begin_drain(&mut self, path: &Path) {
        let Some(tracked) = self.get_mut(path) else {
            return;
        };

        if let Err(err) = tracked.rewind_if_truncated().await {
            park_after_error(tracked, &err);
        }
    }

    /// Reads one complete line, closing the handle if the read fails.
    pub(crate) async fn next_line(&mut self, path: &Path) -> Option<String> {
        let tracked = self.get_mut(path)?;

        match tracked.next_line().await {
            Ok(line) => line,
            Err(err) => {
                park_after_error(tracked, &err);
                None
            }
        }
    }

    async fn open_with(&mut self, path: &Path, start: StartPosition) -> bool {
        let Some(tracked) = self.get_mut(path) else {
            return false;
        };

        match tracked.open(start).await {
            Ok(()) => true,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "followed file unavailable, will retry");
                false
            }
        }
    }

    fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.iter().find(|tracked| tracked.path() == path)
    }

    fn get_mut(&mut self, path: &Path) -> Option<&mut TrackedFile> {
        self.files.iter_mut().find(|tracked| tracked.path() == path)
    }
}

/// Reads what is left on a handle about to be released.
async fn drain_retired(tracked: &mut TrackedFile) -> Vec<String> {
    match tracked.read_available().await {
        Ok(lines) => lines,
        Err(err) => {
            warn!(
                path = %tracked.path().display(),
                error = %err,
                "failed to drain replaced file"
            );
            Vec::new()
        }
    }
}

fn park_after_error(tracked: &mut TrackedFile, err: &io::Error) {
    warn!(
        path = %tracked.path().display(),
        error = %err,
        "failed to read followed file, will reopen"
    );
    tracked.park();
}

/// Flags the last line of a batch.
fn mark_final(lines: Vec<String>) -> Vec<DrainedLine> {
    let last = lines.len().saturating_sub(1);
    lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| (line, index == last))
        .collect()
}

/// Checks a path can be followed: it exists, is not a directory, and opens for reading.
async fn validate_target(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|err| target_error(path, err))?;

    if metadata.is_dir() {
        return Err(Error::invalid_target(path, InvalidTargetKind::IsDirectory));
    }

    File::open(path).await.map_err(|err| target_error(path, err))?;
    Ok(())
}

fn target_error(path: &Path, err: io::Error) -> Error {
    match target_kind(&err) {
        Some(kind) => Error::invalid_target(PathBuf::from(path), kind),
        None => Error::Io(err),
    }
}

fn target_kind(err: &io::Error) -> Option<InvalidTargetKind> {
    match err.kind() {
        io::ErrorKind::NotFound => Some(InvalidTargetKind::NotFound),
        io::ErrorKind::PermissionDenied => Some(InvalidTargetKind::PermissionDenied),
        _ => None,
    }
}
