//! Per-path handle lifecycle and whole-line extraction.

use crate::identity::FileIdentity;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info};

/// Lines are split on `\n` and delivered with the delimiter retained.
pub(crate) const LINE_DELIMITER: u8 = b'\n';

/// Where a freshly opened handle starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartPosition {
    /// Only content appended after the open is delivered.
    End,
    /// The file is read from its beginning, unless it is the same file that
    /// was parked earlier, in which case reading resumes where it stopped.
    Start,
}

struct OpenHandle {
    reader: BufReader<File>,
    identity: FileIdentity,
}

/// What is remembered about a handle closed because its path went unavailable.
#[derive(Debug, Clone, Copy)]
struct Parked {
    identity: FileIdentity,
    cursor: u64,
}

/// One followed path. The handle and its identity are only ever present together.
pub(crate) struct TrackedFile {
    path: PathBuf,
    handle: Option<OpenHandle>,
    cursor: u64,
    parked: Option<Parked>,
    open_attempted: bool,
}

impl TrackedFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            handle: None,
            cursor: 0,
            parked: None,
            open_attempted: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn identity(&self) -> Option<FileIdentity> {
        self.handle.as_ref().map(|open| open.identity)
    }

    pub(crate) fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Whether an open of this path has been tried in this session, whether
    /// or not it succeeded.
    pub(crate) fn open_attempted(&self) -> bool {
        self.open_attempted
    }

    /// Opens the path, replacing any current handle.
    ///
    /// The identity is taken from the opened handle itself so it can never
    /// describe a different file than the one being read.
    pub(crate) async fn open(&mut self, start: StartPosition) -> io::Result<()> {
        self.open_attempted = true;
        let file = File::open(&self.path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(io::Error::other("not a regular file"));
        }

        let identity = FileIdentity::from_metadata(&metadata);
        let len = metadata.len();
        let cursor = match start {
            StartPosition::End => len,
            StartPosition::Start => resume_position(self.parked, identity, len),
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(cursor)).await?;

        self.handle = Some(OpenHandle { reader, identity });
        self.cursor = cursor;
        self.parked = None;
        debug!(path = %self.path.display(), cursor, ?start, "opened followed file");
        Ok(())
    }

    /// Closes the handle, remembering where reading stopped in case the same
    /// file becomes available again.
    pub(crate) fn park(&mut self) {
        if let Some(open) = self.handle.take() {
            self.parked = Some(Parked {
                identity: open.identity,
                cursor: self.cursor,
            });
            debug!(path = %self.path.display(), cursor = self.cursor, "parked followed file");
        }
    }

    /// Closes the handle and forgets its position. Used once a rotated-away
    /// file is drained.
    pub(crate) fn release(&mut self) {
        if self.handle.take().is_some() {
            debug!(path = %self.path.display(), cursor = self.cursor, "released followed file");
        }
        self.parked = None;
        self.cursor = 0;
    }

    /// Reads the next complete line from the cursor.
    ///
    /// Returns `None` at end of file, or when only a partial line is
    /// available. Partial bytes are left unconsumed so they are read again,
    /// whole, once the writer finishes the line.
    pub(crate) async fn next_line(&mut self) -> io::Result<Option<String>> {
        let Some(open) = self.handle.as_mut() else {
            return Ok(None);
        };

        let mut buf = Vec::new();
        let read = open.reader.read_until(LINE_DELIMITER, &mut buf).await?;
        if read == 0 {
            return Ok(None);
        }

        if !is_complete_line(&buf) {
            open.reader.seek(SeekFrom::Start(self.cursor)).await?;
            return Ok(None);
        }

        self.cursor += read as u64;
        Ok(Some(decode_line(buf)))
    }

    /// Reads every complete line currently available.
    pub(crate) async fn read_available(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Moves the cursor back to the start when the file shrank underneath it,
    /// which is how copy-truncate rotation looks from an open handle.
    pub(crate) async fn rewind_if_truncated(&mut self) -> io::Result<bool> {
        let Some(open) = self.handle.as_mut() else {
            return Ok(false);
        };

        let current_size = open.reader.get_ref().metadata().await?.len();
        if !detect_file_truncation(current_size, self.cursor) {
            return Ok(false);
        }

        info!(
            path = %self.path.display(),
            previous_cursor = self.cursor,
            current_size,
            "followed file was truncated, reading from start"
        );
        open.reader.seek(SeekFrom::Start(0)).await?;
        self.cursor = 0;
        Ok(true)
    }
}

/// A read ending without the delimiter hit end of file mid-line.
fn is_complete_line(buf: &[u8]) -> bool {
    buf.last() == Some(&LINE_DELIMITER)
}

/// Invalid UTF-8 is replaced rather than rejected so one bad byte cannot
/// stall the cursor forever.
fn decode_line(buf: Vec<u8>) -> String {
    String::from_utf8(buf).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Detect if the file was truncated by comparing current size with the cursor
fn detect_file_truncation(current_size: u64, cursor: u64) -> bool {
    current_size < cursor
}

/// Picks the start offset for a reopen at the beginning of a file.
fn resume_position(parked: Option<Parked>, identity: FileIdentity, len: u64) -> u64 {
    match parked {
        Some(parked) if parked.identity == identity && parked.cursor <= len => parked.cursor,
        _ => 0,
    }
}
