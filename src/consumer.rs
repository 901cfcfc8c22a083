//! Callbacks that receive followed lines.

use crate::error::{BoxError, Error, Result};
use std::io::Write;
use std::path::Path;

type LineFn = dyn FnMut(&str) -> std::result::Result<(), BoxError> + Send;
type SourcedLineFn = dyn FnMut(&str, &Path) -> std::result::Result<(), BoxError> + Send;

/// Receives each delivered line, with its trailing newline.
///
/// Calls are synchronous: the loop waits for each one to return before
/// reading further, so a slow consumer slows ingestion. An error returned by
/// the callback stops the loop.
#[derive(Default)]
pub enum Consumer {
    /// Writes each line to standard output.
    #[default]
    Stdout,
    /// Receives only the line.
    Line(Box<LineFn>),
    /// Receives the line and the path it was read from.
    LineAndSource(Box<SourcedLineFn>),
}

impl Consumer {
    pub fn line<F>(callback: F) -> Self
    where
        F: FnMut(&str) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        Consumer::Line(Box::new(callback))
    }

    pub fn line_and_source<F>(callback: F) -> Self
    where
        F: FnMut(&str, &Path) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        Consumer::LineAndSource(Box::new(callback))
    }

    pub(crate) fn deliver(&mut self, line: &str, source: &Path) -> Result<()> {
        match self {
            Consumer::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(line.as_bytes())?;
                stdout.flush()?;
                Ok(())
            }
            Consumer::Line(callback) => callback(line).map_err(Error::Consumer),
            Consumer::LineAndSource(callback) => callback(line, source).map_err(Error::Consumer),
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = match self {
            Consumer::Stdout => "Stdout",
            Consumer::Line(_) => "Line",
            Consumer::LineAndSource(_) => "LineAndSource",
        };
        f.debug_tuple("Consumer").field(&shape).finish()
    }
}
