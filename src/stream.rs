//! Stream adapter running a follow loop in a background task.

use crate::config::FollowConfig;
use crate::consumer::Consumer;
use crate::error::{Error, Result};
use crate::follow_loop::FollowLoop;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

/// A line read from a followed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowedLine {
    /// The followed path the line was read from.
    pub path: PathBuf,
    /// The line, including its trailing newline.
    pub line: String,
}

/// A stream of lines appended to a set of followed files.
///
/// The stream ends when the configured limits are reached. A loop error is
/// yielded as the last item.
///
/// Lines are queued on an unbounded channel between the loop and the stream.
/// A reader that polls slowly does not slow down file reading; lines pile up
/// in memory until they are consumed. Callers that need backpressure should
/// drive a [`FollowLoop`] with their own [`Consumer`] instead.
pub struct FollowStream {
    receiver: mpsc::UnboundedReceiver<Result<FollowedLine>>,
    _shutdown_tx: broadcast::Sender<()>,
    _task_handle: Option<JoinHandle<()>>,
}

impl FollowStream {
    /// Registers `paths`, opens them at their current end and starts following.
    ///
    /// Fails if any path is not a followable file or `config` is invalid.
    pub async fn new<I, P>(paths: I, config: FollowConfig) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let line_tx = tx.clone();
        let consumer = Consumer::line_and_source(move |line, path| {
            line_tx
                .send(Ok(FollowedLine {
                    path: path.to_path_buf(),
                    line: line.to_string(),
                }))
                .map_err(|_| Error::StreamClosed.into())
        });

        let mut follow = FollowLoop::new(config).with_consumer(consumer);
        for path in paths {
            follow.register(path).await?;
        }
        follow.open_pending().await;

        let task_handle = tokio::spawn(follow_task(follow, tx, shutdown_rx));

        Ok(FollowStream {
            receiver: rx,
            _shutdown_tx: shutdown_tx,
            _task_handle: Some(task_handle),
        })
    }

    /// Check if the stream has been closed/dropped
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }

    #[cfg(test)]
    fn take_task_handle(&mut self) -> Option<JoinHandle<()>> {
        self._task_handle.take()
    }
}

impl Drop for FollowStream {
    fn drop(&mut self) {
        // The loop notices at its next cancellation point
        let _ = self._shutdown_tx.send(());
    }
}

/// Background task that runs the loop until its limits or a shutdown signal
async fn follow_task(
    mut follow: FollowLoop,
    tx: mpsc::UnboundedSender<Result<FollowedLine>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let shutdown = async move {
        // A closed channel means the stream is gone too
        let _ = shutdown_rx.recv().await;
    };

    match follow.run_until(shutdown).await {
        Ok(()) => debug!("follow task finished"),
        Err(Error::Consumer(_)) if tx.is_closed() => {
            debug!("follow stream dropped, follow task stopping")
        }
        Err(e) => {
            let _ = tx.send(Err(e));
        }
    }
}

impl Stream for FollowStream {
    type Item = Result<FollowedLine>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
