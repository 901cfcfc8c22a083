//! The polling loop that drives a [`FollowSet`] and hands lines to a [`Consumer`].

use crate::config::FollowConfig;
use crate::consumer::Consumer;
use crate::error::Result;
use crate::follow_set::{FollowSet, RotationOutcome};
use futures::FutureExt;
use std::future::{self, Future};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// One follow session: the followed paths, the schedule, and the consumer.
///
/// Paths are processed one after another on the calling task. Within a
/// path, lines reach the consumer in file order across rotations, provided
/// a rotated file is not itself rotated away again before the next poll.
/// Its unread tail is lost in that case.
pub struct FollowLoop {
    set: FollowSet,
    config: FollowConfig,
    consumer: Consumer,
}

impl FollowLoop {
    /// Creates a loop writing lines to standard output.
    pub fn new(config: FollowConfig) -> Self {
        Self {
            set: FollowSet::new(),
            config,
            consumer: Consumer::default(),
        }
    }

    pub fn with_consumer(mut self, consumer: Consumer) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn set_consumer(&mut self, consumer: Consumer) {
        self.consumer = consumer;
    }

    /// Validates and adds a path. See [`FollowSet::register`].
    pub async fn register<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.set.register(path).await
    }

    pub fn follow_set(&self) -> &FollowSet {
        &self.set
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    /// Opens every path that has no handle yet and returns how many are open.
    ///
    /// Following starts at each file's end as of this call, so calling it
    /// before handing the loop off means no line appended afterwards is missed.
    pub async fn open_pending(&mut self) -> usize {
        let paths: Vec<PathBuf> = self.set.paths().map(Path::to_path_buf).collect();

        let mut open = 0;
        for path in &paths {
            if self.set.ensure_open(path).await {
                open += 1;
            }
        }
        open
    }

    /// Follows until the configured duration or iteration limit is reached,
    /// or forever when neither is set.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(future::pending::<()>()).await
    }

    /// Like [`FollowLoop::run`], but also stops once `shutdown` completes.
    ///
    /// `shutdown` is checked before each iteration and while sleeping between
    /// iterations. An iteration in progress, and any consumer call in it,
    /// always runs to completion.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        tokio::pin!(shutdown);

        let started = Instant::now();
        let mut iterations: u64 = 0;
        debug!(
            paths = self.set.len(),
            poll_interval = ?self.config.poll_interval,
            rotation_tracking = self.config.rotation_tracking,
            "follow loop started"
        );

        loop {
            if self.limit_reached(started, iterations) {
                break;
            }
            if shutdown.as_mut().now_or_never().is_some() {
                debug!(iterations, "follow loop cancelled");
                break;
            }

            let iteration_started = Instant::now();
            self.poll_once().await?;
            iterations += 1;

            if self.limit_reached(started, iterations) {
                break;
            }

            let Some(pause) = self.pause_after(iteration_started.elapsed(), started) else {
                continue;
            };
            tokio::select! {
                _ = shutdown.as_mut() => {
                    debug!(iterations, "follow loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        debug!(iterations, elapsed = ?started.elapsed(), "follow loop finished");
        Ok(())
    }

    /// Runs a single iteration without sleeping.
    ///
    /// Each path is opened if needed, its complete lines are delivered, and,
    /// with rotation tracking on, a replaced file is drained and swapped for
    /// the new one. Only a failed delivery is returned as an error.
    pub async fn poll_once(&mut self) -> Result<()> {
        let paths: Vec<PathBuf> = self.set.paths().map(Path::to_path_buf).collect();

        for path in &paths {
            if !self.set.ensure_open(path).await {
                continue;
            }

            let mut delivered = self.deliver_available(path).await?;

            if self.config.rotation_tracking && self.set.is_open(path) {
                let outcome = self.set.check_rotation(path).await;
                if outcome != RotationOutcome::Unchanged {
                    for line in self.set.handle_rotation(path, outcome).await {
                        self.consumer.deliver(&line, path)?;
                        delivered += 1;
                    }
                    delivered += self.deliver_available(path).await?;
                }
            }

            trace!(path = %path.display(), delivered, "polled followed file");
        }

        Ok(())
    }

    async fn deliver_available(&mut self, path: &Path) -> Result<usize> {
        self.set.begin_drain(path).await;

        let mut delivered = 0;
        while let Some(line) = self.set.next_line(path).await {
            self.consumer.deliver(&line, path)?;
            delivered += 1;
        }
        Ok(delivered)
    }

    fn limit_reached(&self, started: Instant, iterations: u64) -> bool {
        let iterations_done = self
            .config
            .max_iterations
            .is_some_and(|max| iterations >= max);
        let time_up = self
            .config
            .max_duration
            .is_some_and(|max| started.elapsed() >= max);
        iterations_done || time_up
    }

    /// Time left in the current interval, capped by the remaining run time.
    /// `None` when the iteration overran the interval.
    fn pause_after(&self, iteration_elapsed: Duration, started: Instant) -> Option<Duration> {
        let pause = self.config.poll_interval.checked_sub(iteration_elapsed)?;
        let pause = match self.config.max_duration {
            Some(max) => pause.min(max.saturating_sub(started.elapsed())),
            None => pause,
        };
        Some(pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_helpers::TempLogFile;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    type Delivered = Arc<Mutex<Vec<(String, PathBuf)>>>;

    fn recording_consumer() -> (Consumer, Delivered) {
        let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        let consumer = Consumer::line_and_source(move |line, path| {
            sink.lock().unwrap().push((line.to_string(), path.to_path_buf()));
            Ok(())
        });
        (consumer, delivered)
    }

    fn lines(delivered: &Delivered) -> Vec<String> {
        delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(line, _)| line.clone())
            .collect()
    }

    async fn follow_loop(temp_file: &TempLogFile, config: FollowConfig) -> (FollowLoop, Delivered) {
        let (consumer, delivered) = recording_consumer();
        let mut follow = FollowLoop::new(config).with_consumer(consumer);
        follow.register(temp_file.path()).await.unwrap();
        follow.poll_once().await.unwrap();
        (follow, delivered)
    }

    #[tokio::test]
    async fn test_poll_once_delivers_with_source() {
        let a = TempLogFile::named("a.log").unwrap();
        let b = TempLogFile::named("b.log").unwrap();
        let (consumer, delivered) = recording_consumer();
        let mut follow = FollowLoop::new(FollowConfig::default()).with_consumer(consumer);
        follow.register(a.path()).await.unwrap();
        follow.register(b.path()).await.unwrap();
        follow.poll_once().await.unwrap();

        a.append_content("hello").unwrap();
        follow.poll_once().await.unwrap();

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![("hello\n".to_string(), a.path().to_path_buf())]
        );
    }

    #[tokio::test]
    async fn test_existing_content_is_not_delivered() {
        let temp_file = TempLogFile::with_content("history").unwrap();
        let (mut follow, delivered) = follow_loop(&temp_file, FollowConfig::default()).await;

        follow.poll_once().await.unwrap();
        assert!(lines(&delivered).is_empty());
    }

    #[tokio::test]
    async fn test_appends_delivered_exactly_once_in_order() {
        let temp_file = TempLogFile::new().unwrap();
        let (mut follow, delivered) = follow_loop(&temp_file, FollowConfig::default()).await;

        let mut appended = String::new();
        for batch in 0..5 {
            for i in 0..10 {
                let line = format!("batch {batch} line {i}\n");
                temp_file.append_raw(&line).unwrap();
                appended.push_str(&line);
            }
            follow.poll_once().await.unwrap();
            follow.poll_once().await.unwrap();
        }

        assert_eq!(lines(&delivered).concat(), appended);
    }

    #[tokio::test]
    async fn test_partial_line_delivered_once_complete() {
        let temp_file = TempLogFile::new().unwrap();
        let (mut follow, delivered) = follow_loop(&temp_file, FollowConfig::default()).await;

        temp_file.append_raw("partial").unwrap();
        follow.poll_once().await.unwrap();
        assert!(lines(&delivered).is_empty());

        temp_file.append_raw("-done\n").unwrap();
        follow.poll_once().await.unwrap();
        assert_eq!(lines(&delivered), vec!["partial-done\n"]);
    }

    #[tokio::test]
    async fn test_rotation_delivers_old_lines_before_new() {
        let temp_file = TempLogFile::new().unwrap();
        let config = FollowConfig::default().with_rotation_tracking(true);
        let (mut follow, delivered) = follow_loop(&temp_file, config).await;

        temp_file.append_content("old 1").unwrap();
        temp_file.append_content("old 2").unwrap();
        temp_file.rotate().unwrap();
        temp_file.append_content("new").unwrap();

        follow.poll_once().await.unwrap();
        assert_eq!(lines(&delivered), vec!["old 1\n", "old 2\n", "new\n"]);

        temp_file.append_content("newer").unwrap();
        follow.poll_once().await.unwrap();
        assert_eq!(lines(&delivered).last().unwrap(), "newer\n");
        assert_eq!(lines(&delivered).len(), 4);
    }

    #[tokio::test]
    async fn test_without_rotation_tracking_old_handle_is_kept() {
        let temp_file = TempLogFile::new().unwrap();
        let (mut follow, delivered) = follow_loop(&temp_file, FollowConfig::default()).await;

        let rotated = temp_file.rotate().unwrap();
        temp_file.append_content("to new file").unwrap();
        follow.poll_once().await.unwrap();
        assert!(lines(&delivered).is_empty());

        std::fs::write(&rotated, "to old file\n").unwrap();
        follow.poll_once().await.unwrap();
        assert_eq!(lines(&delivered), vec!["to old file\n"]);
    }

    #[tokio::test]
    async fn test_vanish_and_reappear() {
        let temp_file = TempLogFile::new().unwrap();
        let config = FollowConfig::default().with_rotation_tracking(true);
        let (mut follow, delivered) = follow_loop(&temp_file, config).await;

        temp_file.remove().unwrap();
        follow.poll_once().await.unwrap();
        follow.poll_once().await.unwrap();
        assert!(!follow.follow_set().is_open(temp_file.path()));
        assert!(lines(&delivered).is_empty());

        temp_file.recreate_with("reborn\n").unwrap();
        follow.poll_once().await.unwrap();
        assert_eq!(lines(&delivered), vec!["reborn\n"]);
    }

    #[tokio::test]
    async fn test_renamed_away_and_back_is_not_redelivered() {
        let temp_file = TempLogFile::new().unwrap();
        let aside = temp_file.dir().join("aside.log");
        let config = FollowConfig::default().with_rotation_tracking(true);
        let (mut follow, delivered) = follow_loop(&temp_file, config).await;

        temp_file.append_content("one").unwrap();
        temp_file.append_content("two").unwrap();
        follow.poll_once().await.unwrap();

        std::fs::rename(temp_file.path(), &aside).unwrap();
        follow.poll_once().await.unwrap();
        assert!(!follow.follow_set().is_open(temp_file.path()));

        std::fs::rename(&aside, temp_file.path()).unwrap();
        temp_file.append_content("three").unwrap();
        follow.poll_once().await.unwrap();

        assert_eq!(lines(&delivered), vec!["one\n", "two\n", "three\n"]);
    }

    #[tokio::test]
    async fn test_missing_at_start_then_created_is_read_from_beginning() {
        let temp_file = TempLogFile::new().unwrap();
        let (consumer, delivered) = recording_consumer();
        let mut follow = FollowLoop::new(FollowConfig::default()).with_consumer(consumer);
        follow.register(temp_file.path()).await.unwrap();

        temp_file.remove().unwrap();
        follow.poll_once().await.unwrap();
        assert!(!follow.follow_set().is_open(temp_file.path()));

        temp_file.recreate_with("reborn\n").unwrap();
        follow.poll_once().await.unwrap();
        assert_eq!(lines(&delivered), vec!["reborn\n"]);
    }

    #[tokio::test]
    async fn test_consumer_failure_stops_loop() {
        let temp_file = TempLogFile::new().unwrap();
        let config = FollowConfig::default().with_poll_interval(Duration::from_millis(10));
        let mut follow = FollowLoop::new(config)
            .with_consumer(Consumer::line(|line| Err(format!("cannot take {}", line.trim_end()).into())));
        follow.register(temp_file.path()).await.unwrap();
        follow.poll_once().await.unwrap();

        temp_file.append_content("boom").unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), follow.run()).await;

        match result {
            Ok(Err(Error::Consumer(inner))) => assert_eq!(inner.to_string(), "cannot take boom"),
            other => panic!("Expected consumer failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_stops_after_max_iterations() {
        let temp_file = TempLogFile::new().unwrap();
        let config = FollowConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_max_iterations(3);
        let (mut follow, _delivered) = follow_loop(&temp_file, config).await;

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(5), follow.run()).await;

        assert!(matches!(result, Ok(Ok(()))));
        // Two sleeps separate three iterations; none follows the last
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_run_stops_after_max_duration() {
        let temp_file = TempLogFile::new().unwrap();
        let config = FollowConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_max_duration(Duration::from_millis(100));
        let (mut follow, _delivered) = follow_loop(&temp_file, config).await;

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(5), follow.run()).await;

        assert!(matches!(result, Ok(Ok(()))));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_iterations_never_polls() {
        let temp_file = TempLogFile::new().unwrap();
        let (consumer, delivered) = recording_consumer();
        let mut follow = FollowLoop::new(FollowConfig::default().with_max_iterations(0))
            .with_consumer(consumer);
        follow.register(temp_file.path()).await.unwrap();

        follow.run().await.unwrap();
        assert!(!follow.follow_set().is_open(temp_file.path()));
        assert!(lines(&delivered).is_empty());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let temp_file = TempLogFile::new().unwrap();
        let config = FollowConfig::default().with_poll_interval(Duration::from_millis(10));
        let (mut follow, delivered) = follow_loop(&temp_file, config).await;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let writer_path = temp_file.path().to_path_buf();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            std::fs::write(&writer_path, "while running\n").unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = shutdown_tx.send(());
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            follow.run_until(async {
                let _ = shutdown_rx.await;
            }),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        writer.await.unwrap();
        assert_eq!(lines(&delivered), vec!["while running\n"]);
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let mut follow = FollowLoop::new(FollowConfig::default().with_poll_interval(Duration::ZERO));
        assert!(matches!(follow.run().await, Err(Error::InvalidConfig { .. })));
    }
}
