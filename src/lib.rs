//! A log follow library that delivers every line appended to a set of files,
//! the way `tail -f` does.
//!
//! Files are polled on a fixed interval. Each poll reads the complete lines
//! appended since the last one, and can notice when a path starts referring
//! to a different file (log rotation). The rotated-away file is then read to
//! its end before the new file is read from its beginning, so no line is lost
//! or delivered twice.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_follow::{Consumer, FollowConfig, FollowLoop};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FollowConfig::default()
//!         .with_poll_interval(Duration::from_millis(500))
//!         .with_rotation_tracking(true);
//!
//!     let mut follow = FollowLoop::new(config).with_consumer(Consumer::line_and_source(
//!         |line, path| {
//!             print!("{}: {}", path.display(), line);
//!             Ok(())
//!         },
//!     ));
//!     follow.register("app.log").await?;
//!     follow.run().await?;
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod config;
mod consumer;
mod error;
mod follow_loop;
mod follow_set;
mod identity;
mod reader;
mod stream;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{DEFAULT_POLL_INTERVAL, FollowConfig};
pub use consumer::Consumer;
pub use error::{BoxError, Error, InvalidTargetKind, Result};
pub use follow_loop::FollowLoop;
pub use follow_set::{DrainedLine, FollowSet, RotationOutcome};
pub use identity::FileIdentity;
pub use stream::{FollowStream, FollowedLine};

use std::path::Path;
use tokio_stream::Stream;

/// Creates a stream of lines appended to `paths` from now on.
///
/// # Example
///
/// ```rust,no_run
/// use log_follow::{follow_paths, FollowConfig};
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut stream = follow_paths(["app.log", "db.log"], FollowConfig::default()).await?;
///
///     while let Some(followed) = stream.next().await {
///         let followed = followed?;
///         print!("{}: {}", followed.path.display(), followed.line);
///     }
///
///     Ok(())
/// }
/// ```
pub async fn follow_paths<I, P>(
    paths: I,
    config: FollowConfig,
) -> Result<impl Stream<Item = Result<FollowedLine>>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    FollowStream::new(paths, config).await
}
