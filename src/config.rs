//! Follow loop configuration.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings fixed for the lifetime of a follow session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowConfig {
    /// Time between the starts of two iterations.
    pub poll_interval: Duration,
    /// Stop once this much time has passed since the loop started.
    pub max_duration: Option<Duration>,
    /// Stop after this many iterations.
    pub max_iterations: Option<u64>,
    /// Reopen a path when the file it names is replaced (follow by name).
    /// When off, a handle keeps reading the file it first opened.
    pub rotation_tracking: bool,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_duration: None,
            max_iterations: None,
            rotation_tracking: false,
        }
    }
}

impl FollowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the poll interval from fractional seconds.
    pub fn with_poll_interval_secs(self, secs: f64) -> Result<Self> {
        let poll_interval = positive_secs("poll interval", secs)?;
        Ok(self.with_poll_interval(poll_interval))
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Sets the maximum run time from fractional seconds.
    pub fn with_max_duration_secs(self, secs: f64) -> Result<Self> {
        let max_duration = positive_secs("max duration", secs)?;
        Ok(self.with_max_duration(max_duration))
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_rotation_tracking(mut self, enabled: bool) -> Self {
        self.rotation_tracking = enabled;
        self
    }

    /// Rejects settings the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(invalid("poll interval must be positive"));
        }
        if self.max_duration.is_some_and(|duration| duration.is_zero()) {
            return Err(invalid("max duration must be positive"));
        }
        Ok(())
    }
}

fn positive_secs(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(format!("{name} must be a positive number of seconds, got {secs}")));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|err| invalid(format!("{name} of {secs} seconds is out of range: {err}")))
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        message: message.into(),
    }
}
