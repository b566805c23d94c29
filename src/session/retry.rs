//! Bounded retry for device calls that may hang.
//!
//! Each attempt runs on a blocking thread and reports back through a
//! single-use channel. The caller races that channel against a timer. When
//! the timer wins, the attempt's [`CancelFlag`] is set and its receiver is
//! dropped. The next attempt first waits, inside its own time limit, for
//! the abandoned call to return, so two calls never talk to the device at
//! once.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ExporterError;
use crate::sensor::CancelFlag;
use crate::Result;

/// Default number of retries: none, fail on the first error.
pub const DEFAULT_RETRIES: u32 = 0;

/// Default time a single device call may take.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default backoff unit; attempt `n` waits `n` units before running.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Startup retry policy: a fixed budget of timed attempts with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetry {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Time limit for one attempt.
    pub timeout: Duration,
    /// Backoff unit between attempts.
    pub backoff_unit: Duration,
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_CALL_TIMEOUT,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

impl BoundedRetry {
    pub fn new(retries: u32, timeout: Duration) -> Self {
        Self {
            retries,
            timeout,
            ..Self::default()
        }
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Total number of attempts this policy makes.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Longest time [`call`](Self::call) can take before giving up.
    pub fn worst_case(&self) -> Duration {
        let n = self.retries;
        let backoff_units = n.saturating_mul(n.saturating_add(1)) / 2;
        self.timeout.saturating_mul(self.attempts())
            + self.backoff_unit.saturating_mul(backoff_units)
    }

    /// Run a blocking call under this policy.
    ///
    /// `prepare` is invoked once per attempt with that attempt's cancel
    /// flag and must hand back an owned call; a failure to prepare counts as
    /// a failed attempt. Returns the first successful value, or the error of
    /// the last attempt.
    pub async fn call<T, F, P>(&self, what: &str, mut prepare: P) -> Result<T>
    where
        P: FnMut(&CancelFlag) -> Result<F>,
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut abandoned = None;
        let mut attempt = 0;
        loop {
            let error = match self.run_attempt(attempt, &mut prepare, &mut abandoned).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if error.is_timeout() {
                warn!("Device API response timeout during {} (attempt {})", what, attempt);
            } else {
                warn!("{} failed (attempt {}): {}", what, attempt, error);
            }

            if attempt >= self.retries {
                return Err(error);
            }

            attempt += 1;
            warn!("Retrying {} ({}/{})", what, attempt, self.retries);
            tokio::time::sleep(self.backoff_unit.saturating_mul(attempt)).await;
        }
    }

    async fn run_attempt<T, F, P>(
        &self,
        attempt: u32,
        prepare: &mut P,
        abandoned: &mut Option<JoinHandle<()>>,
    ) -> Result<T>
    where
        P: FnMut(&CancelFlag) -> Result<F>,
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;

        if let Some(previous) = abandoned.as_mut() {
            if tokio::time::timeout_at(deadline, previous).await.is_err() {
                debug!("Abandoned device call still running (attempt {})", attempt);
                return Err(ExporterError::Timeout { attempt });
            }
            *abandoned = None;
        }

        let cancel = CancelFlag::new();
        let call = prepare(&cancel)?;
        let (tx, rx) = oneshot::channel();

        let handle = tokio::task::spawn_blocking(move || {
            if tx.send(call()).is_err() {
                debug!("Discarding result of abandoned device call (attempt {})", attempt);
            }
        });

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ExporterError::Task(format!(
                "device call aborted (attempt {})",
                attempt
            ))),
            Err(_) => {
                cancel.cancel();
                *abandoned = Some(handle);
                Err(ExporterError::Timeout { attempt })
            }
        }
    }
}
