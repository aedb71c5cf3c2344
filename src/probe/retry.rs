//! Bounded retry and polling loops.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::ProbeError;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed,
    /// Delay doubles after each failed attempt.
    Exponential,
}

/// How often and how patiently to retry a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub delay: Duration,
    /// Delay growth.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }

    /// Longest time [`retry`] can take when every attempt runs into
    /// `attempt_timeout`: all attempts plus the delays between them.
    #[must_use]
    pub fn worst_case(&self, attempt_timeout: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        (1..attempts).fold(attempt_timeout.saturating_mul(attempts), |total, attempt| {
            total.saturating_add(self.delay_after(attempt))
        })
    }
}

/// Runs `op` until it succeeds, fails permanently, or the attempts run
/// out. Only [`ProbeError::is_transient`] errors are retried.
///
/// # Errors
///
/// Returns the last error observed.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    what,
                    attempt,
                    max_attempts,
                    ?delay,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// Not finished; poll again.
    Pending,
    /// Finished with a value.
    Done(T),
}

/// Polls every `interval` until `poll` reports [`PollStatus::Done`] or
/// `ceiling` elapses.
///
/// # Errors
///
/// Returns [`ProbeError::Timeout`] when the ceiling is reached, or the
/// first error returned by `poll`.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    ceiling: Duration,
    mut poll: F,
) -> Result<T, ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, ProbeError>>,
{
    let deadline = Instant::now() + ceiling;
    loop {
        if let PollStatus::Done(value) = poll().await? {
            return Ok(value);
        }
        if Instant::now() + interval > deadline {
            return Err(ProbeError::Timeout(ceiling));
        }
        tokio::time::sleep(interval).await;
    }
}
