//! Probe adapters: the three external measurement tools.
//!
//! Every adapter implements [`Probe`] and returns a typed
//! [`ProbePayload`]. Adapters own their retries (see [`retry`]); the
//! scheduler only sees the terminal outcome.
//!
//! | Probe | Tool | Payload |
//! |-------|------|---------|
//! | [`LighthouseProbe`] | `lighthouse` CLI + headless Chrome | [`crate::domain::PerformanceAudit`] |
//! | [`NetworkProbe`] | `ping`, `traceroute`, `openssl` | [`crate::domain::NetworkReport`] |
//! | [`ZapProbe`] | OWASP ZAP JSON API | [`crate::domain::SecurityReport`] |

pub mod network;
pub mod performance;
pub mod process;
pub mod retry;
pub mod security;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ProbeKind, ProbePayload, TrackedUrl};

pub use network::NetworkProbe;
pub use performance::LighthouseProbe;
pub use retry::{Backoff, RetryPolicy};
pub use security::ZapProbe;

/// Errors raised by probe adapters.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The tool could not be started.
    #[error("failed to spawn {program}: {reason}")]
    Spawn {
        /// Program name.
        program: String,
        /// OS error description.
        reason: String,
    },

    /// The tool exited with a non-zero status.
    #[error("{program} exited with {status}: {stderr}")]
    NonZeroExit {
        /// Program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// An external service could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The operation exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The tool answered but the answer was unusable.
    #[error("unexpected output: {0}")]
    Parse(String),

    /// The external service rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ProbeError {
    /// Returns `true` for errors worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. } | Self::NonZeroExit { .. } | Self::Connect(_) | Self::Timeout(_)
        )
    }
}

/// One external measurement capability.
#[async_trait]
pub trait Probe: Send + Sync + fmt::Debug {
    /// The kind of record this probe produces.
    fn kind(&self) -> ProbeKind;

    /// Wall-clock budget for one [`Probe::run`], if the probe needs more
    /// than the scheduler's default.
    fn time_budget(&self) -> Option<Duration> {
        None
    }

    /// Measures `url` once, retrying transient failures internally.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`ProbeError`] once retries are exhausted or
    /// on a permanent failure.
    async fn run(&self, url: &TrackedUrl) -> Result<ProbePayload, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProbeError::Connect("refused".into()).is_transient());
        assert!(ProbeError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ProbeError::Parse("garbage".into()).is_transient());
        assert!(!ProbeError::Rejected("bad key".into()).is_transient());
    }
}
