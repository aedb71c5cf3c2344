//! Immutable snapshot rows written by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    NetworkReport, PerformanceAudit, ProbeKind, ProbePayload, SecurityReport, TrackedUrl,
};

/// Terminal outcome of one probe run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The probe produced a payload.
    Success {
        /// Typed probe result.
        payload: ProbePayload,
    },
    /// The probe exhausted its retries or could not run.
    Failure {
        /// Human-readable failure description.
        reason: String,
    },
}

impl ScanOutcome {
    /// Returns `true` for [`ScanOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the status label stored alongside the row.
    #[must_use]
    pub const fn status_str(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
        }
    }
}

/// One timestamped result for a URL from one probe.
///
/// Rows are append-only: a new scan always produces a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Scanned URL.
    pub url: TrackedUrl,
    /// Probe that produced the record.
    pub kind: ProbeKind,
    /// Completion time of the probe run.
    pub collected_at: DateTime<Utc>,
    /// Success payload or failure reason.
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

impl ScanRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(url: TrackedUrl, kind: ProbeKind, outcome: ScanOutcome) -> Self {
        Self {
            url,
            kind,
            collected_at: Utc::now(),
            outcome,
        }
    }

    /// Returns the payload of a successful record.
    #[must_use]
    pub const fn payload(&self) -> Option<&ProbePayload> {
        match &self.outcome {
            ScanOutcome::Success { payload } => Some(payload),
            ScanOutcome::Failure { .. } => None,
        }
    }

    /// Returns the performance audits, if this is a successful
    /// performance record.
    #[must_use]
    pub const fn performance(&self) -> Option<&PerformanceAudit> {
        match self.payload() {
            Some(ProbePayload::Performance(report)) => Some(report),
            _ => None,
        }
    }

    /// Returns the network payload, if any.
    #[must_use]
    pub const fn network(&self) -> Option<&NetworkReport> {
        match self.payload() {
            Some(ProbePayload::Network(report)) => Some(report),
            _ => None,
        }
    }

    /// Returns the security payload, if any.
    #[must_use]
    pub const fn security(&self) -> Option<&SecurityReport> {
        match self.payload() {
            Some(ProbePayload::Security(report)) => Some(report),
            _ => None,
        }
    }
}
