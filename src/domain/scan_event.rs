//! Domain events reflecting queue and scan progress.
//!
//! The scheduler emits a [`ScanEvent`] through the [`super::EventBus`] at
//! every state transition of a scan cycle. Events are broadcast to
//! WebSocket subscribers so a dashboard can follow scans live.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Lane, ProbeKind, TrackedUrl};

/// Domain event emitted by the queue and the collection scheduler.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// A new URL entered the immediate lane.
    UrlSubmitted {
        /// Submitted URL.
        url: TrackedUrl,
        /// Submission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A URL stopped being tracked.
    UrlRemoved {
        /// Removed URL.
        url: TrackedUrl,
        /// Removal timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A URL was dequeued and its probes are about to run.
    ScanStarted {
        /// Scanned URL.
        url: TrackedUrl,
        /// Lane the URL was taken from.
        lane: Lane,
        /// Start timestamp.
        timestamp: DateTime<Utc>,
    },

    /// One probe finished for a URL.
    ProbeFinished {
        /// Scanned URL.
        url: TrackedUrl,
        /// Probe that finished.
        probe: ProbeKind,
        /// Whether the probe produced a payload.
        success: bool,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// All probes finished for a URL and it was requeued.
    ScanCompleted {
        /// Scanned URL.
        url: TrackedUrl,
        /// Number of probes that succeeded.
        succeeded: usize,
        /// Number of probes that failed.
        failed: usize,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A drain ran out of work and released the worker.
    DrainFinished {
        /// URLs scanned during the drain.
        scanned: usize,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// Returns the URL associated with this event, if any.
    #[must_use]
    pub fn url(&self) -> Option<&TrackedUrl> {
        match self {
            Self::UrlSubmitted { url, .. }
            | Self::UrlRemoved { url, .. }
            | Self::ScanStarted { url, .. }
            | Self::ProbeFinished { url, .. }
            | Self::ScanCompleted { url, .. } => Some(url),
            Self::DrainFinished { .. } => None,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::UrlSubmitted { .. } => "url_submitted",
            Self::UrlRemoved { .. } => "url_removed",
            Self::ScanStarted { .. } => "scan_started",
            Self::ProbeFinished { .. } => "probe_finished",
            Self::ScanCompleted { .. } => "scan_completed",
            Self::DrainFinished { .. } => "drain_finished",
        }
    }
}
