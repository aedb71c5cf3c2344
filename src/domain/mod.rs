//! Domain layer: URL identity, the dedup queue, scan results and events.
//!
//! This module contains the server-side domain model: normalized tracked
//! URLs, the two-lane queue that orders scans, the typed probe payloads
//! and snapshot records, query time windows, and the event bus that
//! broadcasts scan progress.

pub mod dedup_queue;
pub mod event_bus;
pub mod report;
pub mod scan_event;
pub mod scan_record;
pub mod time_window;
pub mod tracked_url;

pub use dedup_queue::{
    DedupQueue, Lane, QueueEntry, QueueStatus, SubmitOutcome, TrackedEntry, UrlState,
};
pub use event_bus::EventBus;
pub use report::{
    CertificateInfo, FormFactor, NetworkReport, Opportunity, PerformanceAudit, PerformanceReport,
    PingStats, ProbeKind, ProbePayload, RiskLevel, SecurityAlert, SecurityReport, TraceHop, WebVitals,
};
pub use scan_event::ScanEvent;
pub use scan_record::{ScanOutcome, ScanRecord};
pub use time_window::TimeWindow;
pub use tracked_url::TrackedUrl;
