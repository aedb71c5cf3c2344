//! Scan trigger and queue status DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::QueueStatus;
use crate::service::TriggerOutcome;

/// Response body for `POST /scans/run`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerResponse {
    /// `started`, `already_processing` or `nothing_queued`.
    #[schema(value_type = String)]
    pub status: TriggerOutcome,
}

/// Response body for `GET /queue`.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueStatusResponse {
    /// `true` while a drain is running.
    pub draining: bool,
    /// Immediate lane, head first.
    pub immediate: Vec<String>,
    /// Continuous lane, head first.
    pub continuous: Vec<String>,
    /// URLs being scanned.
    pub in_flight: Vec<String>,
    /// Durable writes waiting to be retried.
    pub pending_writes: usize,
}

impl QueueStatusResponse {
    /// Builds the response from a queue snapshot.
    #[must_use]
    pub fn new(status: QueueStatus, draining: bool) -> Self {
        let strings = |urls: Vec<_>| urls.into_iter().map(String::from).collect();
        Self {
            draining,
            immediate: strings(status.immediate),
            continuous: strings(status.continuous),
            in_flight: strings(status.in_flight),
            pending_writes: status.pending_writes,
        }
    }
}
