//! Result, snapshot and insight DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::analytics::{NetworkSummary, PerformanceSummary, SecuritySummary};
use crate::domain::ScanRecord;

/// Aggregated statistics for one probe kind.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum SummaryDto {
    /// Performance statistics.
    Performance(PerformanceSummary),
    /// Network statistics.
    Network(NetworkSummary),
    /// Security statistics.
    Security(SecuritySummary),
}

/// Response body for `GET /results/{kind}?window=now`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LatestResultResponse {
    /// Normalized URL.
    pub url: String,
    /// Probe kind.
    pub kind: String,
    /// Always `now`.
    pub window: String,
    /// Most recent record, successful or not.
    #[schema(value_type = Object)]
    pub record: ScanRecord,
}

/// Response body for `GET /results/{kind}` with a range window.
#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    /// Normalized URL.
    pub url: String,
    /// Probe kind.
    pub kind: String,
    /// Requested window.
    pub window: String,
    /// Lower bound of the window.
    pub since: DateTime<Utc>,
    /// Records in the window, including failures.
    pub records: usize,
    /// Statistics over the successful records.
    pub summary: SummaryDto,
}

/// Response body for `GET /snapshots/{kind}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotSeriesResponse {
    /// Normalized URL.
    pub url: String,
    /// Probe kind.
    pub kind: String,
    /// Requested window.
    pub window: String,
    /// Number of records.
    pub count: usize,
    /// Records, oldest first.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<ScanRecord>,
}
