//! Tracked URL DTOs for submit, list and remove.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{SubmitOutcome, TrackedEntry, UrlState};
use crate::error::SitewatchError;

/// Request body for `POST /urls`.
///
/// Accepts either a batch (`urls`) or a single `url`; both may be given.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitUrlsRequest {
    /// URLs to track.
    #[serde(default)]
    pub urls: Vec<String>,
    /// A single URL to track.
    #[serde(default)]
    pub url: Option<String>,
}

impl SubmitUrlsRequest {
    /// Flattens the request into one list of raw items.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::InvalidRequest`] if no URL was given.
    pub fn into_items(self) -> Result<Vec<String>, SitewatchError> {
        let mut items = self.urls;
        items.extend(self.url);
        if items.is_empty() {
            return Err(SitewatchError::InvalidRequest(
                "expected `url` or a non-empty `urls` list".into(),
            ));
        }
        Ok(items)
    }
}

/// Per-item outcome of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    /// Entered the immediate lane.
    Queued,
    /// Already tracked; unchanged.
    AlreadyTracked,
    /// Rejected by validation.
    Invalid,
}

impl From<SubmitOutcome> for SubmitStatus {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Queued => Self::Queued,
            SubmitOutcome::AlreadyTracked => Self::AlreadyTracked,
        }
    }
}

/// One item of a submission response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitItemResult {
    /// Normalized URL, or the raw input when invalid.
    pub url: String,
    /// Outcome.
    pub status: SubmitStatus,
    /// Validation message for invalid items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body for `POST /urls`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitUrlsResponse {
    /// Outcomes in request order.
    pub results: Vec<SubmitItemResult>,
    /// Number of items that were queued.
    pub queued: usize,
}

/// A tracked URL in list responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackedUrlDto {
    /// Normalized URL.
    pub url: String,
    /// First submission time.
    pub added_at: DateTime<Utc>,
    /// `immediate`, `continuous` or `in_flight`.
    pub state: String,
}

impl From<TrackedEntry> for TrackedUrlDto {
    fn from(entry: TrackedEntry) -> Self {
        let state = match entry.state {
            UrlState::Immediate => "immediate",
            UrlState::Continuous => "continuous",
            UrlState::InFlight => "in_flight",
        };
        Self {
            url: entry.url.to_string(),
            added_at: entry.added_at,
            state: state.to_string(),
        }
    }
}

/// Response body for `GET /urls`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackedUrlListResponse {
    /// Tracked URLs, oldest first.
    pub data: Vec<TrackedUrlDto>,
    /// Number of tracked URLs.
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_batch_forms_combine() {
        let request = SubmitUrlsRequest {
            urls: vec!["https://a.example".into()],
            url: Some("https://b.example".into()),
        };
        assert_eq!(request.into_items().map(|v| v.len()).ok(), Some(2));
    }

    #[test]
    fn empty_submission_is_rejected() {
        let request = SubmitUrlsRequest {
            urls: Vec::new(),
            url: None,
        };
        assert!(request.into_items().is_err());
    }
}
