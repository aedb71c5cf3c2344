//! Service error types with HTTP status code mapping.
//!
//! [`SitewatchError`] is the central error type for the request path and
//! the stores. Each variant maps to a specific HTTP status code and a
//! structured JSON error response. Probe failures use the separate
//! [`crate::probe::ProbeError`], which never reaches a client directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1002,
///     "message": "invalid time window: 2d",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`SitewatchError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                |
/// |-----------|-----------------|----------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request            |
/// | 2000–2999 | Not Found       | 404 Not Found              |
/// | 3000–3999 | Server          | 500 / 502                  |
#[derive(Debug, thiserror::Error)]
pub enum SitewatchError {
    /// The submitted URL is not an absolute `http`/`https` URL with a host.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The raw input as received.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Time window token outside `now`, `1h`, `24h`, `1w`, `1m`.
    #[error("invalid time window: {0}")]
    InvalidTimeWindow(String),

    /// Probe kind outside `performance`, `network`, `security`.
    #[error("invalid probe kind: {0}")]
    InvalidProbeKind(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The URL is not tracked.
    #[error("url not tracked: {0}")]
    UrlNotTracked(String),

    /// No snapshots exist for the URL in the requested window.
    #[error("no {kind} snapshots for {url}")]
    NoSnapshots {
        /// Normalized URL.
        url: String,
        /// Probe kind name.
        kind: String,
    },

    /// Durable store failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The text-generation service could not be reached or failed.
    #[error("text generation error: {0}")]
    TextGeneration(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SitewatchError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidUrl { .. } => 1001,
            Self::InvalidTimeWindow(_) => 1002,
            Self::InvalidProbeKind(_) => 1003,
            Self::InvalidRequest(_) => 1004,
            Self::UrlNotTracked(_) => 2001,
            Self::NoSnapshots { .. } => 2002,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::TextGeneration(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidUrl { .. }
            | Self::InvalidTimeWindow(_)
            | Self::InvalidProbeKind(_)
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UrlNotTracked(_) | Self::NoSnapshots { .. } => StatusCode::NOT_FOUND,
            Self::TextGeneration(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for SitewatchError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl IntoResponse for SitewatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_request() {
        let err = SitewatchError::InvalidTimeWindow("2d".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), 1002);

        let err = SitewatchError::InvalidUrl {
            url: "ftp://x".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_data_is_not_found() {
        let err = SitewatchError::NoSnapshots {
            url: "https://example.com/".to_string(),
            kind: "network".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "no network snapshots for https://example.com/");
    }

    #[test]
    fn upstream_model_failure_is_bad_gateway() {
        let err = SitewatchError::TextGeneration("timeout".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
