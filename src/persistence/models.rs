//! Database models for tracked URLs and snapshot rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ProbeKind, ProbePayload, ScanOutcome, ScanRecord, TrackedUrl};
use crate::error::SitewatchError;

/// A row from the `tracked_urls` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUrlRecord {
    /// Normalized URL.
    pub url: TrackedUrl,
    /// First submission timestamp.
    pub added_at: DateTime<Utc>,
}

/// A raw row from one of the `*_snapshots` tables.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    /// Auto-increment row ID.
    pub id: i64,
    /// Normalized URL as stored.
    pub url: String,
    /// Probe completion timestamp.
    pub collected_at: DateTime<Utc>,
    /// `"success"` or `"failure"`.
    pub status: String,
    /// JSONB payload for successful rows.
    pub payload: Option<serde_json::Value>,
    /// Failure description for failed rows.
    pub failure_reason: Option<String>,
}

impl SnapshotRow {
    /// Converts the row into a domain record.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] if the stored URL or payload
    /// no longer deserializes.
    pub fn into_record(self, kind: ProbeKind) -> Result<ScanRecord, SitewatchError> {
        let url = TrackedUrl::parse(&self.url)
            .map_err(|e| SitewatchError::Persistence(format!("row {}: {e}", self.id)))?;

        let outcome = match (self.status.as_str(), self.payload) {
            ("success", Some(value)) => {
                let payload: ProbePayload = serde_json::from_value(value).map_err(|e| {
                    SitewatchError::Persistence(format!("row {} payload: {e}", self.id))
                })?;
                ScanOutcome::Success { payload }
            }
            _ => ScanOutcome::Failure {
                reason: self
                    .failure_reason
                    .unwrap_or_else(|| "unknown failure".to_string()),
            },
        };

        Ok(ScanRecord {
            url,
            kind,
            collected_at: self.collected_at,
            outcome,
        })
    }
}

/// Table holding the series for a probe kind.
#[must_use]
pub const fn snapshot_table(kind: ProbeKind) -> &'static str {
    match kind {
        ProbeKind::Performance => "performance_snapshots",
        ProbeKind::Network => "network_snapshots",
        ProbeKind::Security => "security_snapshots",
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::SecurityReport;

    fn row(status: &str, payload: Option<serde_json::Value>) -> SnapshotRow {
        SnapshotRow {
            id: 7,
            url: "https://example.com/".to_string(),
            collected_at: Utc::now(),
            status: status.to_string(),
            payload,
            failure_reason: Some("proxy not ready".to_string()),
        }
    }

    #[test]
    fn success_row_decodes_payload() {
        let payload = ProbePayload::Security(SecurityReport::default());
        let value = serde_json::to_value(&payload).ok();
        let Ok(record) = row("success", value).into_record(ProbeKind::Security) else {
            panic!("row should decode");
        };
        assert!(record.security().is_some());
    }

    #[test]
    fn failure_row_keeps_reason() {
        let Ok(record) = row("failure", None).into_record(ProbeKind::Security) else {
            panic!("row should decode");
        };
        assert_eq!(
            record.outcome,
            ScanOutcome::Failure {
                reason: "proxy not ready".to_string()
            }
        );
    }

    #[test]
    fn corrupt_payload_is_a_persistence_error() {
        let bad = row("success", Some(serde_json::json!({"kind": "teapot"})));
        assert!(matches!(
            bad.into_record(ProbeKind::Security),
            Err(SitewatchError::Persistence(_))
        ));
    }

    #[test]
    fn one_table_per_kind() {
        assert_eq!(snapshot_table(ProbeKind::Network), "network_snapshots");
    }
}
