//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{SnapshotRow, TrackedUrlRecord, snapshot_table};
use super::{QueueStore, SnapshotStore};
use crate::config::SitewatchConfig;
use crate::domain::{ProbeKind, ScanOutcome, ScanRecord, TrackedUrl};
use crate::error::SitewatchError;

type SnapshotTuple = (
    i64,
    String,
    DateTime<Utc>,
    String,
    Option<serde_json::Value>,
    Option<String>,
);

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the pool settings from the configuration and runs
    /// the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &SitewatchConfig) -> Result<Self, SitewatchError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| SitewatchError::Persistence(format!("migration failed: {e}")))?;

        Ok(Self::new(pool))
    }

    fn rows_to_records(
        rows: Vec<SnapshotTuple>,
        kind: ProbeKind,
    ) -> Result<Vec<ScanRecord>, SitewatchError> {
        rows.into_iter()
            .map(|(id, url, collected_at, status, payload, failure_reason)| {
                SnapshotRow {
                    id,
                    url,
                    collected_at,
                    status,
                    payload,
                    failure_reason,
                }
                .into_record(kind)
            })
            .collect()
    }
}

#[async_trait]
impl QueueStore for PostgresPersistence {
    async fn insert_tracked(
        &self,
        url: &TrackedUrl,
        added_at: DateTime<Utc>,
    ) -> Result<bool, SitewatchError> {
        let result = sqlx::query(
            "INSERT INTO tracked_urls (url, added_at) VALUES ($1, $2) ON CONFLICT (url) DO NOTHING",
        )
        .bind(url.as_str())
        .bind(added_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn move_to_tail(&self, url: &TrackedUrl) -> Result<(), SitewatchError> {
        sqlx::query(
            "UPDATE tracked_urls SET position = nextval('tracked_url_position') WHERE url = $1",
        )
        .bind(url.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_tracked(&self, url: &TrackedUrl) -> Result<bool, SitewatchError> {
        let result = sqlx::query("DELETE FROM tracked_urls WHERE url = $1")
            .bind(url.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_tracked(&self) -> Result<Vec<TrackedUrlRecord>, SitewatchError> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            "SELECT url, added_at FROM tracked_urls ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (raw, added_at) in rows {
            match TrackedUrl::parse(&raw) {
                Ok(url) => records.push(TrackedUrlRecord { url, added_at }),
                Err(e) => tracing::warn!(url = %raw, error = %e, "skipping unparsable tracked url"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl SnapshotStore for PostgresPersistence {
    async fn append(&self, record: &ScanRecord) -> Result<i64, SitewatchError> {
        let (payload, failure_reason) = match &record.outcome {
            ScanOutcome::Success { payload } => (
                Some(
                    serde_json::to_value(payload)
                        .map_err(|e| SitewatchError::Internal(e.to_string()))?,
                ),
                None,
            ),
            ScanOutcome::Failure { reason } => (None, Some(reason.as_str())),
        };

        // Table names come from a closed enum, never from input.
        let sql = format!(
            "INSERT INTO {} (url, collected_at, status, payload, failure_reason) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
            snapshot_table(record.kind)
        );

        let id = sqlx::query_scalar::<_, i64>(&sql)
            .bind(record.url.as_str())
            .bind(record.collected_at)
            .bind(record.outcome.status_str())
            .bind(payload)
            .bind(failure_reason)
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }

    async fn latest(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
    ) -> Result<Option<ScanRecord>, SitewatchError> {
        let mut records = self.recent(url, kind, 1).await?;
        Ok(records.pop())
    }

    async fn range(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>, SitewatchError> {
        let sql = format!(
            "SELECT id, url, collected_at, status, payload, failure_reason FROM {} \
             WHERE url = $1 AND collected_at >= $2 ORDER BY collected_at ASC, id ASC",
            snapshot_table(kind)
        );

        let rows = sqlx::query_as::<_, SnapshotTuple>(&sql)
            .bind(url.as_str())
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Self::rows_to_records(rows, kind)
    }

    async fn recent(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
        limit: usize,
    ) -> Result<Vec<ScanRecord>, SitewatchError> {
        let sql = format!(
            "SELECT id, url, collected_at, status, payload, failure_reason FROM {} \
             WHERE url = $1 ORDER BY collected_at DESC, id DESC LIMIT $2",
            snapshot_table(kind)
        );

        let rows = sqlx::query_as::<_, SnapshotTuple>(&sql)
            .bind(url.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Self::rows_to_records(rows, kind)
    }
}
