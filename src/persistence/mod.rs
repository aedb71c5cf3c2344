//! Persistence layer: durable queue state and snapshot series.
//!
//! Two seams are defined here. [`QueueStore`] holds the tracked-URL set in
//! continuous-lane order and is what the dedup queue mirrors.
//! [`SnapshotStore`] is the append-only time series of scan records, one
//! collection per probe kind.
//!
//! [`postgres::PostgresPersistence`] implements both on top of
//! `sqlx::PgPool`; [`memory::MemoryStore`] implements both in process for
//! development runs with persistence disabled and for tests.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ProbeKind, ScanRecord, TrackedUrl};
use crate::error::SitewatchError;

pub use memory::MemoryStore;
pub use models::TrackedUrlRecord;
pub use postgres::PostgresPersistence;

/// Durable backing set of the dedup queue.
///
/// Each URL is stored at most once together with a position; loading
/// returns URLs in ascending position, which is the continuous-lane order.
#[async_trait]
pub trait QueueStore: Send + Sync + fmt::Debug {
    /// Inserts a URL at the tail. Returns `false` if it was already stored.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] on store failure.
    async fn insert_tracked(
        &self,
        url: &TrackedUrl,
        added_at: DateTime<Utc>,
    ) -> Result<bool, SitewatchError>;

    /// Moves a URL to the tail of the persisted order.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] on store failure.
    async fn move_to_tail(&self, url: &TrackedUrl) -> Result<(), SitewatchError>;

    /// Deletes a URL. Returns `false` if it was not stored.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] on store failure.
    async fn delete_tracked(&self, url: &TrackedUrl) -> Result<bool, SitewatchError>;

    /// Loads every stored URL in persisted order.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] on store failure.
    async fn load_tracked(&self) -> Result<Vec<TrackedUrlRecord>, SitewatchError>;
}

/// Append-only snapshot series keyed by URL and probe kind.
#[async_trait]
pub trait SnapshotStore: Send + Sync + fmt::Debug {
    /// Appends a record. Returns the row identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] on store failure.
    async fn append(&self, record: &ScanRecord) -> Result<i64, SitewatchError>;

    /// Returns the most recent record for a URL and kind.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] on store failure.
    async fn latest(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
    ) -> Result<Option<ScanRecord>, SitewatchError>;

    /// Returns records collected at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] on store failure.
    async fn range(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>, SitewatchError>;

    /// Returns up to `limit` most recent records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] on store failure.
    async fn recent(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
        limit: usize,
    ) -> Result<Vec<ScanRecord>, SitewatchError>;
}
