//! In-process store used when persistence is disabled and in tests.
//!
//! Same semantics as the PostgreSQL store: tracked URLs keep a position
//! counter, snapshot series stay ordered by `collected_at`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::models::TrackedUrlRecord;
use super::{QueueStore, SnapshotStore};
use crate::domain::{ProbeKind, ScanRecord, TrackedUrl};
use crate::error::SitewatchError;

#[derive(Debug, Default)]
struct MemoryData {
    next_position: u64,
    tracked: HashMap<TrackedUrl, (u64, DateTime<Utc>)>,
    next_id: i64,
    series: HashMap<(TrackedUrl, ProbeKind), Vec<(i64, ScanRecord)>>,
}

/// Volatile implementation of [`QueueStore`] and [`SnapshotStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored for a URL and kind.
    pub async fn snapshot_count(&self, url: &TrackedUrl, kind: ProbeKind) -> usize {
        self.data
            .read()
            .await
            .series
            .get(&(url.clone(), kind))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert_tracked(
        &self,
        url: &TrackedUrl,
        added_at: DateTime<Utc>,
    ) -> Result<bool, SitewatchError> {
        let mut data = self.data.write().await;
        if data.tracked.contains_key(url) {
            return Ok(false);
        }
        data.next_position += 1;
        let position = data.next_position;
        data.tracked.insert(url.clone(), (position, added_at));
        Ok(true)
    }

    async fn move_to_tail(&self, url: &TrackedUrl) -> Result<(), SitewatchError> {
        let mut data = self.data.write().await;
        data.next_position += 1;
        let position = data.next_position;
        if let Some(entry) = data.tracked.get_mut(url) {
            entry.0 = position;
        }
        Ok(())
    }

    async fn delete_tracked(&self, url: &TrackedUrl) -> Result<bool, SitewatchError> {
        Ok(self.data.write().await.tracked.remove(url).is_some())
    }

    async fn load_tracked(&self) -> Result<Vec<TrackedUrlRecord>, SitewatchError> {
        let data = self.data.read().await;
        let mut rows: Vec<_> = data
            .tracked
            .iter()
            .map(|(url, (position, added_at))| (*position, url.clone(), *added_at))
            .collect();
        rows.sort_by_key(|(position, _, _)| *position);
        Ok(rows
            .into_iter()
            .map(|(_, url, added_at)| TrackedUrlRecord { url, added_at })
            .collect())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn append(&self, record: &ScanRecord) -> Result<i64, SitewatchError> {
        let mut data = self.data.write().await;
        data.next_id += 1;
        let id = data.next_id;
        let series = data
            .series
            .entry((record.url.clone(), record.kind))
            .or_default();
        // Keep the series sorted even if a clock step produces an older stamp.
        let at = series.partition_point(|(_, r)| r.collected_at <= record.collected_at);
        series.insert(at, (id, record.clone()));
        Ok(id)
    }

    async fn latest(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
    ) -> Result<Option<ScanRecord>, SitewatchError> {
        let data = self.data.read().await;
        Ok(data
            .series
            .get(&(url.clone(), kind))
            .and_then(|series| series.last())
            .map(|(_, record)| record.clone()))
    }

    async fn range(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>, SitewatchError> {
        let data = self.data.read().await;
        Ok(data
            .series
            .get(&(url.clone(), kind))
            .map(|series| {
                series
                    .iter()
                    .filter(|(_, r)| r.collected_at >= since)
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recent(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
        limit: usize,
    ) -> Result<Vec<ScanRecord>, SitewatchError> {
        let data = self.data.read().await;
        Ok(data
            .series
            .get(&(url.clone(), kind))
            .map(|series| {
                series
                    .iter()
                    .rev()
                    .take(limit)
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
