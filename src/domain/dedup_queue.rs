//! Two-lane deduplicating work queue with a durable backing set.
//!
//! [`DedupQueue`] keeps every tracked URL in exactly one of three places:
//! the `immediate` lane (new submissions), the `continuous` lane (the
//! recurring backlog) or the in-flight set (currently being scanned).
//! Dequeues always serve `immediate` first.
//!
//! The in-memory state is authoritative. Every mutation is mirrored to a
//! [`QueueStore`] through a journal: writes are appended in order and
//! flushed at the start and end of each operation. A failed write stays
//! at the head of the journal and is retried by the next operation, so
//! the durable order never diverges from the order of mutations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::TrackedUrl;
use crate::error::SitewatchError;
use crate::persistence::QueueStore;

/// Lane a queue entry was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// New submissions, served first.
    Immediate,
    /// Recurring backlog.
    Continuous,
}

/// A dequeued URL together with its source lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// URL to scan.
    pub url: TrackedUrl,
    /// Lane the URL was taken from.
    pub lane: Lane,
}

/// Result of [`DedupQueue::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The URL was new and entered the immediate lane.
    Queued,
    /// The URL was already tracked; nothing changed.
    AlreadyTracked,
}

/// Where a tracked URL currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlState {
    /// Waiting in the immediate lane.
    Immediate,
    /// Waiting in the continuous lane.
    Continuous,
    /// Being scanned.
    InFlight,
}

/// A tracked URL with its current position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedEntry {
    /// Normalized URL.
    pub url: TrackedUrl,
    /// First submission time.
    pub added_at: DateTime<Utc>,
    /// Current state.
    pub state: UrlState,
}

/// Snapshot of the queue contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Immediate lane, head first.
    pub immediate: Vec<TrackedUrl>,
    /// Continuous lane, head first.
    pub continuous: Vec<TrackedUrl>,
    /// URLs currently being scanned.
    pub in_flight: Vec<TrackedUrl>,
    /// Durable writes not yet applied.
    pub pending_writes: usize,
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Insert {
        url: TrackedUrl,
        added_at: DateTime<Utc>,
    },
    MoveToTail {
        url: TrackedUrl,
    },
    Delete {
        url: TrackedUrl,
    },
}

#[derive(Debug, Default)]
struct QueueState {
    members: HashMap<TrackedUrl, DateTime<Utc>>,
    immediate: VecDeque<TrackedUrl>,
    continuous: VecDeque<TrackedUrl>,
    in_flight: HashSet<TrackedUrl>,
    journal: VecDeque<PendingWrite>,
}

/// Deduplicating two-lane queue. See the module docs.
#[derive(Debug)]
pub struct DedupQueue {
    state: Mutex<QueueState>,
    store: Arc<dyn QueueStore>,
}

impl DedupQueue {
    /// Creates an empty queue mirrored to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            store,
        }
    }

    /// Creates a queue whose continuous lane holds the store's contents
    /// in persisted order. The immediate lane starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] if the store cannot be read.
    pub async fn restore(store: Arc<dyn QueueStore>) -> Result<Self, SitewatchError> {
        let records = store.load_tracked().await?;
        let mut state = QueueState::default();
        for record in records {
            if state.members.insert(record.url.clone(), record.added_at).is_none() {
                state.continuous.push_back(record.url);
            }
        }
        tracing::info!(restored = state.continuous.len(), "queue restored");
        Ok(Self {
            state: Mutex::new(state),
            store,
        })
    }

    /// Adds a URL to the immediate lane unless it is already tracked.
    pub async fn submit(&self, url: TrackedUrl) -> SubmitOutcome {
        let mut state = self.state.lock().await;
        self.flush(&mut state).await;

        if state.members.contains_key(&url) {
            return SubmitOutcome::AlreadyTracked;
        }

        let added_at = Utc::now();
        state.members.insert(url.clone(), added_at);
        state.immediate.push_back(url.clone());
        state.journal.push_back(PendingWrite::Insert {
            url: url.clone(),
            added_at,
        });
        self.flush(&mut state).await;

        tracing::debug!(url = %url, "url queued");
        SubmitOutcome::Queued
    }

    /// Takes the next URL, immediate lane first.
    pub async fn dequeue_next(&self) -> Option<QueueEntry> {
        self.dequeue(true).await
    }

    /// Takes the next URL from the immediate lane, falling back to the
    /// continuous lane only when `allow_continuous` is set.
    pub async fn dequeue(&self, allow_continuous: bool) -> Option<QueueEntry> {
        let mut state = self.state.lock().await;
        self.flush(&mut state).await;

        let entry = if let Some(url) = state.immediate.pop_front() {
            QueueEntry {
                url,
                lane: Lane::Immediate,
            }
        } else if allow_continuous && let Some(url) = state.continuous.pop_front() {
            QueueEntry {
                url,
                lane: Lane::Continuous,
            }
        } else {
            return None;
        };

        state.in_flight.insert(entry.url.clone());
        Some(entry)
    }

    /// Returns a scanned URL to the tail of the continuous lane.
    ///
    /// A URL removed while in flight is dropped instead.
    pub async fn requeue_after_scan(&self, url: &TrackedUrl) {
        let mut state = self.state.lock().await;
        self.flush(&mut state).await;

        let was_in_flight = state.in_flight.remove(url);
        if !state.members.contains_key(url) {
            tracing::debug!(url = %url, "removed while in flight, not requeued");
            return;
        }
        if !was_in_flight {
            // Not dequeued by us; it already sits in a lane.
            return;
        }

        state.continuous.push_back(url.clone());
        state
            .journal
            .push_back(PendingWrite::MoveToTail { url: url.clone() });
        self.flush(&mut state).await;
    }

    /// Stops tracking a URL. Returns `false` if it was not tracked.
    pub async fn remove(&self, url: &TrackedUrl) -> bool {
        let mut state = self.state.lock().await;
        self.flush(&mut state).await;

        if state.members.remove(url).is_none() {
            return false;
        }
        state.immediate.retain(|u| u != url);
        state.continuous.retain(|u| u != url);
        state.in_flight.remove(url);
        state
            .journal
            .push_back(PendingWrite::Delete { url: url.clone() });
        self.flush(&mut state).await;

        tracing::debug!(url = %url, "url removed");
        true
    }

    /// Returns `true` if the URL is tracked.
    pub async fn contains(&self, url: &TrackedUrl) -> bool {
        self.state.lock().await.members.contains_key(url)
    }

    /// Returns the lane contents and the journal size.
    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        let mut in_flight: Vec<_> = state.in_flight.iter().cloned().collect();
        in_flight.sort();
        QueueStatus {
            immediate: state.immediate.iter().cloned().collect(),
            continuous: state.continuous.iter().cloned().collect(),
            in_flight,
            pending_writes: state.journal.len(),
        }
    }

    /// Returns every tracked URL: immediate lane, in flight, then
    /// continuous lane.
    pub async fn tracked(&self) -> Vec<TrackedEntry> {
        let state = self.state.lock().await;
        let entry = |url: &TrackedUrl, lane: UrlState| TrackedEntry {
            url: url.clone(),
            added_at: state.members.get(url).copied().unwrap_or_default(),
            state: lane,
        };

        let mut in_flight: Vec<_> = state.in_flight.iter().collect();
        in_flight.sort();

        state
            .immediate
            .iter()
            .map(|u| entry(u, UrlState::Immediate))
            .chain(in_flight.into_iter().map(|u| entry(u, UrlState::InFlight)))
            .chain(state.continuous.iter().map(|u| entry(u, UrlState::Continuous)))
            .collect()
    }

    /// Number of URLs waiting in the immediate lane.
    pub async fn immediate_len(&self) -> usize {
        self.state.lock().await.immediate.len()
    }

    /// Number of URLs waiting in the continuous lane.
    pub async fn continuous_len(&self) -> usize {
        self.state.lock().await.continuous.len()
    }

    /// Returns `true` if both lanes are empty.
    pub async fn is_empty(&self) -> bool {
        let state = self.state.lock().await;
        state.immediate.is_empty() && state.continuous.is_empty()
    }

    async fn flush(&self, state: &mut QueueState) {
        while let Some(write) = state.journal.front() {
            let result = match write {
                PendingWrite::Insert { url, added_at } => {
                    self.store.insert_tracked(url, *added_at).await.map(|_| ())
                }
                PendingWrite::MoveToTail { url } => self.store.move_to_tail(url).await,
                PendingWrite::Delete { url } => self.store.delete_tracked(url).await.map(|_| ()),
            };

            if let Err(e) = result {
                tracing::warn!(
                    pending = state.journal.len(),
                    error = %e,
                    "durable queue write failed, will retry"
                );
                return;
            }
            state.journal.pop_front();
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::persistence::{MemoryStore, TrackedUrlRecord};

    fn url(raw: &str) -> TrackedUrl {
        let Ok(url) = TrackedUrl::parse(raw) else {
            panic!("valid url");
        };
        url
    }

    fn memory() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), SitewatchError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(SitewatchError::Persistence("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl QueueStore for FlakyStore {
        async fn insert_tracked(
            &self,
            url: &TrackedUrl,
            added_at: DateTime<Utc>,
        ) -> Result<bool, SitewatchError> {
            self.check()?;
            self.inner.insert_tracked(url, added_at).await
        }

        async fn move_to_tail(&self, url: &TrackedUrl) -> Result<(), SitewatchError> {
            self.check()?;
            self.inner.move_to_tail(url).await
        }

        async fn delete_tracked(&self, url: &TrackedUrl) -> Result<bool, SitewatchError> {
            self.check()?;
            self.inner.delete_tracked(url).await
        }

        async fn load_tracked(&self) -> Result<Vec<TrackedUrlRecord>, SitewatchError> {
            self.inner.load_tracked().await
        }
    }

    #[tokio::test]
    async fn submit_is_idempotent() {
        let store = memory();
        let queue = DedupQueue::new(Arc::clone(&store) as Arc<dyn QueueStore>);
        let a = url("https://a.example");

        assert_eq!(queue.submit(a.clone()).await, SubmitOutcome::Queued);
        assert_eq!(queue.submit(a.clone()).await, SubmitOutcome::AlreadyTracked);
        assert_eq!(queue.immediate_len().await, 1);

        let Ok(rows) = store.load_tracked().await else {
            panic!("load");
        };
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn immediate_lane_has_priority() {
        let store = memory();
        let _ = store.insert_tracked(&url("https://old.example"), Utc::now()).await;
        let Ok(queue) = DedupQueue::restore(store).await else {
            panic!("restore");
        };
        let _ = queue.submit(url("https://new.example")).await;

        let Some(first) = queue.dequeue_next().await else {
            panic!("entry expected");
        };
        assert_eq!(first.url, url("https://new.example"));
        assert_eq!(first.lane, Lane::Immediate);

        let Some(second) = queue.dequeue_next().await else {
            panic!("entry expected");
        };
        assert_eq!(second.lane, Lane::Continuous);
        assert!(queue.dequeue_next().await.is_none());
    }

    #[tokio::test]
    async fn in_flight_url_is_not_dequeued_twice() {
        let queue = DedupQueue::new(memory());
        let a = url("https://a.example");
        let _ = queue.submit(a.clone()).await;

        assert!(queue.dequeue_next().await.is_some());
        assert!(queue.dequeue_next().await.is_none());
        assert!(queue.contains(&a).await);
        assert_eq!(queue.submit(a).await, SubmitOutcome::AlreadyTracked);
    }

    #[tokio::test]
    async fn requeue_goes_to_continuous_tail() {
        let queue = DedupQueue::new(memory());
        let (a, b) = (url("https://a.example"), url("https://b.example"));
        let _ = queue.submit(a.clone()).await;
        let _ = queue.submit(b.clone()).await;

        let _ = queue.dequeue_next().await;
        queue.requeue_after_scan(&a).await;
        let _ = queue.dequeue_next().await;
        queue.requeue_after_scan(&b).await;

        let status = queue.status().await;
        assert!(status.immediate.is_empty());
        assert!(status.in_flight.is_empty());
        assert_eq!(status.continuous, vec![a, b]);
    }

    #[tokio::test]
    async fn dequeue_without_continuous_skips_backlog() {
        let store = memory();
        let _ = store.insert_tracked(&url("https://old.example"), Utc::now()).await;
        let Ok(queue) = DedupQueue::restore(store).await else {
            panic!("restore");
        };
        assert!(queue.dequeue(false).await.is_none());
        assert_eq!(queue.continuous_len().await, 1);
    }

    #[tokio::test]
    async fn restart_preserves_order() {
        let store = memory();
        let (a, b, c) = (
            url("https://a.example"),
            url("https://b.example"),
            url("https://c.example"),
        );
        {
            let queue = DedupQueue::new(Arc::clone(&store) as Arc<dyn QueueStore>);
            for u in [&a, &b, &c] {
                let _ = queue.submit(u.clone()).await;
            }
        }

        let Ok(queue) = DedupQueue::restore(store).await else {
            panic!("restore");
        };
        let mut order = Vec::new();
        while let Some(entry) = queue.dequeue_next().await {
            order.push(entry.url);
        }
        assert_eq!(order, vec![a, b, c]);
    }

    #[tokio::test]
    async fn requeue_order_survives_restart() {
        let store = memory();
        let (a, b) = (url("https://a.example"), url("https://b.example"));
        {
            let queue = DedupQueue::new(Arc::clone(&store) as Arc<dyn QueueStore>);
            let _ = queue.submit(a.clone()).await;
            let _ = queue.submit(b.clone()).await;
            let _ = queue.dequeue_next().await;
            queue.requeue_after_scan(&a).await;
        }
        let Ok(queue) = DedupQueue::restore(store).await else {
            panic!("restore");
        };
        assert_eq!(queue.status().await.continuous, vec![b, a]);
    }

    #[tokio::test]
    async fn remove_mid_flight_drops_requeue() {
        let store = memory();
        let queue = DedupQueue::new(Arc::clone(&store) as Arc<dyn QueueStore>);
        let a = url("https://a.example");
        let _ = queue.submit(a.clone()).await;
        let _ = queue.dequeue_next().await;

        assert!(queue.remove(&a).await);
        queue.requeue_after_scan(&a).await;

        assert!(queue.is_empty().await);
        assert!(!queue.contains(&a).await);
        assert!(!queue.remove(&a).await);
        let Ok(rows) = store.load_tracked().await else {
            panic!("load");
        };
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn failed_write_is_retried_on_next_operation() {
        let store = Arc::new(FlakyStore::default());
        let queue = DedupQueue::new(Arc::clone(&store) as Arc<dyn QueueStore>);
        let a = url("https://a.example");

        store.failing.store(true, Ordering::SeqCst);
        assert_eq!(queue.submit(a.clone()).await, SubmitOutcome::Queued);
        assert_eq!(queue.immediate_len().await, 1);
        assert_eq!(queue.status().await.pending_writes, 1);

        store.failing.store(false, Ordering::SeqCst);
        let Some(entry) = queue.dequeue_next().await else {
            panic!("lane must be intact");
        };
        assert_eq!(entry.url, a);
        assert_eq!(queue.status().await.pending_writes, 0);

        let Ok(rows) = store.load_tracked().await else {
            panic!("load");
        };
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn journal_replays_in_order() {
        let store = Arc::new(FlakyStore::default());
        let queue = DedupQueue::new(Arc::clone(&store) as Arc<dyn QueueStore>);
        let a = url("https://a.example");

        store.failing.store(true, Ordering::SeqCst);
        let _ = queue.submit(a.clone()).await;
        let _ = queue.remove(&a).await;
        assert_eq!(queue.status().await.pending_writes, 2);

        store.failing.store(false, Ordering::SeqCst);
        let _ = queue.dequeue_next().await;

        let Ok(rows) = store.load_tracked().await else {
            panic!("load");
        };
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn tracked_lists_every_state() {
        let queue = DedupQueue::new(memory());
        let (a, b) = (url("https://a.example"), url("https://b.example"));
        let _ = queue.submit(a.clone()).await;
        let _ = queue.submit(b.clone()).await;
        let _ = queue.dequeue_next().await;

        let tracked = queue.tracked().await;
        assert_eq!(tracked.len(), 2);
        assert!(
            tracked
                .iter()
                .any(|e| e.url == a && e.state == UrlState::InFlight)
        );
        assert!(
            tracked
                .iter()
                .any(|e| e.url == b && e.state == UrlState::Immediate)
        );
    }
}
