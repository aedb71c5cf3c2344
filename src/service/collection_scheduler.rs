//! Collection scheduler: drains the queue through the probes.
//!
//! At most one drain runs at a time. A drain repeatedly takes the next
//! entry from the [`DedupQueue`] (immediate lane first), runs every probe
//! against it in order, appends one [`ScanRecord`] per probe and requeues
//! the URL on the continuous lane.
//!
//! Continuous items are only taken while the drain has budget left. A
//! full pass (timer tick, manual trigger, startup) sets the budget to the
//! continuous length at that moment, so each backlog URL is scanned once
//! per pass. A submit-triggered drain has no budget and only serves the
//! immediate lane. A tick that lands during a drain marks the pass as due;
//! the running drain starts it once its current work is exhausted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::{
    DedupQueue, EventBus, Lane, QueueEntry, ScanEvent, ScanOutcome, ScanRecord, SubmitOutcome,
    TrackedUrl,
};
use crate::persistence::SnapshotStore;
use crate::probe::Probe;

/// Result of a manual trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A full pass was started.
    Started,
    /// A drain is already running; nothing was done.
    AlreadyProcessing,
    /// Both lanes are empty.
    NothingQueued,
}

/// Holds the `draining` flag; clears it on drop.
#[derive(Debug)]
struct DrainGuard {
    flag: Arc<AtomicBool>,
}

impl DrainGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives scans. See the module docs.
#[derive(Debug)]
pub struct CollectionScheduler {
    queue: Arc<DedupQueue>,
    probes: Vec<Arc<dyn Probe>>,
    snapshots: Arc<dyn SnapshotStore>,
    event_bus: EventBus,
    probe_timeout: Duration,
    draining: Arc<AtomicBool>,
    continuous_pass_due: AtomicBool,
    idle: Notify,
}

impl CollectionScheduler {
    /// Creates a scheduler. Probes run in the given order for every URL.
    #[must_use]
    pub fn new(
        queue: Arc<DedupQueue>,
        probes: Vec<Arc<dyn Probe>>,
        snapshots: Arc<dyn SnapshotStore>,
        event_bus: EventBus,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            probes,
            snapshots,
            event_bus,
            probe_timeout,
            draining: Arc::new(AtomicBool::new(false)),
            continuous_pass_due: AtomicBool::new(false),
            idle: Notify::new(),
        }
    }

    /// Returns the underlying queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<DedupQueue> {
        &self.queue
    }

    /// Returns the snapshot store results are written to.
    #[must_use]
    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        &self.snapshots
    }

    /// Returns `true` while a drain is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Submits a URL and wakes an idle worker.
    pub async fn submit(self: &Arc<Self>, url: TrackedUrl) -> SubmitOutcome {
        let outcome = self.queue.submit(url.clone()).await;
        if outcome == SubmitOutcome::Queued {
            tracing::info!(url = %url, "url submitted");
            let _ = self.event_bus.publish(ScanEvent::UrlSubmitted {
                url,
                timestamp: Utc::now(),
            });
            self.try_start(false);
        }
        outcome
    }

    /// Stops tracking a URL. An in-flight scan of it completes but the
    /// URL is not requeued.
    pub async fn remove(&self, url: &TrackedUrl) -> bool {
        let removed = self.queue.remove(url).await;
        if removed {
            tracing::info!(url = %url, "url removed");
            let _ = self.event_bus.publish(ScanEvent::UrlRemoved {
                url: url.clone(),
                timestamp: Utc::now(),
            });
        }
        removed
    }

    /// Manual trigger: starts a full pass unless idle-with-nothing-to-do
    /// or already draining.
    pub async fn run_now(self: &Arc<Self>) -> TriggerOutcome {
        if self.queue.is_empty().await {
            return TriggerOutcome::NothingQueued;
        }
        if self.try_start(true) {
            TriggerOutcome::Started
        } else {
            TriggerOutcome::AlreadyProcessing
        }
    }

    /// Starts a full pass if the continuous lane has work. Called once
    /// after the queue is restored.
    pub async fn start_initial_pass(self: &Arc<Self>) -> bool {
        if self.queue.continuous_len().await == 0 {
            return false;
        }
        self.try_start(true)
    }

    /// Timer callback: starts a full pass, or marks one due if a drain is
    /// running.
    pub fn on_tick(self: &Arc<Self>) {
        if !self.try_start(true) {
            self.continuous_pass_due.store(true, Ordering::Release);
            tracing::debug!("drain busy, continuous pass deferred");
        }
    }

    /// Spawns the fixed-interval timer. The first tick fires one period
    /// from now.
    #[must_use]
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                this.on_tick();
            }
        })
    }

    /// Waits until no drain is running and the immediate lane is empty.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_draining() && self.queue.immediate_len().await == 0 {
                return;
            }
            notified.await;
        }
    }

    fn try_start(self: &Arc<Self>, full_pass: bool) -> bool {
        let Some(guard) = DrainGuard::acquire(&self.draining) else {
            return false;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_drains(guard, full_pass).await;
        });
        true
    }

    async fn run_drains(self: Arc<Self>, guard: DrainGuard, full_pass: bool) {
        let mut guard = Some(guard);
        let mut full = full_pass;
        while guard.is_some() {
            let scanned = self.drain(full).await;
            let _ = self.event_bus.publish(ScanEvent::DrainFinished {
                scanned,
                timestamp: Utc::now(),
            });
            tracing::info!(scanned, "drain finished");
            drop(guard.take());

            // Work may have arrived between the last dequeue and release.
            let pending = self.queue.immediate_len().await > 0
                || self.continuous_pass_due.load(Ordering::Acquire);
            if pending {
                guard = DrainGuard::acquire(&self.draining);
                full = false;
            }
        }
        self.idle.notify_waiters();
    }

    async fn drain(&self, full_pass: bool) -> usize {
        let mut budget = if full_pass {
            self.continuous_pass_due.store(false, Ordering::Release);
            self.queue.continuous_len().await
        } else {
            0
        };
        tracing::debug!(full_pass, budget, "drain started");

        let mut scanned = 0;
        loop {
            match self.queue.dequeue(budget > 0).await {
                Some(entry) => {
                    if entry.lane == Lane::Continuous {
                        budget = budget.saturating_sub(1);
                    }
                    self.scan(entry).await;
                    scanned += 1;
                }
                None => {
                    if self.continuous_pass_due.swap(false, Ordering::AcqRel) {
                        budget = self.queue.continuous_len().await;
                        if budget > 0 {
                            tracing::debug!(budget, "deferred continuous pass started");
                            continue;
                        }
                    }
                    break;
                }
            }
        }
        scanned
    }

    async fn scan(&self, entry: QueueEntry) {
        let QueueEntry { url, lane } = entry;
        tracing::info!(url = %url, ?lane, "scan started");
        let _ = self.event_bus.publish(ScanEvent::ScanStarted {
            url: url.clone(),
            lane,
            timestamp: Utc::now(),
        });

        let mut succeeded = 0;
        let mut failed = 0;
        for probe in &self.probes {
            let kind = probe.kind();
            let outcome = self.run_probe(Arc::clone(probe), url.clone()).await;
            let success = outcome.is_success();
            if success {
                succeeded += 1;
            } else {
                failed += 1;
            }

            let record = ScanRecord::new(url.clone(), kind, outcome);
            if let Err(e) = self.snapshots.append(&record).await {
                tracing::error!(url = %url, probe = %kind, error = %e, "failed to store snapshot");
            }

            let _ = self.event_bus.publish(ScanEvent::ProbeFinished {
                url: url.clone(),
                probe: kind,
                success,
                timestamp: Utc::now(),
            });
        }

        self.queue.requeue_after_scan(&url).await;
        tracing::info!(url = %url, succeeded, failed, "scan completed");
        let _ = self.event_bus.publish(ScanEvent::ScanCompleted {
            url,
            succeeded,
            failed,
            timestamp: Utc::now(),
        });
    }

    /// Runs one probe in its own task so a panic is contained.
    async fn run_probe(&self, probe: Arc<dyn Probe>, url: TrackedUrl) -> ScanOutcome {
        let kind = probe.kind();
        let limit = probe.time_budget().unwrap_or(self.probe_timeout);
        let task = tokio::spawn(async move { tokio::time::timeout(limit, probe.run(&url)).await });

        let failure = |reason: String| {
            tracing::warn!(probe = %kind, reason = %reason, "probe failed");
            ScanOutcome::Failure { reason }
        };

        match task.await {
            Ok(Ok(Ok(payload))) if payload.kind() == kind => ScanOutcome::Success { payload },
            Ok(Ok(Ok(payload))) => failure(format!(
                "probe returned a {} payload",
                payload.kind().as_str()
            )),
            Ok(Ok(Err(e))) => failure(e.to_string()),
            Ok(Err(_)) => failure(format!("timed out after {}s", limit.as_secs())),
            Err(e) if e.is_panic() => failure("probe panicked".to_string()),
            Err(e) => failure(format!("probe task failed: {e}")),
        }
    }
}
