//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::analytics::AnomalyReporter;
use crate::domain::EventBus;
use crate::persistence::SnapshotStore;
use crate::service::CollectionScheduler;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Queue owner and scan driver.
    pub scheduler: Arc<CollectionScheduler>,
    /// Snapshot series read by the result endpoints.
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Trend and anomaly reports.
    pub reporter: Arc<AnomalyReporter>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires the state from its parts. The reporter reads the same
    /// snapshot store the scheduler writes to.
    #[must_use]
    pub fn new(
        scheduler: Arc<CollectionScheduler>,
        reporter: Arc<AnomalyReporter>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            snapshots: Arc::clone(scheduler.snapshots()),
            scheduler,
            reporter,
            event_bus,
        }
    }
}
