//! Fan-out of scan lifecycle events.
//!
//! The scheduler publishes a [`ScanEvent`] when a URL is submitted or
//! removed, when a scan starts, after each probe and when a drain ends.
//! Every `/ws` feed holds its own receiver and filters by URL.

use tokio::sync::broadcast;

use super::ScanEvent;

/// Broadcast bus for [`ScanEvent`]s.
///
/// Capacity comes from `EVENT_BUS_CAPACITY` (default 1 000). A feed that
/// falls behind loses the oldest events and is told how many it missed.
/// Publishing never waits on a feed, so a slow client cannot stall a scan.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// Creates a bus holding up to `capacity` undelivered events (at
    /// least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event and returns how many feeds it reached. With no
    /// open feed the event is dropped.
    pub fn publish(&self, event: ScanEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Opens a feed that sees every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Number of open feeds, reported by `/health` as `ws_clients`.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
