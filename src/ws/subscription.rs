//! Per-connection subscription manager.
//!
//! Tracks which URLs a WebSocket client is subscribed to and provides
//! server-side event filtering.

use std::collections::HashSet;

use crate::domain::{ScanEvent, TrackedUrl};

/// Manages the set of URL subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed URLs. If `subscribe_all` is true, this set is ignored.
    urls: HashSet<TrackedUrl>,
    /// Whether the client subscribes to all URLs (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds URLs to the subscription set. `wildcard` enables `"*"`.
    pub fn subscribe(&mut self, urls: &[TrackedUrl], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.urls.extend(urls.iter().cloned());
    }

    /// Removes URLs from the subscription set. `wildcard` clears `"*"`.
    pub fn unsubscribe(&mut self, urls: &[TrackedUrl], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for url in urls {
            self.urls.remove(url);
        }
    }

    /// Returns `true` if the event passes the filter.
    ///
    /// Events not tied to a URL reach every connection with at least one
    /// active subscription.
    #[must_use]
    pub fn matches(&self, event: &ScanEvent) -> bool {
        match event.url() {
            Some(url) => self.subscribe_all || self.urls.contains(url),
            None => self.subscribe_all || !self.urls.is_empty(),
        }
    }

    /// Returns the number of explicitly subscribed URLs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.urls.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn url(raw: &str) -> TrackedUrl {
        let Ok(url) = TrackedUrl::parse(raw) else {
            panic!("valid url");
        };
        url
    }

    fn submitted(raw: &str) -> ScanEvent {
        ScanEvent::UrlSubmitted {
            url: url(raw),
            timestamp: Utc::now(),
        }
    }

    fn drain_finished() -> ScanEvent {
        ScanEvent::DrainFinished {
            scanned: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&submitted("https://a.example")));
        assert!(!mgr.matches(&drain_finished()));
    }

    #[test]
    fn subscribe_specific_url() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[url("https://A.example")], false);
        assert!(mgr.matches(&submitted("https://a.example/")));
        assert!(!mgr.matches(&submitted("https://b.example")));
        assert!(mgr.matches(&drain_finished()));
    }

    #[test]
    fn wildcard_matches_everything() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches(&submitted("https://a.example")));
        assert!(mgr.matches(&submitted("https://b.example")));
        mgr.unsubscribe(&[], true);
        assert!(!mgr.matches(&submitted("https://a.example")));
    }

    #[test]
    fn unsubscribe_removes_url() {
        let mut mgr = SubscriptionManager::new();
        let target = url("https://a.example");
        mgr.subscribe(std::slice::from_ref(&target), false);
        assert_eq!(mgr.count(), 1);
        mgr.unsubscribe(&[target], false);
        assert_eq!(mgr.count(), 0);
        assert!(!mgr.matches(&submitted("https://a.example")));
    }
}
