//! # sitewatch
//!
//! Recurring website telemetry collector. Tracked URLs are scanned by
//! three independent probes (a Lighthouse performance audit, ping /
//! traceroute / TLS certificate diagnostics, and an OWASP ZAP security
//! scan), results are stored as append-only snapshot series, and a REST
//! and WebSocket API serves summaries and model-assisted trend reports.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── CollectionScheduler (service/) ──► Probes (probe/)
//!     ├── EventBus (domain/)
//!     ├── Aggregator, AnomalyReporter (analytics/)
//!     │
//!     ├── DedupQueue (domain/)
//!     │
//!     └── PostgreSQL or in-memory Persistence (persistence/)
//! ```
//!
//! New URLs enter the immediate lane of the [`domain::DedupQueue`] and
//! are scanned ahead of the continuous backlog. After a scan every URL
//! moves to the tail of the continuous lane, which a timer re-drains at a
//! fixed interval. At most one drain runs at a time.

pub mod analytics;
pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod probe;
pub mod service;
pub mod ws;
