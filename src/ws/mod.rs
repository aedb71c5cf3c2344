//! WebSocket feed of scan events.
//!
//! Clients connect to `/ws`, subscribe to individual URLs (or `*`) and
//! receive scan lifecycle events (`url_submitted`, `scan_started`,
//! `probe_finished`, `scan_completed`, `url_removed`, `drain_finished`) as
//! the scheduler emits them.
//! The `queue_status` command answers with the current lane contents.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
