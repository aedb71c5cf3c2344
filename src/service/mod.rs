//! Service layer: scan orchestration.
//!
//! [`CollectionScheduler`] owns the drain loop over the
//! [`crate::domain::DedupQueue`], runs the probes, writes snapshots and
//! emits events through the [`crate::domain::EventBus`].

pub mod collection_scheduler;

pub use collection_scheduler::{CollectionScheduler, TriggerOutcome};
