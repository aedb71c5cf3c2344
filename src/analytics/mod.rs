//! Read-side analytics over stored snapshots.
//!
//! [`aggregator`] reduces a snapshot series to summary statistics.
//! [`anomaly`] asks a text-generation model for trends and anomalies and
//! assembles the insight report served to the dashboard.

pub mod aggregator;
pub mod anomaly;

pub use aggregator::{
    AlertCategory, CategoryCount, Distribution, NetworkSummary, PerformanceSummary,
    RiskBreakdown, SecuritySummary, WebVitalsSummary, distribution, summarize_network,
    summarize_performance, summarize_security,
};
pub use anomaly::{AnomalyReporter, Finding, GroqClient, InsightReport, TextGenerator, parse_findings};
