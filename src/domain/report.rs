//! Probe kinds and their typed result payloads.
//!
//! Every probe produces exactly one [`ProbePayload`] variant. Values that a
//! tool did not report are `None` rather than sentinel strings, so the
//! aggregator can skip them without guessing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SitewatchError;

/// The three independent measurement capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Headless-browser page performance audit.
    Performance,
    /// Ping, traceroute and TLS certificate diagnostics.
    Network,
    /// Intercepting-proxy security scan.
    Security,
}

impl ProbeKind {
    /// Every kind, in scan order.
    pub const ALL: [Self; 3] = [Self::Performance, Self::Network, Self::Security];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Network => "network",
            Self::Security => "security",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = SitewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "performance" => Ok(Self::Performance),
            "network" => Ok(Self::Network),
            "security" => Ok(Self::Security),
            other => Err(SitewatchError::InvalidProbeKind(other.to_string())),
        }
    }
}

/// Device emulation used for performance audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFactor {
    /// Throttled mobile profile (Lighthouse default).
    #[default]
    Mobile,
    /// Desktop preset.
    Desktop,
}

impl FormFactor {
    /// Both profiles, in audit order.
    pub const ALL: [Self; 2] = [Self::Mobile, Self::Desktop];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Desktop => "desktop",
        }
    }
}

impl fmt::Display for FormFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormFactor {
    type Err = SitewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mobile" => Ok(Self::Mobile),
            "desktop" => Ok(Self::Desktop),
            other => Err(SitewatchError::InvalidRequest(format!(
                "unknown form factor `{other}`, expected `mobile` or `desktop`"
            ))),
        }
    }
}

/// Result payload of one probe run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbePayload {
    /// Performance audits, one per form factor.
    Performance(PerformanceAudit),
    /// Network diagnostics result.
    Network(NetworkReport),
    /// Security scan result.
    Security(SecurityReport),
}

impl ProbePayload {
    /// Returns the probe kind that produced this payload.
    #[must_use]
    pub const fn kind(&self) -> ProbeKind {
        match self {
            Self::Performance(_) => ProbeKind::Performance,
            Self::Network(_) => ProbeKind::Network,
            Self::Security(_) => ProbeKind::Security,
        }
    }
}

/// Core web vitals in milliseconds (CLS is unitless).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebVitals {
    /// Largest contentful paint.
    pub lcp: Option<f64>,
    /// Max potential first input delay.
    pub fid: Option<f64>,
    /// Cumulative layout shift.
    pub cls: Option<f64>,
    /// First contentful paint.
    pub fcp: Option<f64>,
    /// Total blocking time.
    pub tbt: Option<f64>,
}

/// An improvement opportunity reported by the auditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Short audit title.
    pub title: String,
    /// Longer explanation, usually with a documentation link.
    pub description: String,
    /// Audit score in `[0, 1]`, if scored.
    pub score: Option<f64>,
    /// Estimated savings in milliseconds.
    pub estimated_savings_ms: Option<f64>,
}

/// Page performance audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Emulated device.
    pub form_factor: FormFactor,
    /// Performance category score, `0..=100`.
    pub score: Option<f64>,
    /// Speed index in milliseconds, used as page load time.
    pub page_load_time: Option<f64>,
    /// Core web vitals.
    pub web_vitals: WebVitals,
    /// Server response time for the main document in milliseconds.
    pub server_response_time: Option<f64>,
    /// Script bootup time in milliseconds.
    pub bootup_time: Option<f64>,
    /// Total transferred bytes.
    pub total_page_weight: Option<f64>,
    /// Number of network requests.
    pub http_requests: Option<u64>,
    /// Opportunities whose score is below 1.
    pub opportunities: Vec<Opportunity>,
}

/// Performance audits of one scan, one per emulated device.
///
/// A scan succeeds when at least one form factor was audited; the others
/// are `None` and their failure is listed in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAudit {
    /// Mobile audit.
    pub mobile: Option<PerformanceReport>,
    /// Desktop audit.
    pub desktop: Option<PerformanceReport>,
    /// Failed audits, as `form_factor: reason`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl PerformanceAudit {
    /// Returns the audit for `form_factor`, if it succeeded.
    #[must_use]
    pub const fn report(&self, form_factor: FormFactor) -> Option<&PerformanceReport> {
        match form_factor {
            FormFactor::Mobile => self.mobile.as_ref(),
            FormFactor::Desktop => self.desktop.as_ref(),
        }
    }

    /// Stores `report` in the slot of its form factor.
    pub fn insert(&mut self, report: PerformanceReport) {
        match report.form_factor {
            FormFactor::Mobile => self.mobile = Some(report),
            FormFactor::Desktop => self.desktop = Some(report),
        }
    }

    /// Successful audits, mobile first.
    pub fn reports(&self) -> impl Iterator<Item = &PerformanceReport> {
        self.mobile.iter().chain(self.desktop.iter())
    }
}

/// ICMP echo statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    /// Resolved target host.
    pub host: String,
    /// `true` if at least one reply was received.
    pub alive: bool,
    /// Round-trip times of received replies, in milliseconds.
    pub samples: Vec<f64>,
    /// Minimum round trip.
    pub min: Option<f64>,
    /// Maximum round trip.
    pub max: Option<f64>,
    /// Mean round trip.
    pub avg: Option<f64>,
    /// Percentage of lost packets.
    pub packet_loss_pct: f64,
}

/// One traceroute hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceHop {
    /// Hop number, starting at 1.
    pub hop: u32,
    /// Responding address; `None` when the hop timed out.
    pub address: Option<String>,
    /// Round trip to this hop in milliseconds.
    pub latency_ms: Option<f64>,
}

/// TLS certificate details of the target host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// X.509 version line.
    pub version: Option<String>,
    /// Serial number.
    pub serial_number: Option<String>,
    /// Signature algorithm.
    pub signature_algorithm: Option<String>,
    /// Issuer distinguished name.
    pub issuer: Option<String>,
    /// Subject distinguished name.
    pub subject: Option<String>,
    /// Public key algorithm.
    pub public_key_algorithm: Option<String>,
    /// Public key size in bits.
    pub key_bits: Option<u32>,
    /// Expiry timestamp.
    pub not_after: Option<DateTime<Utc>>,
    /// Whole days until expiry, floored at zero.
    pub days_remaining: Option<i64>,
}

/// Network diagnostics. Each sub-check is independent; the ones that
/// failed are described in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    /// Ping statistics.
    pub ping: Option<PingStats>,
    /// Traceroute hops.
    pub traceroute: Option<Vec<TraceHop>>,
    /// TLS certificate.
    pub certificate: Option<CertificateInfo>,
    /// Failures of individual sub-checks.
    pub errors: Vec<String>,
}

/// Alert risk level as reported by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    /// High risk.
    High,
    /// Medium risk.
    Medium,
    /// Low risk.
    Low,
    /// Informational finding.
    Informational,
    /// Anything else the scanner emits.
    #[serde(other)]
    Unknown,
}

impl RiskLevel {
    /// Classified levels, most severe first.
    pub const CLASSIFIED: [Self; 4] = [Self::High, Self::Medium, Self::Low, Self::Informational];

    /// Parses the scanner's risk label.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "High" => Self::High,
            "Medium" => Self::Medium,
            "Low" => Self::Low,
            "Informational" => Self::Informational,
            _ => Self::Unknown,
        }
    }
}

/// One de-duplicated scanner alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    /// Alert name.
    pub name: String,
    /// Risk level.
    pub risk: RiskLevel,
    /// Scanner confidence label.
    pub confidence: String,
    /// URL where the alert was raised.
    pub url: String,
    /// Description.
    pub description: String,
    /// Suggested fix.
    pub solution: String,
    /// Reference links.
    pub reference: String,
    /// Evidence snippet, if any.
    pub evidence: Option<String>,
    /// CWE identifier.
    pub cwe_id: Option<String>,
    /// WASC identifier.
    pub wasc_id: Option<String>,
    /// Scanner rule reference used for de-duplication.
    pub alert_ref: Option<String>,
}

/// Security scan result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Alerts raised for the target.
    pub alerts: Vec<SecurityAlert>,
}
