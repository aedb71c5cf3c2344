//! Pure summary statistics over snapshot series.
//!
//! Every function ignores failed records and returns `None` when nothing
//! usable remains, so callers never see a NaN average.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{FormFactor, PerformanceReport, RiskLevel, ScanRecord};

/// Order statistics of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Distribution {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub avg: f64,
    /// Median (mean of the two middle values for even sizes).
    pub median: f64,
    /// 95th percentile: `sorted[floor(0.95 * n)]`.
    pub p95: f64,
    /// Number of values.
    pub samples: usize,
}

/// Computes a [`Distribution`] over the finite values in `values`.
#[must_use]
pub fn distribution(values: &[f64]) -> Option<Distribution> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mid = n / 2;
    let median = if n % 2 == 0 {
        (sorted.get(mid - 1)? + sorted.get(mid)?) / 2.0
    } else {
        *sorted.get(mid)?
    };
    let p95_index = ((0.95 * n as f64).floor() as usize).min(n - 1);

    Some(Distribution {
        min: *sorted.first()?,
        max: *sorted.last()?,
        avg: sorted.iter().sum::<f64>() / n as f64,
        median,
        p95: *sorted.get(p95_index)?,
        samples: n,
    })
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Averaged core web vitals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct WebVitalsSummary {
    /// Mean largest contentful paint.
    pub lcp: Option<f64>,
    /// Mean max potential first input delay.
    pub fid: Option<f64>,
    /// Mean cumulative layout shift.
    pub cls: Option<f64>,
    /// Mean first contentful paint.
    pub fcp: Option<f64>,
    /// Mean total blocking time.
    pub tbt: Option<f64>,
}

/// Performance statistics over a window.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PerformanceSummary {
    /// Emulated device the audits were run with.
    #[schema(value_type = String, example = "mobile")]
    pub form_factor: FormFactor,
    /// Successful audits in the window.
    pub samples: usize,
    /// Oldest audit in the window.
    pub first_collected_at: DateTime<Utc>,
    /// Newest audit in the window.
    pub last_collected_at: DateTime<Utc>,
    /// Mean category score.
    pub avg_score: Option<f64>,
    /// Page load time (speed index).
    pub page_load_time: Option<Distribution>,
    /// Mean web vitals.
    pub web_vitals: WebVitalsSummary,
    /// Server response time.
    pub server_response_time: Option<Distribution>,
    /// Script bootup time.
    pub bootup_time: Option<Distribution>,
    /// Mean transferred bytes.
    pub avg_page_weight: Option<f64>,
    /// Mean number of requests.
    pub avg_http_requests: Option<f64>,
}

/// Summarizes the `form_factor` audits of successful performance
/// records. Scans where only the other form factor succeeded are skipped.
#[must_use]
pub fn summarize_performance(
    records: &[ScanRecord],
    form_factor: FormFactor,
) -> Option<PerformanceSummary> {
    let audits: Vec<_> = records
        .iter()
        .filter_map(|r| {
            r.performance()
                .and_then(|a| a.report(form_factor))
                .map(|p| (r.collected_at, p))
        })
        .collect();
    let first_collected_at = audits.iter().map(|(at, _)| *at).min()?;
    let last_collected_at = audits.iter().map(|(at, _)| *at).max()?;

    let collect = |f: fn(&PerformanceReport) -> Option<f64>| -> Vec<f64> {
        audits.iter().filter_map(|(_, p)| f(p)).collect()
    };

    Some(PerformanceSummary {
        form_factor,
        samples: audits.len(),
        first_collected_at,
        last_collected_at,
        avg_score: mean(collect(|p| p.score)),
        page_load_time: distribution(&collect(|p| p.page_load_time)),
        web_vitals: WebVitalsSummary {
            lcp: mean(collect(|p| p.web_vitals.lcp)),
            fid: mean(collect(|p| p.web_vitals.fid)),
            cls: mean(collect(|p| p.web_vitals.cls)),
            fcp: mean(collect(|p| p.web_vitals.fcp)),
            tbt: mean(collect(|p| p.web_vitals.tbt)),
        },
        server_response_time: distribution(&collect(|p| p.server_response_time)),
        bootup_time: distribution(&collect(|p| p.bootup_time)),
        avg_page_weight: mean(collect(|p| p.total_page_weight)),
        avg_http_requests: mean(collect(|p| p.http_requests.map(|n| n as f64))),
    })
}

/// A value per classified risk level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RiskBreakdown<T> {
    /// High risk.
    pub high: T,
    /// Medium risk.
    pub medium: T,
    /// Low risk.
    pub low: T,
    /// Informational.
    pub informational: T,
}

impl<T: Copy> RiskBreakdown<T> {
    fn map<U>(self, f: impl Fn(T) -> U) -> RiskBreakdown<U> {
        RiskBreakdown {
            high: f(self.high),
            medium: f(self.medium),
            low: f(self.low),
            informational: f(self.informational),
        }
    }
}

impl RiskBreakdown<u64> {
    fn bump(&mut self, risk: RiskLevel) {
        match risk {
            RiskLevel::High => self.high += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::Low => self.low += 1,
            RiskLevel::Informational => self.informational += 1,
            RiskLevel::Unknown => {}
        }
    }

    fn total(&self) -> u64 {
        self.high + self.medium + self.low + self.informational
    }
}

/// Alert families recognised by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// Name mentions SQL.
    SqlInjection,
    /// Name mentions scripting.
    CrossSiteScripting,
    /// Name mentions forgery.
    RequestForgery,
    /// Name mentions disclosure.
    InformationDisclosure,
    /// Name mentions something missing (usually a header).
    MissingHeaders,
    /// Anything else.
    Other,
}

impl AlertCategory {
    /// Every category in reporting order.
    pub const ALL: [Self; 6] = [
        Self::SqlInjection,
        Self::CrossSiteScripting,
        Self::RequestForgery,
        Self::InformationDisclosure,
        Self::MissingHeaders,
        Self::Other,
    ];

    /// Classifies an alert by its name, first match wins.
    #[must_use]
    pub fn classify(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("sql") {
            Self::SqlInjection
        } else if name.contains("scripting") {
            Self::CrossSiteScripting
        } else if name.contains("forgery") {
            Self::RequestForgery
        } else if name.contains("disclosure") {
            Self::InformationDisclosure
        } else if name.contains("missing") {
            Self::MissingHeaders
        } else {
            Self::Other
        }
    }
}

/// Alert occurrences of one category.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CategoryCount {
    /// Category.
    pub category: AlertCategory,
    /// Occurrences across all scans.
    pub count: u64,
    /// Distinct alert names seen.
    pub alert_names: Vec<String>,
}

/// Security statistics over a window.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SecuritySummary {
    /// Successful scans in the window.
    pub scans: usize,
    /// Alerts per risk level across all scans.
    #[schema(value_type = Object)]
    pub total_by_risk: RiskBreakdown<u64>,
    /// Alerts per risk level per scan, rounded up.
    #[schema(value_type = Object)]
    pub average_per_scan: RiskBreakdown<u64>,
    /// Share of each risk level in percent; all zero when there are no
    /// alerts.
    #[schema(value_type = Object)]
    pub percentage_by_risk: RiskBreakdown<f64>,
    /// Occurrences by alert family (empty families omitted).
    pub by_category: Vec<CategoryCount>,
}

/// Summarizes successful security records.
#[must_use]
pub fn summarize_security(records: &[ScanRecord]) -> Option<SecuritySummary> {
    let scans: Vec<_> = records.iter().filter_map(ScanRecord::security).collect();
    if scans.is_empty() {
        return None;
    }

    let mut totals = RiskBreakdown::<u64>::default();
    let mut categories: Vec<(u64, BTreeSet<String>)> =
        AlertCategory::ALL.iter().map(|_| (0, BTreeSet::new())).collect();

    for alert in scans.iter().flat_map(|s| &s.alerts) {
        totals.bump(alert.risk);
        let category = AlertCategory::classify(&alert.name);
        if let Some(index) = AlertCategory::ALL.iter().position(|c| *c == category)
            && let Some((count, names)) = categories.get_mut(index)
        {
            *count += 1;
            names.insert(alert.name.clone());
        }
    }

    let scan_count = scans.len() as u64;
    let total = totals.total();
    let percentage_by_risk = if total == 0 {
        RiskBreakdown::default()
    } else {
        totals.map(|n| n as f64 / total as f64 * 100.0)
    };

    let by_category = AlertCategory::ALL
        .iter()
        .zip(categories)
        .filter(|(_, (count, _))| *count > 0)
        .map(|(category, (count, names))| CategoryCount {
            category: *category,
            count,
            alert_names: names.into_iter().collect(),
        })
        .collect();

    Some(SecuritySummary {
        scans: scans.len(),
        total_by_risk: totals,
        average_per_scan: totals.map(|n| n.div_ceil(scan_count)),
        percentage_by_risk,
        by_category,
    })
}

/// Network statistics over a window.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct NetworkSummary {
    /// Successful diagnostics in the window.
    pub samples: usize,
    /// Round-trip times across all ping replies.
    pub latency: Option<Distribution>,
    /// Mean packet loss in percent.
    pub avg_packet_loss: Option<f64>,
    /// Fraction of pings with at least one reply, `0..=1`.
    pub availability: Option<f64>,
    /// Certificate days remaining at the latest check.
    pub certificate_days_remaining: Option<i64>,
    /// Hop count of the latest traceroute.
    pub latest_hop_count: Option<usize>,
}

/// Summarizes successful network records.
#[must_use]
pub fn summarize_network(records: &[ScanRecord]) -> Option<NetworkSummary> {
    let mut reports: Vec<_> = records
        .iter()
        .filter_map(|r| r.network().map(|n| (r.collected_at, n)))
        .collect();
    if reports.is_empty() {
        return None;
    }
    reports.sort_by_key(|(at, _)| *at);

    let pings: Vec<_> = reports.iter().filter_map(|(_, n)| n.ping.as_ref()).collect();
    let rtts: Vec<f64> = pings.iter().flat_map(|p| p.samples.iter().copied()).collect();
    let availability = (!pings.is_empty())
        .then(|| pings.iter().filter(|p| p.alive).count() as f64 / pings.len() as f64);

    Some(NetworkSummary {
        samples: reports.len(),
        latency: distribution(&rtts),
        avg_packet_loss: mean(pings.iter().map(|p| p.packet_loss_pct)),
        availability,
        certificate_days_remaining: reports
            .iter()
            .rev()
            .find_map(|(_, n)| n.certificate.as_ref().and_then(|c| c.days_remaining)),
        latest_hop_count: reports
            .iter()
            .rev()
            .find_map(|(_, n)| n.traceroute.as_ref().map(Vec::len)),
    })
}
