//! Security scans driven through the OWASP ZAP JSON API.
//!
//! One run is: spider the target, wait for completion, start an active
//! scan, wait again, then fetch the alerts raised for the target. Both
//! scans are registered with a [`ScanCleanup`] guard so they are removed
//! from the daemon on every exit path, including cancellation.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::retry::{PollStatus, RetryPolicy, poll_until, retry};
use super::{Probe, ProbeError};
use crate::domain::{
    ProbeKind, ProbePayload, RiskLevel, SecurityAlert, SecurityReport, TrackedUrl,
};

/// Upper bound on alerts fetched per scan.
const ALERT_PAGE_SIZE: &str = "5000";

/// Headroom on top of the two scan ceilings for starting scans and
/// fetching alerts.
const SCAN_BUDGET_SLACK: Duration = Duration::from_secs(120);

/// Which ZAP scanner a scan id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scanner {
    Spider,
    Active,
}

impl Scanner {
    const fn component(self) -> &'static str {
        match self {
            Self::Spider => "spider",
            Self::Active => "ascan",
        }
    }
}

/// Thin client for the ZAP JSON API.
#[derive(Debug, Clone)]
struct ZapApi {
    client: reqwest::Client,
    base: url::Url,
    api_key: Option<String>,
}

impl ZapApi {
    async fn call(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ProbeError> {
        let mut endpoint = self
            .base
            .join(path)
            .map_err(|e| ProbeError::Parse(format!("zap endpoint {path}: {e}")))?;
        {
            let mut query = endpoint.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(key) = &self.api_key {
                query.append_pair("apikey", key);
            }
        }

        let mut request = self.client.get(endpoint);
        if let Some(key) = &self.api_key {
            request = request.header("X-ZAP-API-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Connect(format!("zap request timed out: {e}"))
            } else {
                ProbeError::Connect(format!("zap unreachable: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Connect(format!("zap returned {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Rejected(format!("zap returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| ProbeError::Parse(format!("zap response: {e}")))
    }

    async fn start(&self, scanner: Scanner, target: &str) -> Result<String, ProbeError> {
        let path = format!("JSON/{}/action/scan/", scanner.component());
        let body = self.call(&path, &[("url", target)]).await?;
        body.get("scan")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProbeError::Parse(format!("no scan id in {body}")))
    }

    async fn progress(&self, scanner: Scanner, id: &str) -> Result<u8, ProbeError> {
        let path = format!("JSON/{}/view/status/", scanner.component());
        let body = self.call(&path, &[("scanId", id)]).await?;
        body.get("status")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProbeError::Parse(format!("no status in {body}")))
    }

    async fn remove(&self, scanner: Scanner, id: &str) {
        let path = format!("JSON/{}/action/removeScan/", scanner.component());
        if let Err(e) = self.call(&path, &[("scanId", id)]).await {
            tracing::warn!(scanner = scanner.component(), scan_id = id, error = %e, "zap scan cleanup failed");
        }
    }

    async fn alerts(&self, target: &str) -> Result<Vec<ZapAlert>, ProbeError> {
        let body = self
            .call(
                "JSON/core/view/alerts/",
                &[("baseurl", target), ("start", "0"), ("count", ALERT_PAGE_SIZE)],
            )
            .await?;
        let list = body
            .get("alerts")
            .cloned()
            .ok_or_else(|| ProbeError::Parse("no alerts field".to_string()))?;
        serde_json::from_value(list).map_err(|e| ProbeError::Parse(format!("zap alerts: {e}")))
    }
}

/// Removes registered scans from the daemon when dropped.
#[derive(Debug)]
struct ScanCleanup {
    api: ZapApi,
    scans: Vec<(Scanner, String)>,
}

impl ScanCleanup {
    fn register(&mut self, scanner: Scanner, id: String) {
        self.scans.push((scanner, id));
    }
}

impl Drop for ScanCleanup {
    fn drop(&mut self) {
        let scans = std::mem::take(&mut self.scans);
        if scans.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(count = scans.len(), "no runtime, zap scans left behind");
            return;
        };
        let api = self.api.clone();
        handle.spawn(async move {
            for (scanner, id) in scans.iter().rev() {
                api.remove(*scanner, id).await;
            }
        });
    }
}

/// Alert as returned by `core/view/alerts`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ZapAlert {
    name: Option<String>,
    alert: Option<String>,
    risk: String,
    confidence: String,
    url: String,
    description: String,
    solution: String,
    reference: String,
    evidence: String,
    cweid: String,
    wascid: String,
    #[serde(rename = "alertRef")]
    alert_ref: Option<String>,
    #[serde(rename = "pluginId")]
    plugin_id: Option<String>,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty() && trimmed != "-1").then(|| trimmed.to_string())
}

impl From<ZapAlert> for SecurityAlert {
    fn from(a: ZapAlert) -> Self {
        Self {
            name: a.name.or(a.alert).unwrap_or_default(),
            risk: RiskLevel::from_label(&a.risk),
            confidence: a.confidence,
            url: a.url,
            description: a.description,
            solution: a.solution,
            reference: a.reference,
            evidence: non_empty(a.evidence),
            cwe_id: non_empty(a.cweid),
            wasc_id: non_empty(a.wascid),
            alert_ref: a.alert_ref.or(a.plugin_id),
        }
    }
}

/// Keeps the first alert per `alertRef`; alerts without a reference are
/// keyed by name.
fn dedup_alerts(raw: Vec<ZapAlert>) -> Vec<SecurityAlert> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(SecurityAlert::from)
        .filter(|alert| {
            let key = alert
                .alert_ref
                .clone()
                .unwrap_or_else(|| format!("name:{}", alert.name));
            seen.insert(key)
        })
        .collect()
}

/// Security probe backed by a running ZAP daemon.
#[derive(Debug, Clone)]
pub struct ZapProbe {
    api: ZapApi,
    policy: RetryPolicy,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ZapProbe {
    /// Creates a probe for the daemon at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Parse`] if `api_url` is not a valid URL and
    /// [`ProbeError::Rejected`] if the HTTP client cannot be built.
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        policy: RetryPolicy,
        poll_interval: Duration,
        max_wait: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let mut base =
            url::Url::parse(api_url).map_err(|e| ProbeError::Parse(format!("{api_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProbeError::Rejected(format!("http client: {e}")))?;

        Ok(Self {
            api: ZapApi {
                client,
                base,
                api_key,
            },
            policy,
            poll_interval,
            max_wait,
        })
    }

    async fn wait_for(&self, scanner: Scanner, id: &str) -> Result<(), ProbeError> {
        let api = &self.api;
        poll_until(self.poll_interval, self.max_wait, || async move {
            let progress = api.progress(scanner, id).await?;
            tracing::debug!(scanner = scanner.component(), scan_id = id, progress, "zap scan progress");
            Ok(if progress >= 100 {
                PollStatus::Done(())
            } else {
                PollStatus::Pending
            })
        })
        .await
    }

    async fn start(&self, scanner: Scanner, target: &str) -> Result<String, ProbeError> {
        let api = &self.api;
        retry(self.policy, "zap scan start", || async move {
            api.start(scanner, target).await
        })
        .await
    }
}

#[async_trait]
impl Probe for ZapProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Security
    }

    /// Spider and active scan may each wait up to `max_wait`.
    fn time_budget(&self) -> Option<Duration> {
        Some(self.max_wait * 2 + SCAN_BUDGET_SLACK)
    }

    async fn run(&self, url: &TrackedUrl) -> Result<ProbePayload, ProbeError> {
        let target = url.as_str();
        let mut cleanup = ScanCleanup {
            api: self.api.clone(),
            scans: Vec::new(),
        };

        let spider = self.start(Scanner::Spider, target).await?;
        cleanup.register(Scanner::Spider, spider.clone());
        self.wait_for(Scanner::Spider, &spider).await?;
        tracing::debug!(url = %url, "spider finished");

        let active = self.start(Scanner::Active, target).await?;
        cleanup.register(Scanner::Active, active.clone());
        self.wait_for(Scanner::Active, &active).await?;
        tracing::debug!(url = %url, "active scan finished");

        let api = &self.api;
        let raw = retry(self.policy, "zap alerts", || async move {
            api.alerts(target).await
        })
        .await?;

        let alerts = dedup_alerts(raw);
        tracing::debug!(url = %url, alerts = alerts.len(), "zap alerts collected");
        Ok(ProbePayload::Security(SecurityReport { alerts }))
    }
}
