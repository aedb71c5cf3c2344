//! Page performance audits through the `lighthouse` CLI.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::process::run_command;
use super::retry::{RetryPolicy, retry};
use super::{Probe, ProbeError};
use crate::domain::{
    FormFactor, Opportunity, PerformanceAudit, PerformanceReport, ProbeKind, ProbePayload,
    TrackedUrl, WebVitals,
};

/// Headroom on top of the worst-case retry schedule, for spawning Chrome
/// and parsing the report.
const AUDIT_BUDGET_SLACK: Duration = Duration::from_secs(30);

/// Runs Lighthouse against headless Chrome once per form factor and
/// extracts the performance category.
#[derive(Debug, Clone)]
pub struct LighthouseProbe {
    bin: String,
    form_factors: Vec<FormFactor>,
    policy: RetryPolicy,
    run_timeout: Duration,
}

impl LighthouseProbe {
    /// Creates a probe invoking `bin` for each of `form_factors` (both
    /// when empty). Each attempt is bounded by `run_timeout`.
    #[must_use]
    pub fn new(
        bin: impl Into<String>,
        form_factors: &[FormFactor],
        policy: RetryPolicy,
        run_timeout: Duration,
    ) -> Self {
        let mut selected: Vec<FormFactor> = Vec::with_capacity(FormFactor::ALL.len());
        for ff in form_factors {
            if !selected.contains(ff) {
                selected.push(*ff);
            }
        }
        if selected.is_empty() {
            selected = FormFactor::ALL.to_vec();
        }
        Self {
            bin: bin.into(),
            form_factors: selected,
            policy,
            run_timeout,
        }
    }

    fn args(url: &TrackedUrl, form_factor: FormFactor) -> Vec<String> {
        let mut args = vec![
            url.as_str().to_string(),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--only-categories=performance".to_string(),
            "--quiet".to_string(),
            "--chrome-flags=--headless=new --no-sandbox --disable-gpu".to_string(),
        ];
        if form_factor == FormFactor::Desktop {
            args.push("--preset=desktop".to_string());
        }
        args
    }

    async fn audit(
        &self,
        url: &TrackedUrl,
        form_factor: FormFactor,
    ) -> Result<PerformanceReport, ProbeError> {
        let args = &Self::args(url, form_factor);
        let bin = self.bin.as_str();
        let timeout = self.run_timeout;
        let output = retry(self.policy, "lighthouse", || async move {
            run_command(bin, args, None, timeout).await?.check(bin)
        })
        .await?;
        parse_report(&output.stdout, form_factor)
    }
}

#[async_trait]
impl Probe for LighthouseProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Performance
    }

    /// Every form factor may use its full retry schedule.
    fn time_budget(&self) -> Option<Duration> {
        let per_audit = self.policy.worst_case(self.run_timeout);
        let audits = u32::try_from(self.form_factors.len()).unwrap_or(u32::MAX);
        Some(per_audit.saturating_mul(audits) + AUDIT_BUDGET_SLACK)
    }

    async fn run(&self, url: &TrackedUrl) -> Result<ProbePayload, ProbeError> {
        let mut audit = PerformanceAudit::default();
        let mut last_error = None;
        for &form_factor in &self.form_factors {
            match self.audit(url, form_factor).await {
                Ok(report) => {
                    tracing::debug!(
                        url = %url,
                        %form_factor,
                        score = ?report.score,
                        "lighthouse report parsed"
                    );
                    audit.insert(report);
                }
                Err(e) => {
                    tracing::warn!(url = %url, %form_factor, error = %e, "lighthouse audit failed");
                    audit.errors.push(format!("{form_factor}: {e}"));
                    last_error = Some(e);
                }
            }
        }

        if audit.reports().next().is_none()
            && let Some(e) = last_error
        {
            return Err(e);
        }
        Ok(ProbePayload::Performance(audit))
    }
}

fn numeric(audits: &Value, id: &str) -> Option<f64> {
    audits
        .get(id)
        .and_then(|a| a.get("numericValue"))
        .and_then(Value::as_f64)
}

fn text(audit: &Value, field: &str) -> String {
    audit
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Extracts a [`PerformanceReport`] from Lighthouse JSON output.
///
/// # Errors
///
/// Returns [`ProbeError::Parse`] if the output is not a Lighthouse
/// result, and [`ProbeError::Rejected`] if Lighthouse reports that the
/// page could not be audited.
pub fn parse_report(raw: &str, form_factor: FormFactor) -> Result<PerformanceReport, ProbeError> {
    let lhr: Value =
        serde_json::from_str(raw).map_err(|e| ProbeError::Parse(format!("lighthouse json: {e}")))?;

    if let Some(err) = lhr.get("runtimeError")
        && let Some(code) = err.get("code").and_then(Value::as_str)
        && code != "NO_ERROR"
    {
        let message = err.get("message").and_then(Value::as_str).unwrap_or(code);
        return Err(ProbeError::Rejected(message.to_string()));
    }

    let audits = lhr
        .get("audits")
        .filter(|a| a.is_object())
        .ok_or_else(|| ProbeError::Parse("missing audits".to_string()))?;

    let score = lhr
        .pointer("/categories/performance/score")
        .and_then(Value::as_f64)
        .map(|s| (s * 100.0).round());

    let http_requests = audits
        .pointer("/network-requests/details/items")
        .and_then(Value::as_array)
        .map(|items| items.len() as u64);

    let mut opportunities: Vec<Opportunity> = audits
        .as_object()
        .into_iter()
        .flat_map(|map| map.values())
        .filter(|audit| {
            audit.pointer("/details/type").and_then(Value::as_str) == Some("opportunity")
        })
        .filter(|audit| {
            audit
                .get("score")
                .and_then(Value::as_f64)
                .is_none_or(|s| s < 1.0)
        })
        .map(|audit| Opportunity {
            title: text(audit, "title"),
            description: text(audit, "description"),
            score: audit.get("score").and_then(Value::as_f64),
            estimated_savings_ms: audit
                .pointer("/details/overallSavingsMs")
                .and_then(Value::as_f64),
        })
        .collect();
    opportunities.sort_by(|a, b| {
        b.estimated_savings_ms
            .unwrap_or(0.0)
            .total_cmp(&a.estimated_savings_ms.unwrap_or(0.0))
    });

    Ok(PerformanceReport {
        form_factor,
        score,
        page_load_time: numeric(audits, "speed-index"),
        web_vitals: WebVitals {
            lcp: numeric(audits, "largest-contentful-paint"),
            fid: numeric(audits, "max-potential-fid"),
            cls: numeric(audits, "cumulative-layout-shift"),
            fcp: numeric(audits, "first-contentful-paint"),
            tbt: numeric(audits, "total-blocking-time"),
        },
        server_response_time: numeric(audits, "server-response-time"),
        bootup_time: numeric(audits, "bootup-time"),
        total_page_weight: numeric(audits, "total-byte-weight"),
        http_requests,
        opportunities,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::*;
    use crate::domain::{DedupQueue, EventBus};
    use crate::persistence::{MemoryStore, QueueStore, SnapshotStore};
    use crate::probe::Backoff;
    use crate::service::CollectionScheduler;

    const SAMPLE: &str = r#"{
        "categories": { "performance": { "score": 0.87 } },
        "audits": {
            "speed-index": { "numericValue": 2100.5 },
            "largest-contentful-paint": { "numericValue": 2500.0 },
            "cumulative-layout-shift": { "numericValue": 0.02 },
            "first-contentful-paint": { "numericValue": 900.0 },
            "total-blocking-time": { "numericValue": 120.0 },
            "server-response-time": { "numericValue": 80.0 },
            "bootup-time": { "numericValue": 640.0 },
            "total-byte-weight": { "numericValue": 1048576 },
            "network-requests": { "details": { "items": [{}, {}, {}] } },
            "render-blocking-resources": {
                "title": "Eliminate render-blocking resources",
                "description": "Resources are blocking the first paint.",
                "score": 0.4,
                "details": { "type": "opportunity", "overallSavingsMs": 750 }
            },
            "uses-text-compression": {
                "title": "Enable text compression",
                "description": "Compress text.",
                "score": 1,
                "details": { "type": "opportunity", "overallSavingsMs": 0 }
            },
            "unused-javascript": {
                "title": "Reduce unused JavaScript",
                "description": "Remove dead code.",
                "score": 0.5,
                "details": { "type": "opportunity", "overallSavingsMs": 300 }
            }
        }
    }"#;

    #[test]
    fn extracts_metrics_and_opportunities() {
        let Ok(report) = parse_report(SAMPLE, FormFactor::Mobile) else {
            panic!("sample should parse");
        };
        assert_eq!(report.score, Some(87.0));
        assert_eq!(report.page_load_time, Some(2100.5));
        assert_eq!(report.web_vitals.lcp, Some(2500.0));
        assert_eq!(report.http_requests, Some(3));
        assert_eq!(report.opportunities.len(), 2);
        assert_eq!(
            report.opportunities.first().map(|o| o.title.as_str()),
            Some("Eliminate render-blocking resources")
        );
    }

    #[test]
    fn missing_audits_are_none() {
        let Ok(report) = parse_report(SAMPLE, FormFactor::Desktop) else {
            panic!("sample should parse");
        };
        assert_eq!(report.web_vitals.fid, None);
        assert_eq!(report.form_factor, FormFactor::Desktop);
    }

    #[test]
    fn runtime_error_is_rejected() {
        let raw = r#"{"runtimeError":{"code":"FAILED_DOCUMENT_REQUEST","message":"net::ERR_NAME_NOT_RESOLVED"},"audits":{}}"#;
        assert!(matches!(
            parse_report(raw, FormFactor::Mobile),
            Err(ProbeError::Rejected(_))
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_report("Chrome crashed", FormFactor::Mobile),
            Err(ProbeError::Parse(_))
        ));
    }

    fn target() -> TrackedUrl {
        let Ok(url) = TrackedUrl::parse("https://example.com") else {
            panic!("valid url");
        };
        url
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
            backoff: Backoff::Fixed,
        }
    }

    /// Writes an executable stand-in for `lighthouse` into a fresh
    /// directory. Every call bumps a counter file; `body` sees the call
    /// number as `$n`.
    fn fake_lighthouse(body: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("sitewatch-lh-{}", uuid::Uuid::new_v4()));
        let Ok(()) = fs::create_dir_all(&dir) else {
            panic!("create temp dir");
        };
        let report = dir.join("report.json");
        let counter = dir.join("calls");
        let script = dir.join("lighthouse");
        let Ok(()) = fs::write(&report, SAMPLE) else {
            panic!("write report");
        };
        let text = format!(
            "#!/bin/sh\n\
             n=$(cat '{counter}' 2>/dev/null || echo 0)\n\
             n=$((n + 1))\n\
             echo \"$n\" > '{counter}'\n\
             {body}\n\
             cat '{report}'\n",
            counter = counter.display(),
            report = report.display(),
        );
        let Ok(()) = fs::write(&script, text) else {
            panic!("write script");
        };
        let Ok(()) = fs::set_permissions(&script, fs::Permissions::from_mode(0o755)) else {
            panic!("chmod script");
        };
        (script, counter)
    }

    fn cleanup(script: &Path) {
        if let Some(dir) = script.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    fn calls(counter: &Path) -> u32 {
        fs::read_to_string(counter)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    #[test]
    fn desktop_preset_only_for_desktop_audits() {
        let desktop = LighthouseProbe::args(&target(), FormFactor::Desktop);
        assert!(desktop.iter().any(|a| a == "--preset=desktop"));
        let mobile = LighthouseProbe::args(&target(), FormFactor::Mobile);
        assert!(!mobile.iter().any(|a| a.starts_with("--preset")));
    }

    #[test]
    fn audits_both_form_factors_by_default() {
        let probe = LighthouseProbe::new(
            "lighthouse",
            &[],
            RetryPolicy::default(),
            Duration::from_secs(60),
        );
        assert_eq!(probe.form_factors, FormFactor::ALL.to_vec());

        let desktop_only = LighthouseProbe::new(
            "lighthouse",
            &[FormFactor::Desktop, FormFactor::Desktop],
            RetryPolicy::default(),
            Duration::from_secs(60),
        );
        assert_eq!(desktop_only.form_factors, vec![FormFactor::Desktop]);
    }

    #[test]
    fn budget_covers_every_attempt_of_every_audit() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            backoff: Backoff::Exponential,
        };
        let timeout = Duration::from_secs(900);
        let probe = LighthouseProbe::new("lighthouse", &FormFactor::ALL, policy, timeout);
        let Some(budget) = probe.time_budget() else {
            panic!("lighthouse declares a budget");
        };
        // 2 audits x (3 x 900 s + 5 s + 10 s)
        assert!(budget >= Duration::from_secs(2 * 2715));
        assert!(budget > timeout);
    }

    #[tokio::test]
    async fn one_failed_form_factor_keeps_the_other() {
        let (script, counter) = fake_lighthouse(r#"[ "$n" -eq 2 ] && exit 1"#);
        let policy = RetryPolicy {
            max_attempts: 1,
            ..quick_policy()
        };
        let probe = LighthouseProbe::new(
            script.display().to_string(),
            &FormFactor::ALL,
            policy,
            Duration::from_secs(5),
        );

        let Ok(ProbePayload::Performance(audit)) = probe.run(&target()).await else {
            panic!("mobile audit should carry the scan");
        };
        assert_eq!(audit.mobile.as_ref().and_then(|r| r.score), Some(87.0));
        assert!(audit.desktop.is_none());
        assert_eq!(audit.errors.len(), 1);
        assert!(audit.errors.iter().all(|e| e.starts_with("desktop:")));
        assert_eq!(calls(&counter), 2);
        cleanup(&script);
    }

    #[tokio::test]
    async fn every_form_factor_failing_fails_the_scan() {
        let (script, _counter) = fake_lighthouse("echo 'chrome crashed' >&2; exit 1");
        let probe = LighthouseProbe::new(
            script.display().to_string(),
            &FormFactor::ALL,
            quick_policy(),
            Duration::from_secs(5),
        );
        assert!(matches!(
            probe.run(&target()).await,
            Err(ProbeError::NonZeroExit { .. })
        ));
        cleanup(&script);
    }

    #[tokio::test]
    async fn hung_attempt_is_retried_within_the_scan_budget() {
        // First call never finishes; the retry and the desktop audit answer.
        let (script, counter) = fake_lighthouse(r#"[ "$n" -eq 1 ] && exec sleep 30"#);
        let attempt_timeout = Duration::from_secs(1);
        let probe: Arc<dyn Probe> = Arc::new(LighthouseProbe::new(
            script.display().to_string(),
            &FormFactor::ALL,
            quick_policy(),
            attempt_timeout,
        ));

        // Same wiring as the server: the scheduler default equals the
        // per-attempt timeout.
        let store = Arc::new(MemoryStore::new());
        let queue = DedupQueue::new(Arc::clone(&store) as Arc<dyn QueueStore>);
        let scheduler = Arc::new(CollectionScheduler::new(
            Arc::new(queue),
            vec![probe],
            Arc::clone(&store) as Arc<dyn SnapshotStore>,
            EventBus::new(16),
            attempt_timeout,
        ));

        let _ = scheduler.submit(target()).await;
        let Ok(()) = tokio::time::timeout(Duration::from_secs(20), scheduler.wait_idle()).await
        else {
            panic!("scan did not finish");
        };

        let Ok(Some(record)) = store.latest(&target(), ProbeKind::Performance).await else {
            panic!("performance record expected");
        };
        let Some(audit) = record.performance() else {
            panic!("scan should succeed after the retry: {:?}", record.outcome);
        };
        assert!(audit.mobile.is_some());
        assert!(audit.desktop.is_some());
        assert!(audit.errors.is_empty());
        assert_eq!(calls(&counter), 3);
        cleanup(&script);
    }
}
