//! Trend and anomaly reports produced by a text-generation model.
//!
//! The reporter serializes one week of performance and security history,
//! asks the model for per-metric findings, and combines them with the
//! actionable items of the latest scans. Model output is parsed strictly:
//! anything that is not a JSON list of findings yields no findings.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::domain::{
    Opportunity, PerformanceAudit, ProbeKind, RiskLevel, ScanRecord, SecurityAlert, TimeWindow,
    TrackedUrl,
};
use crate::error::SitewatchError;
use crate::persistence::SnapshotStore;

/// Minimum estimated savings for an opportunity to be suggested.
const SUGGESTION_MIN_SAVINGS_MS: f64 = 500.0;

/// How many recent records to inspect when looking for the latest
/// successful scan.
const LATEST_LOOKBACK: usize = 10;

const PERFORMANCE_PROMPT: &str = "You are given a JSON time series of web page performance \
measurements, oldest first, audited separately for the mobile and desktop form factors \
(formFactor). For each metric (for example pageLoadTime, lcp, tbt) decide whether \
it shows a trend (\"increasing\", \"decreasing\" or \"stable\") or an anomaly, meaning a value \
that deviates significantly from the others. Omit metrics with neither. Answer with a JSON array \
only, one object per metric with the fields metricName (string), trend (string or null), \
anomaly (boolean) and reason (string explaining the likely cause). Do not add any other text.\n\
Dataset: {{metrics}}";

const SECURITY_PROMPT: &str = "You are given a JSON time series of security scan alert counts \
per risk level (high, medium, low, info), oldest first. For each risk level decide whether it \
shows a trend (\"increasing\", \"decreasing\" or \"stable\") or an anomaly, meaning a count that \
deviates significantly from the others. Omit levels with neither. Answer with a JSON array only, \
one object per metric with the fields metricName (string), trend (string or null), anomaly \
(boolean) and reason (string explaining the likely cause). Do not add any other text.\n\
Dataset: {{metrics}}";

/// A single-prompt text-generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    /// Returns the model's reply to `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::TextGeneration`] if the service cannot be
    /// reached or answers with an error.
    async fn complete(&self, prompt: &str) -> Result<String, SitewatchError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// [`TextGenerator`] backed by Groq's OpenAI-compatible chat completions
/// endpoint.
#[derive(Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: String,
    model: String,
}

impl fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroqClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GroqClient {
    /// Creates a client for the chat completions `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Internal`] if the endpoint is not a valid
    /// URL or the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SitewatchError> {
        let endpoint = url::Url::parse(endpoint)
            .map_err(|e| SitewatchError::Internal(format!("groq endpoint {endpoint:?}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SitewatchError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl TextGenerator for GroqClient {
    async fn complete(&self, prompt: &str) -> Result<String, SitewatchError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SitewatchError::TextGeneration(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SitewatchError::TextGeneration(format!(
                "model returned {status}: {body}"
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| SitewatchError::TextGeneration(format!("response body: {e}")))?;
        Ok(reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

/// One per-metric observation returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Finding {
    /// Metric the finding is about.
    #[serde(alias = "metricName")]
    pub metric_name: String,
    /// Observed trend, if any.
    #[serde(default)]
    pub trend: Option<String>,
    /// Whether the model flagged an anomaly.
    #[serde(default)]
    pub anomaly: bool,
    /// Likely cause.
    #[serde(default)]
    pub reason: String,
}

impl Finding {
    /// Returns `true` for an increasing or decreasing trend.
    #[must_use]
    pub fn is_directional(&self) -> bool {
        self.trend.as_deref().is_some_and(|t| {
            let t = t.trim();
            t.eq_ignore_ascii_case("increasing") || t.eq_ignore_ascii_case("decreasing")
        })
    }
}

fn span(content: &str, open: char, close: char) -> Option<&str> {
    let start = content.find(open)?;
    let end = content.rfind(close)?;
    content.get(start..=end)
}

/// Extracts findings from free-form model output.
///
/// The first `[` through the last `]` is parsed as a JSON array; failing
/// that, a JSON object is accepted and its values are taken as the list.
/// Elements that are not findings are skipped. Anything else yields an
/// empty list.
#[must_use]
pub fn parse_findings(content: &str) -> Vec<Finding> {
    let items = span(content, '[', ']')
        .and_then(|s| serde_json::from_str::<Vec<Value>>(s).ok())
        .or_else(|| {
            span(content, '{', '}')
                .and_then(|s| serde_json::from_str::<serde_json::Map<String, Value>>(s).ok())
                .map(|map| map.into_iter().map(|(_, v)| v).collect())
        })
        .unwrap_or_default();

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Trend and anomaly report for one URL.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InsightReport {
    /// Reported URL.
    #[schema(value_type = String)]
    pub url: TrackedUrl,
    /// Report time.
    pub generated_at: DateTime<Utc>,
    /// Findings with an increasing or decreasing trend.
    pub trends: Vec<Finding>,
    /// Findings flagged as anomalies.
    pub anomalies: Vec<Finding>,
    /// Opportunities of the latest audit worth more than 500 ms.
    #[schema(value_type = Vec<Object>)]
    pub performance_suggestions: Vec<Opportunity>,
    /// Alerts of the highest risk level present in the latest scan.
    #[schema(value_type = Vec<Object>)]
    pub security_suggestions: Vec<SecurityAlert>,
}

/// Builds [`InsightReport`]s from the snapshot store.
#[derive(Debug, Clone)]
pub struct AnomalyReporter {
    snapshots: Arc<dyn SnapshotStore>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl AnomalyReporter {
    /// Creates a reporter. Without a generator, reports carry no findings.
    #[must_use]
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            snapshots,
            generator,
        }
    }

    /// Builds the report for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::Persistence`] if the store cannot be read
    /// and [`SitewatchError::TextGeneration`] if the model service fails.
    /// Unparsable model output is not an error.
    pub async fn report(&self, url: &TrackedUrl) -> Result<InsightReport, SitewatchError> {
        let now = Utc::now();
        let since = TimeWindow::Week.since(now).unwrap_or(now);

        let findings = match &self.generator {
            Some(generator) => {
                let performance = self
                    .snapshots
                    .range(url, ProbeKind::Performance, since)
                    .await?;
                let security = self.snapshots.range(url, ProbeKind::Security, since).await?;

                let mut findings = Vec::new();
                for (category, template, series) in [
                    ("performance", PERFORMANCE_PROMPT, performance_series(&performance)),
                    ("security", SECURITY_PROMPT, security_series(&security)),
                ] {
                    if series.is_empty() {
                        continue;
                    }
                    let prompt = render_prompt(template, &series)?;
                    let content = generator.complete(&prompt).await?;
                    let parsed = parse_findings(&content);
                    if parsed.is_empty() {
                        tracing::warn!(%url, category, "model output contained no findings");
                    }
                    findings.extend(parsed);
                }
                findings
            }
            None => {
                tracing::warn!(%url, "no text generator configured, skipping trend analysis");
                Vec::new()
            }
        };

        let performance_suggestions = self
            .latest_success(url, ProbeKind::Performance)
            .await?
            .and_then(|r| r.performance().map(worthwhile_opportunities))
            .unwrap_or_default();

        let security_suggestions = self
            .latest_success(url, ProbeKind::Security)
            .await?
            .and_then(|r| r.security().map(|s| highest_risk_alerts(&s.alerts)))
            .unwrap_or_default();

        let (trends, anomalies) = split_findings(findings);
        Ok(InsightReport {
            url: url.clone(),
            generated_at: now,
            trends,
            anomalies,
            performance_suggestions,
            security_suggestions,
        })
    }

    async fn latest_success(
        &self,
        url: &TrackedUrl,
        kind: ProbeKind,
    ) -> Result<Option<ScanRecord>, SitewatchError> {
        Ok(self
            .snapshots
            .recent(url, kind, LATEST_LOOKBACK)
            .await?
            .into_iter()
            .find(|r| r.outcome.is_success()))
    }
}

/// A finding may be both a trend and an anomaly.
fn split_findings(findings: Vec<Finding>) -> (Vec<Finding>, Vec<Finding>) {
    let trends = findings
        .iter()
        .filter(|f| f.is_directional())
        .cloned()
        .collect();
    let anomalies = findings.into_iter().filter(|f| f.anomaly).collect();
    (trends, anomalies)
}

/// Opportunities above the savings threshold across form factors, mobile
/// first, one per title.
fn worthwhile_opportunities(audit: &PerformanceAudit) -> Vec<Opportunity> {
    let mut picked: Vec<Opportunity> = Vec::new();
    for opportunity in audit.reports().flat_map(|r| r.opportunities.iter()) {
        let worthwhile = opportunity
            .estimated_savings_ms
            .is_some_and(|ms| ms > SUGGESTION_MIN_SAVINGS_MS);
        if worthwhile && !picked.iter().any(|p| p.title == opportunity.title) {
            picked.push(opportunity.clone());
        }
    }
    picked
}

fn highest_risk_alerts(alerts: &[SecurityAlert]) -> Vec<SecurityAlert> {
    RiskLevel::CLASSIFIED
        .iter()
        .map(|level| {
            alerts
                .iter()
                .filter(|a| a.risk == *level)
                .cloned()
                .collect::<Vec<_>>()
        })
        .find(|matching| !matching.is_empty())
        .unwrap_or_default()
}

fn render_prompt(template: &str, series: &[Value]) -> Result<String, SitewatchError> {
    let metrics = serde_json::to_string(series)
        .map_err(|e| SitewatchError::Internal(format!("serialize series: {e}")))?;
    Ok(template.replace("{{metrics}}", &metrics))
}

fn performance_series(records: &[ScanRecord]) -> Vec<Value> {
    records
        .iter()
        .filter_map(|r| r.performance().map(|a| (r.collected_at, a)))
        .flat_map(|(collected_at, audit)| {
            audit.reports().map(move |p| {
                json!({
                    "collectedAt": collected_at,
                    "formFactor": p.form_factor,
                    "score": p.score,
                    "pageLoadTime": p.page_load_time,
                    "lcp": p.web_vitals.lcp,
                    "fid": p.web_vitals.fid,
                    "cls": p.web_vitals.cls,
                    "fcp": p.web_vitals.fcp,
                    "tbt": p.web_vitals.tbt,
                    "serverResponseTime": p.server_response_time,
                    "bootupTime": p.bootup_time,
                    "totalPageWeight": p.total_page_weight,
                    "httpRequests": p.http_requests,
                })
            })
        })
        .collect()
}

fn security_series(records: &[ScanRecord]) -> Vec<Value> {
    records
        .iter()
        .filter_map(|r| {
            let s = r.security()?;
            let count = |level: RiskLevel| s.alerts.iter().filter(|a| a.risk == level).count();
            Some(json!({
                "collectedAt": r.collected_at,
                "high": count(RiskLevel::High),
                "medium": count(RiskLevel::Medium),
                "low": count(RiskLevel::Low),
                "info": count(RiskLevel::Informational),
            }))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{FormFactor, PerformanceReport, ProbePayload, ScanOutcome, SecurityReport};
    use crate::persistence::MemoryStore;

    #[derive(Debug, Default)]
    struct ScriptedGenerator {
        performance: String,
        security: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, prompt: &str) -> Result<String, SitewatchError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            if prompt.contains("pageLoadTime") {
                Ok(self.performance.clone())
            } else {
                Ok(self.security.clone())
            }
        }
    }

    #[derive(Debug)]
    struct DownGenerator;

    #[async_trait]
    impl TextGenerator for DownGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, SitewatchError> {
            Err(SitewatchError::TextGeneration("connection refused".to_string()))
        }
    }

    fn url() -> TrackedUrl {
        let Ok(url) = TrackedUrl::parse("https://example.com") else {
            panic!("valid url");
        };
        url
    }

    fn opportunity(title: &str, savings: f64) -> Opportunity {
        Opportunity {
            title: title.to_string(),
            description: String::new(),
            score: Some(0.3),
            estimated_savings_ms: Some(savings),
        }
    }

    fn alert(name: &str, risk: RiskLevel) -> SecurityAlert {
        SecurityAlert {
            name: name.to_string(),
            risk,
            confidence: "High".to_string(),
            url: "https://example.com/".to_string(),
            description: String::new(),
            solution: String::new(),
            reference: String::new(),
            evidence: None,
            cwe_id: None,
            wasc_id: None,
            alert_ref: None,
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let performance = PerformanceAudit {
            mobile: Some(PerformanceReport {
                form_factor: FormFactor::Mobile,
                page_load_time: Some(1800.0),
                opportunities: vec![
                    opportunity("Eliminate render-blocking resources", 900.0),
                    opportunity("Reduce unused CSS", 120.0),
                ],
                ..PerformanceReport::default()
            }),
            desktop: Some(PerformanceReport {
                form_factor: FormFactor::Desktop,
                page_load_time: Some(700.0),
                opportunities: vec![
                    opportunity("Eliminate render-blocking resources", 610.0),
                    opportunity("Serve images in modern formats", 520.0),
                ],
                ..PerformanceReport::default()
            }),
            errors: Vec::new(),
        };
        let security = SecurityReport {
            alerts: vec![
                alert("Missing Anti-clickjacking Header", RiskLevel::Medium),
                alert("Cookie No HttpOnly Flag", RiskLevel::Low),
                alert("Content Security Policy Header Not Set", RiskLevel::Medium),
            ],
        };
        for (kind, payload) in [
            (ProbeKind::Performance, ProbePayload::Performance(performance)),
            (ProbeKind::Security, ProbePayload::Security(security)),
        ] {
            let record = ScanRecord::new(url(), kind, ScanOutcome::Success { payload });
            let Ok(_) = store.append(&record).await else {
                panic!("append");
            };
        }
        store
    }

    #[test]
    fn parses_array_embedded_in_prose() {
        let content = r#"Here is the analysis:
[{"metricName":"lcp","trend":"increasing","anomaly":false,"reason":"heavier hero image"},
 {"metricName":"tbt","trend":null,"anomaly":true,"reason":"one slow run"}]
Let me know if you need more."#;
        let findings = parse_findings(content);
        assert_eq!(findings.len(), 2);
        assert!(findings.first().is_some_and(Finding::is_directional));
        assert!(findings.get(1).is_some_and(|f| f.anomaly && f.trend.is_none()));
    }

    #[test]
    fn parses_object_of_findings() {
        let content = r#"{"high":{"metricName":"high","trend":"Decreasing","anomaly":false,"reason":"fixes deployed"}}"#;
        let findings = parse_findings(content);
        assert_eq!(findings.len(), 1);
        assert!(findings.first().is_some_and(Finding::is_directional));
    }

    #[test]
    fn malformed_output_yields_nothing() {
        assert!(parse_findings("I cannot analyze this dataset.").is_empty());
        assert!(parse_findings("[not json]").is_empty());
        assert!(parse_findings("").is_empty());
    }

    #[test]
    fn stable_is_not_a_trend() {
        let finding = Finding {
            metric_name: "cls".to_string(),
            trend: Some("stable".to_string()),
            anomaly: false,
            reason: String::new(),
        };
        assert!(!finding.is_directional());
    }

    #[tokio::test]
    async fn report_combines_findings_and_suggestions() {
        let store = seeded_store().await;
        let generator = Arc::new(ScriptedGenerator {
            performance: r#"[{"metricName":"pageLoadTime","trend":"increasing","anomaly":true,"reason":"new scripts"}]"#.to_string(),
            security: "no idea".to_string(),
            ..ScriptedGenerator::default()
        });
        let reporter = AnomalyReporter::new(
            Arc::clone(&store) as Arc<dyn SnapshotStore>,
            Some(Arc::clone(&generator) as Arc<dyn TextGenerator>),
        );

        let Ok(report) = reporter.report(&url()).await else {
            panic!("report");
        };
        assert_eq!(report.trends.len(), 1);
        assert_eq!(report.anomalies.len(), 1);
        let titles: Vec<_> = report
            .performance_suggestions
            .iter()
            .map(|o| o.title.as_str())
            .collect();
        assert_eq!(
            titles,
            vec![
                "Eliminate render-blocking resources",
                "Serve images in modern formats"
            ]
        );
        assert_eq!(
            report
                .performance_suggestions
                .first()
                .and_then(|o| o.estimated_savings_ms),
            Some(900.0)
        );
        assert_eq!(report.security_suggestions.len(), 2);
        assert!(
            report
                .security_suggestions
                .iter()
                .all(|a| a.risk == RiskLevel::Medium)
        );

        let Ok(prompts) = generator.prompts.lock() else {
            panic!("lock");
        };
        assert_eq!(prompts.len(), 2);
        assert!(prompts.iter().any(|p| p.contains("\"medium\":2")));
        assert!(prompts.iter().any(|p| p.contains("\"formFactor\":\"desktop\"")));
    }

    #[tokio::test]
    async fn without_generator_findings_are_empty() {
        let store = seeded_store().await;
        let reporter = AnomalyReporter::new(store, None);
        let Ok(report) = reporter.report(&url()).await else {
            panic!("report");
        };
        assert!(report.trends.is_empty());
        assert!(report.anomalies.is_empty());
        assert_eq!(report.performance_suggestions.len(), 2);
    }

    #[tokio::test]
    async fn model_outage_is_reported() {
        let store = seeded_store().await;
        let reporter = AnomalyReporter::new(store, Some(Arc::new(DownGenerator)));
        assert!(matches!(
            reporter.report(&url()).await,
            Err(SitewatchError::TextGeneration(_))
        ));
    }

    #[tokio::test]
    async fn groq_client_sends_bearer_and_reads_first_choice() {
        use axum::Router;
        use axum::http::{HeaderMap, StatusCode};
        use axum::routing::post;

        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, body: axum::Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer test-key");
                if !authorized || body.get("model").and_then(Value::as_str) != Some("tiny") {
                    return (StatusCode::UNAUTHORIZED, axum::Json(json!({})));
                }
                (
                    StatusCode::OK,
                    axum::Json(json!({"choices": [{"message": {"role": "assistant", "content": "[]"}}]})),
                )
            }),
        );
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let endpoint = format!("http://{addr}/v1/chat/completions");
        let Ok(client) = GroqClient::new(&endpoint, "test-key", "tiny", Duration::from_secs(5))
        else {
            panic!("client");
        };
        let Ok(reply) = client.complete("hello").await else {
            panic!("completion");
        };
        assert_eq!(reply, "[]");

        let Ok(wrong) = GroqClient::new(&endpoint, "other", "tiny", Duration::from_secs(5)) else {
            panic!("client");
        };
        assert!(matches!(
            wrong.complete("hello").await,
            Err(SitewatchError::TextGeneration(_))
        ));
    }
}
