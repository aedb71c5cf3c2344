//! Shared harness: boots the router on an ephemeral port with in-memory
//! persistence and canned probes.

#![allow(dead_code, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::routing::get;

use sitewatch::analytics::{AnomalyReporter, TextGenerator};
use sitewatch::api;
use sitewatch::app_state::AppState;
use sitewatch::domain::{
    DedupQueue, EventBus, FormFactor, NetworkReport, PerformanceAudit, PerformanceReport,
    PingStats, ProbeKind, ProbePayload, RiskLevel, SecurityAlert, SecurityReport, TrackedUrl,
};
use sitewatch::error::SitewatchError;
use sitewatch::persistence::MemoryStore;
use sitewatch::probe::{Probe, ProbeError};
use sitewatch::service::CollectionScheduler;
use sitewatch::ws::handler::ws_handler;

/// Probe returning a fixed payload, or failing when `fail` is set.
#[derive(Debug)]
pub struct CannedProbe {
    kind: ProbeKind,
    fail: bool,
}

impl CannedProbe {
    pub fn ok(kind: ProbeKind) -> Arc<dyn Probe> {
        Arc::new(Self { kind, fail: false })
    }

    pub fn failing(kind: ProbeKind) -> Arc<dyn Probe> {
        Arc::new(Self { kind, fail: true })
    }
}

#[async_trait]
impl Probe for CannedProbe {
    fn kind(&self) -> ProbeKind {
        self.kind
    }

    async fn run(&self, url: &TrackedUrl) -> Result<ProbePayload, ProbeError> {
        if self.fail {
            return Err(ProbeError::Rejected("chrome exited".to_string()));
        }
        Ok(match self.kind {
            ProbeKind::Performance => ProbePayload::Performance(PerformanceAudit {
                mobile: Some(PerformanceReport {
                    form_factor: FormFactor::Mobile,
                    score: Some(91.0),
                    page_load_time: Some(1400.0),
                    http_requests: Some(24),
                    ..PerformanceReport::default()
                }),
                desktop: Some(PerformanceReport {
                    form_factor: FormFactor::Desktop,
                    score: Some(99.0),
                    page_load_time: Some(600.0),
                    http_requests: Some(24),
                    ..PerformanceReport::default()
                }),
                errors: Vec::new(),
            }),
            ProbeKind::Network => ProbePayload::Network(NetworkReport {
                ping: Some(PingStats {
                    host: url.host().unwrap_or_default(),
                    alive: true,
                    samples: vec![11.0, 12.0, 13.0],
                    min: Some(11.0),
                    max: Some(13.0),
                    avg: Some(12.0),
                    packet_loss_pct: 0.0,
                }),
                ..NetworkReport::default()
            }),
            ProbeKind::Security => ProbePayload::Security(SecurityReport {
                alerts: vec![SecurityAlert {
                    name: "Missing Anti-clickjacking Header".to_string(),
                    risk: RiskLevel::Medium,
                    confidence: "Medium".to_string(),
                    url: url.to_string(),
                    description: String::new(),
                    solution: String::new(),
                    reference: String::new(),
                    evidence: None,
                    cwe_id: Some("1021".to_string()),
                    wasc_id: None,
                    alert_ref: Some("10020-1".to_string()),
                }],
            }),
        })
    }
}

/// Text generator answering every prompt with the same text.
#[derive(Debug)]
pub struct FixedGenerator(pub String);

#[async_trait]
impl TextGenerator for FixedGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String, SitewatchError> {
        Ok(self.0.clone())
    }
}

/// A running server.
pub struct TestApp {
    pub base: String,
    pub ws_url: String,
    pub scheduler: Arc<CollectionScheduler>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Waits for the scheduler to go idle, failing the test after 5 s.
    pub async fn settle(&self) {
        let Ok(()) = tokio::time::timeout(Duration::from_secs(5), self.scheduler.wait_idle()).await
        else {
            panic!("scheduler did not go idle");
        };
    }
}

pub fn all_probes() -> Vec<Arc<dyn Probe>> {
    vec![
        CannedProbe::ok(ProbeKind::Performance),
        CannedProbe::ok(ProbeKind::Network),
        CannedProbe::ok(ProbeKind::Security),
    ]
}

pub async fn spawn_app(
    probes: Vec<Arc<dyn Probe>>,
    generator: Option<Arc<dyn TextGenerator>>,
) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(DedupQueue::new(Arc::clone(&store) as _));
    let event_bus = EventBus::new(256);
    let scheduler = Arc::new(CollectionScheduler::new(
        queue,
        probes,
        Arc::clone(&store) as _,
        event_bus.clone(),
        Duration::from_secs(5),
    ));
    let reporter = Arc::new(AnomalyReporter::new(Arc::clone(&store) as _, generator));
    let state = AppState::new(Arc::clone(&scheduler), reporter, event_bus);

    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .with_state(state);

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestApp {
        base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        scheduler,
        store,
    }
}
