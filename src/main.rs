//! sitewatch server entry point.
//!
//! Restores the scan queue, starts the collection scheduler and serves the
//! REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sitewatch::analytics::{AnomalyReporter, GroqClient, TextGenerator};
use sitewatch::api;
use sitewatch::app_state::AppState;
use sitewatch::config::SitewatchConfig;
use sitewatch::domain::{DedupQueue, EventBus};
use sitewatch::persistence::{MemoryStore, PostgresPersistence, QueueStore, SnapshotStore};
use sitewatch::probe::{LighthouseProbe, NetworkProbe, Probe, ZapProbe};
use sitewatch::service::CollectionScheduler;
use sitewatch::ws::handler::ws_handler;

/// Upper bound for a single network command (ping, traceroute, openssl).
const NETWORK_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound for a single ZAP API request.
const ZAP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn stores(
    config: &SitewatchConfig,
) -> anyhow::Result<(Arc<dyn QueueStore>, Arc<dyn SnapshotStore>)> {
    if config.persistence_enabled {
        let pg = Arc::new(
            PostgresPersistence::connect(config)
                .await
                .context("connecting to PostgreSQL")?,
        );
        tracing::info!("using PostgreSQL persistence");
        let queue: Arc<dyn QueueStore> = Arc::clone(&pg) as Arc<dyn QueueStore>;
        let snapshots: Arc<dyn SnapshotStore> = pg;
        Ok((queue, snapshots))
    } else {
        let memory = Arc::new(MemoryStore::new());
        tracing::warn!("persistence disabled, state is lost on restart");
        let queue: Arc<dyn QueueStore> = Arc::clone(&memory) as Arc<dyn QueueStore>;
        let snapshots: Arc<dyn SnapshotStore> = memory;
        Ok((queue, snapshots))
    }
}

fn probes(config: &SitewatchConfig) -> anyhow::Result<Vec<Arc<dyn Probe>>> {
    let policy = config.probe_retry_policy();
    let zap = ZapProbe::new(
        &config.zap_api_url,
        config.zap_api_key.clone(),
        policy,
        Duration::from_secs(config.zap_poll_interval_secs),
        Duration::from_secs(config.zap_max_wait_secs),
        ZAP_REQUEST_TIMEOUT,
    )
    .context("configuring ZAP probe")?;

    let probes: Vec<Arc<dyn Probe>> = vec![
        Arc::new(LighthouseProbe::new(
            config.lighthouse_bin.clone(),
            &config.lighthouse_form_factors,
            policy,
            Duration::from_secs(config.probe_timeout_secs),
        )),
        Arc::new(NetworkProbe::new(policy, NETWORK_COMMAND_TIMEOUT)),
        Arc::new(zap),
    ];
    Ok(probes)
}

fn text_generator(config: &SitewatchConfig) -> anyhow::Result<Option<Arc<dyn TextGenerator>>> {
    let Some(key) = &config.groq_api_key else {
        tracing::warn!("GROQ_API_KEY not set, insight reports will have no findings");
        return Ok(None);
    };
    let client = GroqClient::new(
        &config.groq_api_url,
        key.clone(),
        config.groq_model.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("configuring text generation client")?;
    let generator: Arc<dyn TextGenerator> = Arc::new(client);
    Ok(Some(generator))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SitewatchConfig::from_env()
        .map_err(|e| anyhow::anyhow!(e))
        .context("loading configuration")?;
    init_tracing(config.log_json);
    tracing::info!(addr = %config.listen_addr, "starting sitewatch");

    // Persistence and queue
    let (queue_store, snapshots) = stores(&config).await?;
    let queue = Arc::new(
        DedupQueue::restore(queue_store)
            .await
            .context("restoring scan queue")?,
    );

    // Scheduler
    let event_bus = EventBus::new(config.event_bus_capacity);
    let scheduler = Arc::new(CollectionScheduler::new(
        queue,
        probes(&config)?,
        Arc::clone(&snapshots),
        event_bus.clone(),
        Duration::from_secs(config.probe_timeout_secs),
    ));
    let ticker =
        scheduler.spawn_ticker(Duration::from_secs(config.continuous_interval_secs.max(1)));
    if scheduler.start_initial_pass().await {
        tracing::info!("initial continuous pass started");
    }

    // Analytics
    let reporter = Arc::new(AnomalyReporter::new(snapshots, text_generator(&config)?));

    let app_state = AppState::new(scheduler, reporter, event_bus);

    // Router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let app = {
        use utoipa::OpenApi;
        app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::openapi::ApiDoc::openapi()),
        )
    };

    let app = app
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout_secs,
                ))),
        )
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    ticker.abort();
    Ok(())
}
