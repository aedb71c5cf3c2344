//! Manual scan trigger and queue inspection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{QueueStatusResponse, TriggerResponse};
use crate::app_state::AppState;
use crate::service::TriggerOutcome;

/// `POST /scans/run` — Start a full pass now.
#[utoipa::path(
    post,
    path = "/api/v1/scans/run",
    tag = "Scans",
    summary = "Trigger a scan pass",
    description = "Starts draining both lanes unless a drain is already running or nothing is tracked.",
    responses(
        (status = 202, description = "Pass started", body = TriggerResponse),
        (status = 200, description = "Already processing or nothing queued", body = TriggerResponse),
    )
)]
pub async fn run_scans(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.scheduler.run_now().await;
    tracing::info!(?status, "manual scan trigger");
    let code = match status {
        TriggerOutcome::Started => StatusCode::ACCEPTED,
        TriggerOutcome::AlreadyProcessing | TriggerOutcome::NothingQueued => StatusCode::OK,
    };
    (code, Json(TriggerResponse { status }))
}

/// `GET /queue` — Lane contents.
#[utoipa::path(
    get,
    path = "/api/v1/queue",
    tag = "Scans",
    summary = "Inspect the scan queue",
    description = "Returns both lanes head first, the URLs being scanned, and the number of durable writes awaiting retry.",
    responses(
        (status = 200, description = "Queue status", body = QueueStatusResponse),
    )
)]
pub async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.scheduler.queue().status().await;
    Json(QueueStatusResponse::new(
        status,
        state.scheduler.is_draining(),
    ))
}

/// Scan routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/scans/run", post(run_scans))
        .route("/queue", get(queue_status))
}
