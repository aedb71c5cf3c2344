//! Trend and anomaly report handler.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::analytics::InsightReport;
use crate::api::dto::UrlQuery;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SitewatchError};

/// `GET /insights?url=` — Trend and anomaly report for a URL.
///
/// # Errors
///
/// Returns [`SitewatchError::UrlNotTracked`] for unknown URLs and
/// [`SitewatchError::TextGeneration`] if the model service fails.
#[utoipa::path(
    get,
    path = "/api/v1/insights",
    tag = "Insights",
    summary = "Get trends and anomalies for a URL",
    description = "Analyses the last week of performance and security snapshots with the configured model and adds suggestions from the latest scans. Without a model key, findings are empty.",
    params(UrlQuery),
    responses(
        (status = 200, description = "Insight report", body = InsightReport),
        (status = 400, description = "Missing or invalid URL", body = ErrorResponse),
        (status = 404, description = "URL not tracked", body = ErrorResponse),
        (status = 502, description = "Model service failed", body = ErrorResponse),
    )
)]
pub async fn get_insights(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, SitewatchError> {
    let url = query.tracked_url()?;
    if !state.scheduler.queue().contains(&url).await {
        return Err(SitewatchError::UrlNotTracked(url.to_string()));
    }
    let report = state.reporter.report(&url).await?;
    tracing::info!(
        url = %url,
        trends = report.trends.len(),
        anomalies = report.anomalies.len(),
        "insight report built"
    );
    Ok(Json(report))
}

/// Insight routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/insights", get(get_insights))
}
