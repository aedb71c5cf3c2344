//! Result reads: latest snapshot, windowed summaries, raw series.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::analytics::{summarize_network, summarize_performance, summarize_security};
use crate::api::dto::{
    LatestResultResponse, SnapshotSeriesResponse, SummaryDto, SummaryResponse, WindowQuery,
};
use crate::app_state::AppState;
use crate::domain::{FormFactor, ProbeKind, ScanRecord, TrackedUrl};
use crate::error::{ErrorResponse, SitewatchError};

fn no_snapshots(url: &TrackedUrl, kind: ProbeKind) -> SitewatchError {
    SitewatchError::NoSnapshots {
        url: url.to_string(),
        kind: kind.to_string(),
    }
}

fn summarize(
    kind: ProbeKind,
    records: &[ScanRecord],
    form_factor: FormFactor,
) -> Option<SummaryDto> {
    match kind {
        ProbeKind::Performance => {
            summarize_performance(records, form_factor).map(SummaryDto::Performance)
        }
        ProbeKind::Network => summarize_network(records).map(SummaryDto::Network),
        ProbeKind::Security => summarize_security(records).map(SummaryDto::Security),
    }
}

async fn ensure_tracked(state: &AppState, url: &TrackedUrl) -> Result<(), SitewatchError> {
    if state.scheduler.queue().contains(url).await {
        Ok(())
    } else {
        Err(SitewatchError::UrlNotTracked(url.to_string()))
    }
}

/// `GET /results/{kind}` — Latest snapshot or windowed summary.
///
/// # Errors
///
/// Returns a validation error for a bad kind, URL, window or form factor,
/// [`SitewatchError::UrlNotTracked`] for unknown URLs and
/// [`SitewatchError::NoSnapshots`] when the window holds no usable data.
#[utoipa::path(
    get,
    path = "/api/v1/results/{kind}",
    tag = "Results",
    summary = "Get results for a URL",
    description = "With `window=now` returns the most recent snapshot (mobile and desktop audits for `performance`). With `1h`, `24h`, `1w` or `1m` returns statistics over the successful snapshots in that window; performance statistics cover the `form_factor` audits.",
    params(
        ("kind" = String, Path, description = "`performance`, `network` or `security`"),
        WindowQuery,
    ),
    responses(
        (status = 200, description = "Window summary, or a `LatestResultResponse` for `now`", body = SummaryResponse),
        (status = 400, description = "Invalid kind, URL, window or form factor", body = ErrorResponse),
        (status = 404, description = "URL not tracked or no snapshots", body = ErrorResponse),
    )
)]
pub async fn get_results(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Response, SitewatchError> {
    let kind: ProbeKind = kind.parse()?;
    let (url, window) = query.parse()?;
    let form_factor = query.form_factor()?;
    ensure_tracked(&state, &url).await?;

    let Some(since) = window.since(Utc::now()) else {
        let record = state
            .snapshots
            .latest(&url, kind)
            .await?
            .ok_or_else(|| no_snapshots(&url, kind))?;
        return Ok(Json(LatestResultResponse {
            url: url.to_string(),
            kind: kind.to_string(),
            window: window.to_string(),
            record,
        })
        .into_response());
    };

    let records = state.snapshots.range(&url, kind, since).await?;
    let summary =
        summarize(kind, &records, form_factor).ok_or_else(|| no_snapshots(&url, kind))?;
    tracing::debug!(url = %url, %kind, %window, records = records.len(), "summary computed");

    Ok(Json(SummaryResponse {
        url: url.to_string(),
        kind: kind.to_string(),
        window: window.to_string(),
        since,
        records: records.len(),
        summary,
    })
    .into_response())
}

/// `GET /snapshots/{kind}` — Raw snapshot series.
///
/// `window=now` yields at most the latest record.
///
/// # Errors
///
/// Returns a validation error for a bad kind, URL or window and
/// [`SitewatchError::UrlNotTracked`] for unknown URLs.
#[utoipa::path(
    get,
    path = "/api/v1/snapshots/{kind}",
    tag = "Results",
    summary = "Get the snapshot series for a URL",
    description = "Returns every stored record in the window, oldest first, including failed runs.",
    params(
        ("kind" = String, Path, description = "`performance`, `network` or `security`"),
        WindowQuery,
    ),
    responses(
        (status = 200, description = "Snapshot series", body = SnapshotSeriesResponse),
        (status = 400, description = "Invalid kind, URL or window", body = ErrorResponse),
        (status = 404, description = "URL not tracked", body = ErrorResponse),
    )
)]
pub async fn get_snapshots(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<impl IntoResponse, SitewatchError> {
    let kind: ProbeKind = kind.parse()?;
    let (url, window) = query.parse()?;
    ensure_tracked(&state, &url).await?;

    let data = match window.since(Utc::now()) {
        Some(since) => state.snapshots.range(&url, kind, since).await?,
        None => state
            .snapshots
            .latest(&url, kind)
            .await?
            .into_iter()
            .collect(),
    };

    Ok(Json(SnapshotSeriesResponse {
        url: url.to_string(),
        kind: kind.to_string(),
        window: window.to_string(),
        count: data.len(),
        data,
    }))
}

/// Result routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/results/{kind}", get(get_results))
        .route("/snapshots/{kind}", get(get_snapshots))
}
