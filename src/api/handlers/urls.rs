//! Tracked URL handlers: submit, list, remove.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{
    SubmitItemResult, SubmitStatus, SubmitUrlsRequest, SubmitUrlsResponse, TrackedUrlDto,
    TrackedUrlListResponse, UrlQuery,
};
use crate::app_state::AppState;
use crate::domain::TrackedUrl;
use crate::error::{ErrorResponse, SitewatchError};

/// `POST /urls` — Start tracking one or more URLs.
///
/// Invalid items are reported individually; the rest of the batch is still
/// processed.
///
/// # Errors
///
/// Returns [`SitewatchError::InvalidRequest`] if the body names no URL.
#[utoipa::path(
    post,
    path = "/api/v1/urls",
    tag = "URLs",
    summary = "Track URLs",
    description = "Validates each URL and queues new ones for an immediate scan. Already tracked URLs are left untouched.",
    request_body = SubmitUrlsRequest,
    responses(
        (status = 202, description = "Per-item outcomes", body = SubmitUrlsResponse),
        (status = 400, description = "Empty submission", body = ErrorResponse),
    )
)]
pub async fn submit_urls(
    State(state): State<AppState>,
    Json(req): Json<SubmitUrlsRequest>,
) -> Result<impl IntoResponse, SitewatchError> {
    let items = req.into_items()?;
    let mut results = Vec::with_capacity(items.len());

    for raw in items {
        let result = match TrackedUrl::parse(&raw) {
            Ok(url) => {
                let normalized = url.to_string();
                let outcome = state.scheduler.submit(url).await;
                SubmitItemResult {
                    url: normalized,
                    status: outcome.into(),
                    error: None,
                }
            }
            Err(e) => {
                tracing::debug!(url = %raw, error = %e, "rejected submission");
                SubmitItemResult {
                    url: raw,
                    status: SubmitStatus::Invalid,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let queued = results
        .iter()
        .filter(|r| r.status == SubmitStatus::Queued)
        .count();
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitUrlsResponse { results, queued }),
    ))
}

/// `GET /urls` — List tracked URLs.
#[utoipa::path(
    get,
    path = "/api/v1/urls",
    tag = "URLs",
    summary = "List tracked URLs",
    description = "Returns every tracked URL with its submission time and current queue state.",
    responses(
        (status = 200, description = "Tracked URLs", body = TrackedUrlListResponse),
    )
)]
pub async fn list_urls(State(state): State<AppState>) -> impl IntoResponse {
    let data: Vec<TrackedUrlDto> = state
        .scheduler
        .queue()
        .tracked()
        .await
        .into_iter()
        .map(TrackedUrlDto::from)
        .collect();
    let total = data.len();
    Json(TrackedUrlListResponse { data, total })
}

/// `DELETE /urls?url=` — Stop tracking a URL.
///
/// Stored snapshots are kept.
///
/// # Errors
///
/// Returns [`SitewatchError::UrlNotTracked`] if the URL is unknown.
#[utoipa::path(
    delete,
    path = "/api/v1/urls",
    tag = "URLs",
    summary = "Stop tracking a URL",
    description = "Removes the URL from the queue and the durable set. A scan already running for it completes but is not requeued.",
    params(UrlQuery),
    responses(
        (status = 204, description = "URL removed"),
        (status = 400, description = "Missing or invalid URL", body = ErrorResponse),
        (status = 404, description = "URL not tracked", body = ErrorResponse),
    )
)]
pub async fn remove_url(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, SitewatchError> {
    let url = query.tracked_url()?;
    if state.scheduler.remove(&url).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SitewatchError::UrlNotTracked(url.to_string()))
    }
}

/// Tracked URL routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/urls",
        post(submit_urls).get(list_urls).delete(remove_url),
    )
}
