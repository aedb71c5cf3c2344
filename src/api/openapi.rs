//! OpenAPI document served by Swagger UI.

use utoipa::OpenApi;

use super::dto::{
    LatestResultResponse, QueueStatusResponse, SnapshotSeriesResponse, SubmitItemResult,
    SubmitStatus, SubmitUrlsRequest, SubmitUrlsResponse, SummaryDto, SummaryResponse,
    TrackedUrlDto, TrackedUrlListResponse, TriggerResponse,
};
use super::handlers::{insights, results, scans, system, urls};
use crate::analytics::{
    AlertCategory, CategoryCount, Distribution, Finding, InsightReport, NetworkSummary,
    PerformanceSummary, SecuritySummary, WebVitalsSummary,
};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated API description.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "sitewatch",
        description = "Recurring website telemetry: performance audits, network diagnostics and security scans."
    ),
    paths(
        system::health_handler,
        urls::submit_urls,
        urls::list_urls,
        urls::remove_url,
        results::get_results,
        results::get_snapshots,
        insights::get_insights,
        scans::run_scans,
        scans::queue_status,
    ),
    components(schemas(
        ErrorResponse,
        ErrorBody,
        SubmitUrlsRequest,
        SubmitUrlsResponse,
        SubmitItemResult,
        SubmitStatus,
        TrackedUrlDto,
        TrackedUrlListResponse,
        LatestResultResponse,
        SummaryResponse,
        SummaryDto,
        SnapshotSeriesResponse,
        PerformanceSummary,
        WebVitalsSummary,
        NetworkSummary,
        SecuritySummary,
        Distribution,
        AlertCategory,
        CategoryCount,
        InsightReport,
        Finding,
        TriggerResponse,
        QueueStatusResponse,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "URLs", description = "Tracked URL management"),
        (name = "Results", description = "Snapshots and summaries"),
        (name = "Insights", description = "Model-assisted trend analysis"),
        (name = "Scans", description = "Scheduler control"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/urls",
            "/api/v1/results/{kind}",
            "/api/v1/snapshots/{kind}",
            "/api/v1/insights",
            "/api/v1/scans/run",
            "/api/v1/queue",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
