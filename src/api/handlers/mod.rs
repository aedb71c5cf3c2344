//! REST endpoint handlers organized by resource.

pub mod insights;
pub mod results;
pub mod scans;
pub mod system;
pub mod urls;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(urls::routes())
        .merge(results::routes())
        .merge(insights::routes())
        .merge(scans::routes())
}
