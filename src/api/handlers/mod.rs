//! REST endpoint handlers organized by resource.

pub mod anomalies;
pub mod observations;
pub mod pools;
pub mod system;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(pools::routes())
        .merge(observations::routes())
        .merge(anomalies::routes())
        .route("/stats", get(system::stats))
}
