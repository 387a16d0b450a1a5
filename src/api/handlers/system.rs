//! System endpoints: health check and store statistics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::ObserverError;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    timestamp: String,
    uptime_secs: i64,
    version: &'static str,
}

/// `GET /health` — Service health status.
///
/// Answers `503` when the store does not respond.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let (status, code, database) = match state.store.ping().await {
        Ok(()) => ("healthy", StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "health check: store unavailable");
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };
    (
        code,
        Json(HealthResponse {
            status,
            database,
            timestamp: now.to_rfc3339(),
            uptime_secs: (now - state.started_at).num_seconds(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// `GET /api/v1/stats` — Row counts and covered time spans.
///
/// # Errors
///
/// Returns [`ObserverError::PersistenceError`] on database failure.
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ObserverError> {
    Ok(Json(state.store.stats().await?))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
