//! Anomaly log endpoints across all pools.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::AnomalyParams;
use crate::app_state::AppState;
use crate::error::ObserverError;

/// `GET /api/v1/anomalies?hours=N&unresolved=true` — Anomalies of every
/// pool, newest first.
///
/// # Errors
///
/// Returns [`ObserverError::PersistenceError`] on database failure.
pub async fn list_anomalies(
    State(state): State<AppState>,
    Query(params): Query<AnomalyParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let anomalies = state
        .store
        .read_anomalies(None, params.since(Utc::now()), params.unresolved)
        .await?;
    Ok(Json(anomalies))
}

/// `POST /api/v1/anomalies/{id}/resolve` — Mark an anomaly resolved.
///
/// # Errors
///
/// Returns [`ObserverError::AnomalyNotFound`] for an unknown id.
pub async fn resolve_anomaly(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ObserverError> {
    let event = state.store.resolve_anomaly(id).await?;
    tracing::info!(
        id,
        pool_id = %event.pool_id,
        anomaly_type = %event.anomaly_type,
        "anomaly resolved"
    );
    Ok(Json(event))
}

/// Anomaly routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/anomalies", get(list_anomalies))
        .route("/anomalies/{id}/resolve", post(resolve_anomaly))
}
