//! Read-only viewer endpoints over a pool's committed observations.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{AnomalyParams, EarningsParams, HistoryParams, WorkersParams, WorkersResponse};
use crate::app_state::AppState;
use crate::domain::{PoolId, WorkerStatus};
use crate::error::ObserverError;

/// Parses the path id and checks that the pool is provisioned.
async fn known_pool(state: &AppState, id: String) -> Result<PoolId, ObserverError> {
    let pool_id = PoolId::new(id)?;
    state.store.get_pool(&pool_id).await?;
    Ok(pool_id)
}

/// `GET /api/v1/pools/{id}/summary/latest` — Latest committed summary.
///
/// # Errors
///
/// Returns [`ObserverError::UnknownPool`] for an unprovisioned pool and
/// [`ObserverError::NoObservations`] before the first committed cycle.
pub async fn latest_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let pool_id = known_pool(&state, id).await?;
    let latest = state
        .store
        .read_latest(&pool_id)
        .await?
        .ok_or_else(|| ObserverError::NoObservations(pool_id.to_string()))?;
    Ok(Json(latest))
}

/// `GET /api/v1/pools/{id}/summaries?hours=N` — Summaries of the last
/// `hours`, oldest first.
///
/// # Errors
///
/// Returns [`ObserverError::UnknownPool`] for an unprovisioned pool.
pub async fn summary_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let pool_id = known_pool(&state, id).await?;
    let summaries = state
        .store
        .read_summaries_since(&pool_id, params.since(Utc::now()))
        .await?;
    Ok(Json(summaries))
}

/// `GET /api/v1/pools/{id}/workers` — Worker rows of the latest cycle.
///
/// # Errors
///
/// Returns [`ObserverError::UnknownPool`] for an unprovisioned pool.
pub async fn latest_workers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<WorkersParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let pool_id = known_pool(&state, id).await?;
    let mut workers = state.store.read_latest_workers(&pool_id).await?;

    let offline = workers
        .iter()
        .filter(|w| w.status == WorkerStatus::Offline)
        .count();
    let online = workers.len() - offline;
    let timestamp = workers.first().map(|w| w.timestamp);
    if params.offline_only {
        workers.retain(|w| w.status == WorkerStatus::Offline);
    }

    Ok(Json(WorkersResponse {
        pool_id,
        timestamp,
        online,
        offline,
        workers,
    }))
}

/// `GET /api/v1/pools/{id}/earnings?days=N` — Daily earnings, newest day
/// first.
///
/// # Errors
///
/// Returns [`ObserverError::UnknownPool`] for an unprovisioned pool.
pub async fn daily_earnings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<EarningsParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let pool_id = known_pool(&state, id).await?;
    let earnings = state
        .store
        .read_daily_earnings(&pool_id, params.clamped_days())
        .await?;
    Ok(Json(earnings))
}

/// `GET /api/v1/pools/{id}/anomalies?hours=N&unresolved=true` — Anomalies
/// of one pool, newest first.
///
/// # Errors
///
/// Returns [`ObserverError::UnknownPool`] for an unprovisioned pool.
pub async fn pool_anomalies(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<AnomalyParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let pool_id = known_pool(&state, id).await?;
    let anomalies = state
        .store
        .read_anomalies(Some(&pool_id), params.since(Utc::now()), params.unresolved)
        .await?;
    Ok(Json(anomalies))
}

/// Observation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pools/{id}/summary/latest", get(latest_summary))
        .route("/pools/{id}/summaries", get(summary_history))
        .route("/pools/{id}/workers", get(latest_workers))
        .route("/pools/{id}/earnings", get(daily_earnings))
        .route("/pools/{id}/anomalies", get(pool_anomalies))
}
