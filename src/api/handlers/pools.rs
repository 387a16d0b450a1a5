//! Pool administration handlers: provision, list, get, update.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{PaginationParams, PoolFilter, PoolListResponse};
use crate::app_state::AppState;
use crate::domain::{NewPool, PoolId, PoolUpdate};
use crate::error::ObserverError;

/// `POST /api/v1/pools` — Provision a pool. Answers `201` with the stored
/// identity.
///
/// # Errors
///
/// Returns [`ObserverError::InvalidRequest`] for invalid fields or
/// [`ObserverError::PoolExists`] if the id is taken.
pub async fn create_pool(
    State(state): State<AppState>,
    Json(req): Json<NewPool>,
) -> Result<impl IntoResponse, ObserverError> {
    let identity = state.store.create_pool(&req).await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

/// `GET /api/v1/pools` — List pools with pagination and an optional
/// `active_only` filter.
///
/// # Errors
///
/// Returns [`ObserverError::PersistenceError`] on database failure.
pub async fn list_pools(
    State(state): State<AppState>,
    Query(filter): Query<PoolFilter>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let pools = state.store.list_pools(filter.active_only).await?;
    let (data, pagination) = params.paginate(pools);
    Ok(Json(PoolListResponse { data, pagination }))
}

/// `GET /api/v1/pools/{id}` — Get one pool identity.
///
/// # Errors
///
/// Returns [`ObserverError::UnknownPool`] if the pool does not exist.
pub async fn get_pool(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let pool_id = PoolId::new(id)?;
    Ok(Json(state.store.get_pool(&pool_id).await?))
}

/// `PATCH /api/v1/pools/{id}` — Update metadata or the active flag.
///
/// # Errors
///
/// Returns [`ObserverError::InvalidRequest`] for an empty or invalid update
/// and [`ObserverError::UnknownPool`] if the pool does not exist.
pub async fn update_pool(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<PoolUpdate>,
) -> Result<impl IntoResponse, ObserverError> {
    let pool_id = PoolId::new(id)?;
    if update.is_empty() {
        return Err(ObserverError::InvalidRequest(
            "update contains no fields".to_string(),
        ));
    }
    Ok(Json(state.store.update_pool(&pool_id, &update).await?))
}

/// Pool administration routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pools", get(list_pools).post(create_pool))
        .route("/pools/{id}", get(get_pool).patch(update_pool))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use crate::test_support::{app, new_pool, send, store};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_get() {
        let store = store().await;
        let body = json!({
            "pool_id": "kz-01",
            "pool_name": "KZ Pool 01",
            "observer_url": "https://observer.test/kz-01",
            "country": "Kazakhstan",
            "tags": ["kz", "s19"]
        });
        let (status, created) = send(app(&store), "POST", "/api/v1/pools", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.get("active").and_then(|v| v.as_bool()), Some(true));

        let (status, fetched) = send(app(&store), "GET", "/api/v1/pools/kz-01", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched.get("pool_name"), Some(&json!("KZ Pool 01")));
        assert_eq!(fetched.get("tags"), Some(&json!(["kz", "s19"])));
    }

    #[tokio::test]
    async fn duplicate_and_invalid_pools_are_rejected() {
        let store = store().await;
        assert!(store.create_pool(&new_pool("kz-01")).await.is_ok());

        let duplicate = json!({
            "pool_id": "kz-01",
            "pool_name": "again",
            "observer_url": "https://observer.test/again"
        });
        let (status, body) = send(app(&store), "POST", "/api/v1/pools", Some(duplicate)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body.pointer("/error/code").and_then(|v| v.as_u64()),
            Some(2003)
        );

        let bad_url = json!({
            "pool_id": "kz-02",
            "pool_name": "KZ 02",
            "observer_url": "ftp://observer.test"
        });
        let (status, _) = send(app(&store), "POST", "/api/v1/pools", Some(bad_url)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids() {
        let store = store().await;
        let (status, _) = send(app(&store), "GET", "/api/v1/pools/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(app(&store), "GET", "/api/v1/pools/bad%20id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let store = store().await;
        for raw in ["kz-01", "kz-02", "kz-03"] {
            assert!(store.create_pool(&new_pool(raw)).await.is_ok());
        }
        let patch = json!({ "active": false });
        let (status, updated) =
            send(app(&store), "PATCH", "/api/v1/pools/kz-02", Some(patch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated.get("active"), Some(&json!(false)));

        let (_, all) = send(app(&store), "GET", "/api/v1/pools?per_page=2", None).await;
        assert_eq!(all.pointer("/pagination/total"), Some(&json!(3)));
        assert_eq!(all.pointer("/pagination/total_pages"), Some(&json!(2)));
        assert_eq!(all.get("data").and_then(|v| v.as_array()).map(Vec::len), Some(2));

        let (_, active) = send(app(&store), "GET", "/api/v1/pools?active_only=true", None).await;
        assert_eq!(active.pointer("/pagination/total"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let store = store().await;
        assert!(store.create_pool(&new_pool("kz-01")).await.is_ok());
        let (status, _) =
            send(app(&store), "PATCH", "/api/v1/pools/kz-01", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
