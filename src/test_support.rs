//! Fixtures shared by unit tests across modules.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use chrono::{Duration, NaiveDate, SubsecRound, Utc};
use rust_decimal::Decimal;

use crate::api::build_router;
use crate::app_state::AppState;
use crate::domain::{
    AnomalyCandidate, AnomalyType, CycleId, DailyEarningsRecord, NewPool, PoolId, Severity,
    Snapshot, SummarySnapshot, WorkerStatus, WorkerStatusRecord,
};
use crate::persistence::SqliteStore;

pub(crate) async fn store() -> SqliteStore {
    let Ok(store) = SqliteStore::in_memory().await else {
        panic!("in-memory store");
    };
    store
}

pub(crate) fn app(store: &SqliteStore) -> Router {
    build_router().with_state(AppState::new(store.clone()))
}

pub(crate) fn new_pool(raw: &str) -> NewPool {
    let Ok(pool_id) = PoolId::new(raw) else {
        panic!("valid id");
    };
    NewPool {
        pool_id,
        pool_name: format!("Pool {raw}"),
        observer_url: format!("https://observer.test/{raw}"),
        client_name: "Client".to_string(),
        country: "Kazakhstan".to_string(),
        company: String::new(),
        location: String::new(),
        contact_email: String::new(),
        tags: Vec::new(),
        active: true,
    }
}

/// Provisions `raw` and commits one cycle observed `age` ago: one
/// online and one offline worker, two earnings days and an
/// OFFLINE_WORKERS anomaly.
pub(crate) async fn observed(store: &SqliteStore, raw: &str, age: Duration) -> CycleId {
    let new = new_pool(raw);
    if store.get_pool(&new.pool_id).await.is_err() {
        assert!(store.create_pool(&new).await.is_ok());
    }
    let pool_id = new.pool_id;
    let at = (Utc::now() - age).trunc_subsecs(6);
    let worker = |name: &str, status| WorkerStatusRecord {
        pool_id: pool_id.clone(),
        timestamp: at,
        worker_name: name.to_string(),
        status,
        hashrate_10m: 110.0,
        hashrate_1h: 105.0,
        hashrate_24h: 100.0,
        last_exchange_time: "2 min ago".to_string(),
    };
    let earning = |day: u32, income: i64| {
        let Some(date) = NaiveDate::from_ymd_opt(2026, 3, day) else {
            panic!("valid date");
        };
        DailyEarningsRecord {
            pool_id: pool_id.clone(),
            date,
            total_income: Decimal::new(income, 5),
            hashrate: 100.0,
            recorded_at: at,
        }
    };
    let snapshot = Snapshot {
        summary: SummarySnapshot {
            pool_id: pool_id.clone(),
            timestamp: at,
            current_hashrate: 110.0,
            avg_hashrate_24h: 100.0,
            online_workers: 1,
            offline_workers: 1,
            balance: Decimal::new(1_570_138, 8),
            last_income: Decimal::new(412, 5),
        },
        workers: vec![
            worker("rig-001", WorkerStatus::Online),
            worker("rig-002", WorkerStatus::Offline),
        ],
        daily_earnings: vec![earning(13, 1_200), earning(14, 1_500)],
    };
    let anomaly = AnomalyCandidate {
        anomaly_type: AnomalyType::OfflineWorkers,
        severity: Severity::Medium,
        description: "1 worker(s) offline: rig-002".to_string(),
    };
    let Ok(cycle_id) = store.commit_cycle(&pool_id, &snapshot, &[anomaly]).await else {
        panic!("commit");
    };
    cycle_id
}

/// Sends one request and returns the status and parsed JSON body.
pub(crate) async fn send(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    };
    let Ok(request) = request else {
        panic!("request builds");
    };
    let Ok(response) = app.oneshot(request).await else {
        panic!("router is infallible");
    };
    let status = response.status();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body readable");
    };
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}
