//! Row models and column codecs for the SQLite store.
//!
//! Rows are fetched as tuples and converted here. Timestamps are stored as
//! fixed-width RFC 3339 text, dates as ISO text and monetary amounts as
//! decimal text, so every stored value reads back exactly.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{
    AnomalyEvent, AnomalyType, CycleId, DailyEarningsRecord, PoolId, PoolIdentity, Severity,
    SummarySnapshot, WorkerStatus, WorkerStatusRecord,
};
use crate::error::ObserverError;

/// A committed summary together with the cycle it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSummary {
    /// Cycle identifier.
    pub cycle_id: CycleId,
    /// Summary values.
    #[serde(flatten)]
    pub summary: SummarySnapshot,
}

/// Everything one committed cycle wrote, read back as a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    /// Summary row.
    pub summary: StoredSummary,
    /// Worker rows in page order.
    pub workers: Vec<WorkerStatusRecord>,
    /// Anomalies raised by the cycle.
    pub anomalies: Vec<AnomalyEvent>,
}

/// Row count and covered time span of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Table name.
    pub table: &'static str,
    /// Number of rows.
    pub rows: i64,
    /// Oldest row timestamp.
    pub first: Option<DateTime<Utc>>,
    /// Newest row timestamp.
    pub last: Option<DateTime<Utc>>,
}

/// Store-wide statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Provisioned pools.
    pub pools: i64,
    /// Active pools.
    pub active_pools: i64,
    /// Unresolved anomalies.
    pub unresolved_anomalies: i64,
    /// Per-table counts.
    pub tables: Vec<TableStats>,
}

pub(crate) type PoolRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    bool,
    String,
    String,
);

pub(crate) type SummaryRow = (String, String, String, f64, f64, i64, i64, String, String);

pub(crate) type WorkerRow = (String, String, String, String, f64, f64, f64, String);

pub(crate) type EarningRow = (String, String, String, f64, String);

pub(crate) type AnomalyRow = (i64, String, String, String, String, String, String, bool);

pub(crate) const POOL_COLUMNS: &str = "pool_id, pool_name, observer_url, client_name, country, \
     company, location, contact_email, tags, active, created_at, updated_at";

pub(crate) const SUMMARY_COLUMNS: &str = "cycle_id, pool_id, timestamp, current_hashrate, \
     avg_hashrate_24h, online_workers, offline_workers, balance, last_income";

pub(crate) const WORKER_COLUMNS: &str = "pool_id, timestamp, worker_name, status, hashrate_10m, \
     hashrate_1h, hashrate_24h, last_exchange_time";

pub(crate) const EARNING_COLUMNS: &str = "pool_id, date, total_income, hashrate, recorded_at";

pub(crate) const ANOMALY_COLUMNS: &str =
    "id, pool_id, cycle_id, timestamp, anomaly_type, description, severity, resolved";

pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>, ObserverError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt("timestamp", raw, &e))
}

pub(crate) fn encode_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn decode_date(raw: &str) -> Result<NaiveDate, ObserverError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| corrupt("date", raw, &e))
}

fn decode_decimal(raw: &str) -> Result<Decimal, ObserverError> {
    Decimal::from_str(raw).map_err(|e| corrupt("decimal", raw, &e))
}

fn decode_count(raw: i64) -> Result<u32, ObserverError> {
    u32::try_from(raw).map_err(|e| corrupt("count", &raw.to_string(), &e))
}

fn decode_pool_id(raw: String) -> Result<PoolId, ObserverError> {
    PoolId::new(raw).map_err(|e| ObserverError::PersistenceError(format!("stored pool id: {e}")))
}

fn corrupt(kind: &str, raw: &str, err: &dyn std::fmt::Display) -> ObserverError {
    ObserverError::PersistenceError(format!("stored {kind} {raw:?} is unreadable: {err}"))
}

pub(crate) fn pool_from_row(row: PoolRow) -> Result<PoolIdentity, ObserverError> {
    let (
        pool_id,
        pool_name,
        observer_url,
        client_name,
        country,
        company,
        location,
        contact_email,
        tags,
        active,
        created_at,
        updated_at,
    ) = row;
    let tags: Vec<String> =
        serde_json::from_str(&tags).map_err(|e| corrupt("tags", &tags, &e))?;
    Ok(PoolIdentity {
        pool_id: decode_pool_id(pool_id)?,
        pool_name,
        observer_url,
        client_name,
        country,
        company,
        location,
        contact_email,
        tags,
        active,
        created_at: decode_ts(&created_at)?,
        updated_at: decode_ts(&updated_at)?,
    })
}

pub(crate) fn summary_from_row(row: SummaryRow) -> Result<StoredSummary, ObserverError> {
    let (cycle_id, pool_id, timestamp, current, avg, online, offline, balance, last_income) = row;
    Ok(StoredSummary {
        cycle_id: cycle_id
            .parse::<CycleId>()
            .map_err(|e| corrupt("cycle id", &cycle_id, &e))?,
        summary: SummarySnapshot {
            pool_id: decode_pool_id(pool_id)?,
            timestamp: decode_ts(&timestamp)?,
            current_hashrate: current,
            avg_hashrate_24h: avg,
            online_workers: decode_count(online)?,
            offline_workers: decode_count(offline)?,
            balance: decode_decimal(&balance)?,
            last_income: decode_decimal(&last_income)?,
        },
    })
}

pub(crate) fn worker_from_row(row: WorkerRow) -> Result<WorkerStatusRecord, ObserverError> {
    let (pool_id, timestamp, worker_name, status, h10m, h1h, h24h, last_exchange_time) = row;
    Ok(WorkerStatusRecord {
        pool_id: decode_pool_id(pool_id)?,
        timestamp: decode_ts(&timestamp)?,
        worker_name,
        status: status
            .parse::<WorkerStatus>()
            .map_err(|e| corrupt("status", &status, &e))?,
        hashrate_10m: h10m,
        hashrate_1h: h1h,
        hashrate_24h: h24h,
        last_exchange_time,
    })
}

pub(crate) fn earning_from_row(row: EarningRow) -> Result<DailyEarningsRecord, ObserverError> {
    let (pool_id, date, total_income, hashrate, recorded_at) = row;
    Ok(DailyEarningsRecord {
        pool_id: decode_pool_id(pool_id)?,
        date: decode_date(&date)?,
        total_income: decode_decimal(&total_income)?,
        hashrate,
        recorded_at: decode_ts(&recorded_at)?,
    })
}

pub(crate) fn anomaly_from_row(row: AnomalyRow) -> Result<AnomalyEvent, ObserverError> {
    let (id, pool_id, cycle_id, timestamp, anomaly_type, description, severity, resolved) = row;
    Ok(AnomalyEvent {
        id,
        pool_id: decode_pool_id(pool_id)?,
        cycle_id: cycle_id
            .parse::<CycleId>()
            .map_err(|e| corrupt("cycle id", &cycle_id, &e))?,
        timestamp: decode_ts(&timestamp)?,
        anomaly_type: anomaly_type
            .parse::<AnomalyType>()
            .map_err(|e| corrupt("anomaly type", &anomaly_type, &e))?,
        description,
        severity: severity
            .parse::<Severity>()
            .map_err(|e| corrupt("severity", &severity, &e))?,
        resolved,
    })
}

/// Collects converted rows, failing on the first unreadable one.
pub(crate) fn convert_all<R, T>(
    rows: Vec<R>,
    convert: fn(R) -> Result<T, ObserverError>,
) -> Result<Vec<T>, ObserverError> {
    rows.into_iter().map(convert).collect()
}
