//! Canonical snapshot records produced by one scrape cycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PoolId;
use crate::error::ObserverError;

/// Identifier shared by every row written in one committed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(uuid::Uuid);

impl CycleId {
    /// Creates a new random `CycleId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CycleId {
    type Err = ObserverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ObserverError::Internal(format!("invalid cycle id {s:?}: {e}")))
    }
}

/// Worker liveness as reported by the observer page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    /// Worker is submitting shares.
    Online,
    /// Worker stopped submitting shares.
    Offline,
}

impl WorkerStatus {
    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
        }
    }
}

impl FromStr for WorkerStatus {
    type Err = ObserverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(Self::Online),
            "OFFLINE" => Ok(Self::Offline),
            _ => Err(ObserverError::malformed("worker.status", s)),
        }
    }
}

/// Pool-level metrics of one cycle. Hashrates are in TH/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySnapshot {
    /// Pool the snapshot belongs to.
    pub pool_id: PoolId,
    /// Cycle observation time.
    pub timestamp: DateTime<Utc>,
    /// Current hashrate.
    pub current_hashrate: f64,
    /// 24h average hashrate.
    pub avg_hashrate_24h: f64,
    /// Online worker count.
    pub online_workers: u32,
    /// Offline worker count.
    pub offline_workers: u32,
    /// Unpaid balance.
    pub balance: Decimal,
    /// Most recent income credit.
    pub last_income: Decimal,
}

/// Per-worker metrics of one cycle. Hashrates are in TH/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatusRecord {
    /// Pool the worker belongs to.
    pub pool_id: PoolId,
    /// Cycle observation time.
    pub timestamp: DateTime<Utc>,
    /// Worker identifier, unique within a cycle.
    pub worker_name: String,
    /// Liveness.
    pub status: WorkerStatus,
    /// 10-minute hashrate.
    pub hashrate_10m: f64,
    /// 1-hour hashrate.
    pub hashrate_1h: f64,
    /// 24-hour hashrate.
    pub hashrate_24h: f64,
    /// Last share submission time, verbatim.
    pub last_exchange_time: String,
}

/// Running income total of one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEarningsRecord {
    /// Pool the earnings belong to.
    pub pool_id: PoolId,
    /// Calendar day, unique per pool.
    pub date: NaiveDate,
    /// Income total reported for the day.
    pub total_income: Decimal,
    /// Hashrate credited for the day, TH/s.
    pub hashrate: f64,
    /// When this value was observed.
    pub recorded_at: DateTime<Utc>,
}

/// The normalized record set of one cycle, ready for detection and commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Summary row.
    pub summary: SummarySnapshot,
    /// Worker rows, worker names unique.
    pub workers: Vec<WorkerStatusRecord>,
    /// Daily earnings rows, dates unique.
    pub daily_earnings: Vec<DailyEarningsRecord>,
}

impl Snapshot {
    /// Returns the workers reported offline, in page order.
    pub fn offline_workers(&self) -> impl Iterator<Item = &WorkerStatusRecord> {
        self.workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Offline)
    }
}

/// Baseline for delta-based detection: the latest committed summary of a
/// pool plus the payout history the detector needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Latest committed summary.
    pub summary: SummarySnapshot,
    /// Time of the latest committed snapshot whose balance dropped below its
    /// predecessor's, if any.
    pub last_payout_at: Option<DateTime<Utc>>,
    /// Time of the pool's first committed snapshot.
    pub first_seen_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn worker_status_parses_case_insensitively() {
        assert!(matches!("ONLINE".parse::<WorkerStatus>(), Ok(WorkerStatus::Online)));
        assert!(matches!(" offline ".parse::<WorkerStatus>(), Ok(WorkerStatus::Offline)));
        assert!("IDLE".parse::<WorkerStatus>().is_err());
    }

    #[test]
    fn worker_status_serializes_upper_case() {
        let json = serde_json::to_string(&WorkerStatus::Offline).unwrap_or_default();
        assert_eq!(json, "\"OFFLINE\"");
        assert_eq!(WorkerStatus::Online.as_str(), "ONLINE");
    }

    #[test]
    fn cycle_id_round_trips_through_text() {
        let id = CycleId::new();
        let Ok(parsed) = id.to_string().parse::<CycleId>() else {
            panic!("cycle id did not parse");
        };
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<CycleId>().is_err());
    }
}
