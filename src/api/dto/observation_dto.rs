//! Query parameters and responses of the observation viewer endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PoolId, WorkerStatusRecord};

/// Maximum look-back accepted by `days` and `hours` parameters.
pub const MAX_LOOKBACK_DAYS: u32 = 366;

/// Query for `GET /pools/{id}/workers`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkersParams {
    /// Only return offline workers.
    #[serde(default)]
    pub offline_only: bool,
}

/// Query for `GET /pools/{id}/earnings`.
#[derive(Debug, Clone, Deserialize)]
pub struct EarningsParams {
    /// Number of most recent days. Defaults to 30.
    #[serde(default = "default_days")]
    pub days: u32,
}

impl Default for EarningsParams {
    fn default() -> Self {
        Self {
            days: default_days(),
        }
    }
}

fn default_days() -> u32 {
    30
}

impl EarningsParams {
    /// Returns `days` clamped to `1..=MAX_LOOKBACK_DAYS`.
    #[must_use]
    pub fn clamped_days(&self) -> u32 {
        self.days.clamp(1, MAX_LOOKBACK_DAYS)
    }
}

/// Query for `GET /pools/{id}/summaries`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryParams {
    /// Look-back window in hours. Defaults to 24.
    #[serde(default = "default_hours")]
    pub hours: u32,
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            hours: default_hours(),
        }
    }
}

fn default_hours() -> u32 {
    24
}

impl HistoryParams {
    /// Returns the lower time bound of the window.
    #[must_use]
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let hours = self.hours.clamp(1, MAX_LOOKBACK_DAYS * 24);
        now - chrono::Duration::hours(i64::from(hours))
    }
}

/// Query for the anomaly listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnomalyParams {
    /// Only anomalies raised within the last `hours`; all when absent.
    #[serde(default)]
    pub hours: Option<u32>,
    /// Only anomalies not yet resolved.
    #[serde(default)]
    pub unresolved: bool,
}

impl AnomalyParams {
    /// Returns the lower time bound implied by `hours`, if any.
    #[must_use]
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.hours.map(|hours| {
            let hours = hours.min(MAX_LOOKBACK_DAYS * 24);
            now - chrono::Duration::hours(i64::from(hours))
        })
    }
}

/// Response of `GET /pools/{id}/workers`.
#[derive(Debug, Serialize)]
pub struct WorkersResponse {
    /// Pool identifier.
    pub pool_id: PoolId,
    /// Observation time of the listed rows; `None` before the first cycle.
    pub timestamp: Option<DateTime<Utc>>,
    /// Online rows in the latest cycle.
    pub online: usize,
    /// Offline rows in the latest cycle.
    pub offline: usize,
    /// Worker rows, page order.
    pub workers: Vec<WorkerStatusRecord>,
}
