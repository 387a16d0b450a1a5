//! Anomaly classifications, severities and events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CycleId, PoolId};
use crate::error::ObserverError;

/// Classification of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    /// One or more workers reported offline.
    OfflineWorkers,
    /// 24h average hashrate fell against the baseline.
    HashrateDrop,
    /// Balance fell against the baseline.
    BalanceAnomaly,
    /// No payout observed for longer than expected.
    PaymentDelay,
}

impl AnomalyType {
    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OfflineWorkers => "OFFLINE_WORKERS",
            Self::HashrateDrop => "HASHRATE_DROP",
            Self::BalanceAnomaly => "BALANCE_ANOMALY",
            Self::PaymentDelay => "PAYMENT_DELAY",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyType {
    type Err = ObserverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFFLINE_WORKERS" => Ok(Self::OfflineWorkers),
            "HASHRATE_DROP" => Ok(Self::HashrateDrop),
            "BALANCE_ANOMALY" => Ok(Self::BalanceAnomaly),
            "PAYMENT_DELAY" => Ok(Self::PaymentDelay),
            other => Err(ObserverError::Internal(format!(
                "unknown anomaly type {other:?}"
            ))),
        }
    }
}

/// Severity of an anomaly. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Worth a look.
    Low,
    /// Needs attention soon.
    Medium,
    /// Needs attention now.
    High,
}

impl Severity {
    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ObserverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            other => Err(ObserverError::Internal(format!("unknown severity {other:?}"))),
        }
    }
}

/// An anomaly raised by the detector and not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyCandidate {
    /// Classification.
    pub anomaly_type: AnomalyType,
    /// Severity after banding.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
}

/// A persisted anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// Row id.
    pub id: i64,
    /// Pool the anomaly belongs to.
    pub pool_id: PoolId,
    /// Cycle whose snapshot triggered the anomaly.
    pub cycle_id: CycleId,
    /// Cycle observation time.
    pub timestamp: DateTime<Utc>,
    /// Classification.
    pub anomaly_type: AnomalyType,
    /// Human-readable description.
    pub description: String,
    /// Severity.
    pub severity: Severity,
    /// Whether an operator marked it resolved.
    pub resolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(
            [Severity::Medium, Severity::High, Severity::Low]
                .into_iter()
                .max(),
            Some(Severity::High)
        );
    }

    #[test]
    fn anomaly_type_text_round_trip() {
        for t in [
            AnomalyType::OfflineWorkers,
            AnomalyType::HashrateDrop,
            AnomalyType::BalanceAnomaly,
            AnomalyType::PaymentDelay,
        ] {
            assert!(matches!(t.as_str().parse::<AnomalyType>(), Ok(parsed) if parsed == t));
        }
        assert!("SOMETHING".parse::<AnomalyType>().is_err());
    }

    #[test]
    fn serde_matches_stored_text() {
        let json = serde_json::to_string(&AnomalyType::HashrateDrop).unwrap_or_default();
        assert_eq!(json, "\"HASHRATE_DROP\"");
        let json = serde_json::to_string(&Severity::Medium).unwrap_or_default();
        assert_eq!(json, "\"MEDIUM\"");
    }
}
