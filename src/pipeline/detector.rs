//! Threshold-based anomaly detection.
//!
//! [`AnomalyDetector`] compares a freshly normalized [`Snapshot`] with the
//! pool's committed [`Baseline`] and returns candidate events. It holds no
//! business constants of its own: every threshold comes from
//! [`AnomalyThresholds`], which pools configure individually.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::{AnomalyCandidate, AnomalyType, Baseline, Severity, Snapshot};
use crate::error::ObserverError;

/// Maximum number of offline worker names listed in a description.
const LISTED_OFFLINE_WORKERS: usize = 5;

/// Maps a metric value to a severity.
///
/// `high` is exclusive (`value > high`), `medium` and `low` are inclusive.
/// When several bands match the highest severity wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBand {
    /// Values strictly above this are [`Severity::High`].
    pub high: f64,
    /// Values at or above this are [`Severity::Medium`].
    pub medium: f64,
    /// Values at or above this are [`Severity::Low`]; `None` disables it.
    #[serde(default)]
    pub low: Option<f64>,
}

impl SeverityBand {
    /// Creates a band without a low tier.
    #[must_use]
    pub const fn new(high: f64, medium: f64) -> Self {
        Self {
            high,
            medium,
            low: None,
        }
    }

    /// Returns the severity for `value`, or `None` below every tier.
    #[must_use]
    pub fn classify(&self, value: f64) -> Option<Severity> {
        if value > self.high {
            Some(Severity::High)
        } else if value >= self.medium {
            Some(Severity::Medium)
        } else if self.low.is_some_and(|low| value >= low) {
            Some(Severity::Low)
        } else {
            None
        }
    }

    fn validate(&self, name: &str) -> Result<(), ObserverError> {
        let ordered = self.medium <= self.high && self.low.is_none_or(|low| low <= self.medium);
        let finite = self.high.is_finite()
            && self.medium.is_finite()
            && self.low.is_none_or(f64::is_finite);
        if ordered && finite {
            Ok(())
        } else {
            Err(ObserverError::Config(format!(
                "{name} band must satisfy low <= medium <= high"
            )))
        }
    }
}

/// Per-pool anomaly thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// Offline worker count. Default: HIGH above 5, MEDIUM from 1.
    pub offline_workers: SeverityBand,
    /// Relative drop of the 24h average hashrate against the baseline.
    /// Default: HIGH above 30 %, MEDIUM from 20 %.
    pub hashrate_drop: SeverityBand,
    /// Relative balance drop against the baseline. Disabled by default
    /// because every payout also lowers the balance.
    pub balance_drop: Option<SeverityBand>,
    /// Hours since the last observed payout. Disabled by default.
    pub payment_delay_hours: Option<SeverityBand>,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            offline_workers: SeverityBand::new(5.0, 1.0),
            hashrate_drop: SeverityBand::new(0.30, 0.20),
            balance_drop: None,
            payment_delay_hours: None,
        }
    }
}

impl AnomalyThresholds {
    /// Checks that every band is ordered and finite.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Config`] naming the first invalid band.
    pub fn validate(&self) -> Result<(), ObserverError> {
        self.offline_workers.validate("offline_workers")?;
        self.hashrate_drop.validate("hashrate_drop")?;
        if let Some(band) = &self.balance_drop {
            band.validate("balance_drop")?;
        }
        if let Some(band) = &self.payment_delay_hours {
            band.validate("payment_delay_hours")?;
        }
        Ok(())
    }
}

/// Stateless rule engine over one snapshot and its baseline.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl AnomalyDetector {
    /// Creates a detector with the given thresholds.
    #[must_use]
    pub const fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Returns the thresholds in use.
    #[must_use]
    pub const fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    /// Runs every rule and returns the raised candidates.
    ///
    /// Offline workers are checked on every cycle. Delta rules need a
    /// baseline, so the first cycle of a pool only establishes one.
    #[must_use]
    pub fn detect(
        &self,
        snapshot: &Snapshot,
        baseline: Option<&Baseline>,
    ) -> Vec<AnomalyCandidate> {
        let mut raised: Vec<AnomalyCandidate> =
            self.offline_workers(snapshot).into_iter().collect();
        if let Some(baseline) = baseline {
            raised.extend(self.hashrate_drop(snapshot, baseline));
            raised.extend(self.balance_drop(snapshot, baseline));
            raised.extend(self.payment_delay(snapshot, baseline));
        }
        raised
    }

    fn offline_workers(&self, snapshot: &Snapshot) -> Option<AnomalyCandidate> {
        let names: Vec<&str> = snapshot
            .offline_workers()
            .map(|w| w.worker_name.as_str())
            .collect();
        let reported = usize::try_from(snapshot.summary.offline_workers).unwrap_or(usize::MAX);
        let count = names.len().max(reported);
        let severity = self.thresholds.offline_workers.classify(count as f64)?;

        let mut description = format!("{count} worker(s) offline");
        if !names.is_empty() {
            let listed: Vec<&str> = names.iter().copied().take(LISTED_OFFLINE_WORKERS).collect();
            description.push_str(": ");
            description.push_str(&listed.join(", "));
            if names.len() > LISTED_OFFLINE_WORKERS {
                description.push_str(&format!(" (+{} more)", names.len() - LISTED_OFFLINE_WORKERS));
            }
        }

        Some(AnomalyCandidate {
            anomaly_type: AnomalyType::OfflineWorkers,
            severity,
            description,
        })
    }

    fn hashrate_drop(&self, snapshot: &Snapshot, baseline: &Baseline) -> Option<AnomalyCandidate> {
        let prior = baseline.summary.avg_hashrate_24h;
        if prior <= 0.0 {
            return None;
        }
        let current = snapshot.summary.avg_hashrate_24h;
        let drop = (prior - current) / prior;
        let severity = self.thresholds.hashrate_drop.classify(drop)?;
        Some(AnomalyCandidate {
            anomaly_type: AnomalyType::HashrateDrop,
            severity,
            description: format!(
                "24h average hashrate dropped {:.1}% \
                 ({current:.3} TH/s vs baseline {prior:.3} TH/s)",
                drop * 100.0
            ),
        })
    }

    fn balance_drop(&self, snapshot: &Snapshot, baseline: &Baseline) -> Option<AnomalyCandidate> {
        let band = self.thresholds.balance_drop.as_ref()?;
        let prior = baseline.summary.balance;
        if prior <= rust_decimal::Decimal::ZERO {
            return None;
        }
        let current = snapshot.summary.balance;
        let drop = ((prior - current) / prior).to_f64()?;
        let severity = band.classify(drop)?;
        Some(AnomalyCandidate {
            anomaly_type: AnomalyType::BalanceAnomaly,
            severity,
            description: format!(
                "balance fell {:.1}% ({current} vs baseline {prior})",
                drop * 100.0
            ),
        })
    }

    fn payment_delay(&self, snapshot: &Snapshot, baseline: &Baseline) -> Option<AnomalyCandidate> {
        let band = self.thresholds.payment_delay_hours.as_ref()?;
        if snapshot.summary.balance < baseline.summary.balance {
            // payout in this very cycle
            return None;
        }
        let since: DateTime<Utc> = baseline.last_payout_at.unwrap_or(baseline.first_seen_at);
        let hours = (snapshot.summary.timestamp - since).num_seconds() as f64 / 3600.0;
        let severity = band.classify(hours)?;
        let reference = if baseline.last_payout_at.is_some() {
            "last payout"
        } else {
            "first observation"
        };
        Some(AnomalyCandidate {
            anomaly_type: AnomalyType::PaymentDelay,
            severity,
            description: format!(
                "no payout observed for {hours:.1}h ({reference} at {})",
                since.to_rfc3339()
            ),
        })
    }
}
