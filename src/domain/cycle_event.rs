//! Domain events reflecting scrape cycle outcomes.
//!
//! Every finished cycle emits a [`CycleEvent`] through the
//! [`super::EventBus`]. Remote sync listens for committed cycles; failed
//! cycles are published so that monitors can react without parsing logs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CycleId, PoolId};
use crate::error::ErrorClass;

/// Domain event emitted after every cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CycleEvent {
    /// Emitted after a cycle's transaction committed.
    CycleCommitted {
        /// Pool identifier.
        pool_id: PoolId,
        /// Committed cycle.
        cycle_id: CycleId,
        /// Number of worker rows written.
        workers: usize,
        /// Number of daily earnings rows upserted.
        daily_earnings: usize,
        /// Number of anomaly events written.
        anomalies: usize,
        /// Cycle observation time.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a cycle was abandoned without writing anything.
    CycleFailed {
        /// Pool identifier.
        pool_id: PoolId,
        /// Failure class.
        class: ErrorClass,
        /// Error message.
        message: String,
        /// Failure time.
        timestamp: DateTime<Utc>,
    },
}

impl CycleEvent {
    /// Returns the pool ID associated with this event.
    #[must_use]
    pub fn pool_id(&self) -> &PoolId {
        match self {
            Self::CycleCommitted { pool_id, .. } | Self::CycleFailed { pool_id, .. } => pool_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::CycleCommitted { .. } => "cycle_committed",
            Self::CycleFailed { .. } => "cycle_failed",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn pool() -> PoolId {
        let Ok(id) = PoolId::new("kz-01") else {
            panic!("valid id");
        };
        id
    }

    #[test]
    fn committed_event_serializes_tagged() {
        let event = CycleEvent::CycleCommitted {
            pool_id: pool(),
            cycle_id: CycleId::new(),
            workers: 12,
            daily_earnings: 3,
            anomalies: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"cycle_committed\""));
        assert!(json.contains("\"workers\":12"));
        assert_eq!(event.event_type_str(), "cycle_committed");
    }

    #[test]
    fn failed_event_carries_class() {
        let event = CycleEvent::CycleFailed {
            pool_id: pool(),
            class: ErrorClass::Transient,
            message: "fetch timed out".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.pool_id().as_str(), "kz-01");
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"class\":\"transient\""));
    }
}
