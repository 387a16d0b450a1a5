//! Domain layer: pool identity, snapshot records, anomalies and events.
//!
//! This module contains the observer's domain model: validated pool
//! identifiers and administrative identity records, the raw field bag a fetch
//! produces, the canonical records a cycle commits, anomaly classifications,
//! and the event bus announcing cycle outcomes.

pub mod anomaly;
pub mod cycle_event;
pub mod event_bus;
pub mod pool_id;
pub mod pool_identity;
pub mod raw;
pub mod snapshot;

pub use anomaly::{AnomalyCandidate, AnomalyEvent, AnomalyType, Severity};
pub use cycle_event::CycleEvent;
pub use event_bus::EventBus;
pub use pool_id::PoolId;
pub use pool_identity::{NewPool, PoolIdentity, PoolUpdate};
pub use raw::{RawEarningRow, RawPage, RawSummary, RawWorkerRow};
pub use snapshot::{
    Baseline, CycleId, DailyEarningsRecord, Snapshot, SummarySnapshot, WorkerStatus,
    WorkerStatusRecord,
};
