//! # pool-observer
//!
//! Scheduled observer for mining-pool dashboards.
//!
//! Every monitored pool is scraped on its own interval. A cycle fetches the
//! observer page, normalizes the raw fields into canonical records, compares
//! them with the pool's last committed snapshot to raise anomalies, and
//! commits everything in one SQLite transaction. Committed cycles are
//! announced on an in-process event bus and optionally pushed to a remote
//! PostgREST store. A small REST API exposes the history.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler (service/) ── one loop per pool
//!     │
//!     ├── PageFetcher (fetch/)        HTTP + HTML layout parser
//!     ├── normalize (pipeline/)       RawPage -> Snapshot
//!     ├── AnomalyDetector (pipeline/) Snapshot vs Baseline
//!     ├── SqliteStore (persistence/)  atomic commit per cycle
//!     │
//!     ├── EventBus (domain/) ──> RemoteSync (sync/) ──> PostgREST
//!     │
//!     └── REST API (api/) ── viewer and pool administration
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod persistence;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod sync;

#[cfg(test)]
#[allow(clippy::panic)]
mod test_support;
