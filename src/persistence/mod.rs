//! Persistence layer: the SQLite snapshot store.
//!
//! [`SqliteStore`] owns the five observer tables (pool identities,
//! summaries, worker status, daily earnings and the anomaly log) and writes
//! every scrape cycle as one transaction. The schema is created by the
//! embedded migrations under `migrations/`.

pub mod models;
pub mod sqlite;

pub use models::{CycleRecord, StoreStats, StoredSummary, TableStats};
pub use sqlite::SqliteStore;
