//! Shared application state injected into all Axum handlers.

use chrono::{DateTime, Utc};

use crate::persistence::SqliteStore;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Snapshot store backing every viewer and admin endpoint.
    pub store: SqliteStore,
    /// Process start time, reported by `/health`.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates the state for a freshly started process.
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
            started_at: Utc::now(),
        }
    }
}
