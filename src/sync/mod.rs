//! Remote sync: forwards committed cycles to a remote data store.
//!
//! [`RemoteSync`] listens for `CycleCommitted` events, reads the committed
//! rows back from the local store and hands them to a [`RemoteSink`] as
//! [`RemoteBatch`]es keyed by `pool_id`. The shipped sink is
//! [`PostgrestSink`], which upserts into a PostgREST (Supabase) endpoint.
//! Delivery is at-least-once. Identities and daily earnings are upserted;
//! time-series rows are inserted with duplicates ignored, so a repeated push
//! never creates a second row.

pub mod postgrest;
pub mod remote;

use std::fmt;
use std::future::Future;

pub use postgrest::PostgrestSink;
pub use remote::RemoteSync;

use crate::error::ObserverError;

/// How a batch treats rows whose conflict key already exists remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Overwrite the existing row.
    Upsert,
    /// Keep the existing row.
    Insert,
}

/// Rows for one remote table.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBatch {
    /// Remote table name.
    pub table: &'static str,
    /// JSON objects, one per row.
    pub rows: Vec<serde_json::Value>,
    /// Comma-separated unique columns identifying a row remotely.
    pub on_conflict: &'static str,
    /// Conflict handling.
    pub mode: WriteMode,
}

impl RemoteBatch {
    /// Returns `true` if the batch carries no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Destination of remote sync.
pub trait RemoteSink: Send + Sync + fmt::Debug {
    /// Pushes one batch.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::RemoteSync`] if the remote store rejects or
    /// fails the push.
    fn push(&self, batch: &RemoteBatch) -> impl Future<Output = Result<(), ObserverError>> + Send;
}
