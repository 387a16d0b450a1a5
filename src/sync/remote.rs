//! Event-driven push of committed cycles to a [`RemoteSink`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use super::{RemoteBatch, RemoteSink, WriteMode};
use crate::config::SyncConfig;
use crate::domain::{CycleEvent, CycleId, PoolId};
use crate::error::ObserverError;
use crate::persistence::SqliteStore;
use crate::retry::retry_async;

/// Reads committed cycles from the store and pushes them to a sink.
#[derive(Debug)]
pub struct RemoteSync<S> {
    sink: Arc<S>,
    store: SqliteStore,
    max_attempts: usize,
    initial_backoff: Duration,
    earnings_window: u32,
}

impl<S: RemoteSink> RemoteSync<S> {
    /// Creates a sync worker with the retry and window settings of `config`.
    #[must_use]
    pub fn new(sink: Arc<S>, store: SqliteStore, config: &SyncConfig) -> Self {
        Self {
            sink,
            store,
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            earnings_window: config.earnings_window,
        }
    }

    /// Pushes everything one committed cycle wrote, plus the pool identity
    /// and its most recent daily earnings. Returns the number of rows sent.
    ///
    /// A cycle that is no longer in the store (removed by retention) is
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::RemoteSync`] once a batch exhausts its
    /// attempts, or a store error if the cycle cannot be read back.
    pub async fn sync_cycle(&self, cycle_id: &CycleId) -> Result<usize, ObserverError> {
        let Some(batches) = self.batches_for(cycle_id).await? else {
            tracing::debug!(%cycle_id, "cycle no longer stored, sync skipped");
            return Ok(0);
        };

        let mut rows = 0;
        for batch in &batches {
            self.push(batch).await?;
            rows += batch.rows.len();
        }
        Ok(rows)
    }

    /// Pushes the latest committed cycle of a pool, if any.
    ///
    /// # Errors
    ///
    /// See [`RemoteSync::sync_cycle`].
    pub async fn sync_latest(&self, pool_id: &PoolId) -> Result<usize, ObserverError> {
        match self.store.read_latest(pool_id).await? {
            Some(latest) => self.sync_cycle(&latest.cycle_id).await,
            None => Ok(0),
        }
    }

    /// Consumes cycle events until `shutdown` flips to `true` or the bus
    /// closes. A lagged receiver re-syncs the latest cycle of every pool.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<CycleEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("remote sync started");
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(CycleEvent::CycleCommitted { pool_id, cycle_id, .. }) => {
                        self.sync_committed(&pool_id, &cycle_id).await;
                    }
                    Ok(CycleEvent::CycleFailed { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "sync lagged, re-syncing latest cycles");
                        self.resync_all().await;
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("remote sync stopped");
    }

    async fn sync_committed(&self, pool_id: &PoolId, cycle_id: &CycleId) {
        match self.sync_cycle(cycle_id).await {
            Ok(rows) => tracing::info!(%pool_id, %cycle_id, rows, "cycle synced"),
            Err(e) => tracing::error!(%pool_id, %cycle_id, error = %e, "cycle sync failed"),
        }
    }

    async fn resync_all(&self) {
        let pools = match self.store.list_pools(false).await {
            Ok(pools) => pools,
            Err(e) => {
                tracing::error!(error = %e, "cannot list pools for re-sync");
                return;
            }
        };
        for pool in pools {
            if let Err(e) = self.sync_latest(&pool.pool_id).await {
                tracing::error!(pool_id = %pool.pool_id, error = %e, "re-sync failed");
            }
        }
    }

    async fn push(&self, batch: &RemoteBatch) -> Result<(), ObserverError> {
        let sink = self.sink.as_ref();
        retry_async(
            |attempt| {
                if attempt > 1 {
                    tracing::warn!(table = batch.table, attempt, "retrying remote push");
                }
                sink.push(batch)
            },
            self.max_attempts,
            self.initial_backoff,
            |e| matches!(e, ObserverError::RemoteSync(_)),
        )
        .await
    }

    async fn batches_for(
        &self,
        cycle_id: &CycleId,
    ) -> Result<Option<Vec<RemoteBatch>>, ObserverError> {
        let Some(cycle) = self.store.read_cycle(cycle_id).await? else {
            return Ok(None);
        };
        let pool_id = &cycle.summary.summary.pool_id;
        let identity = self.store.get_pool(pool_id).await?;
        let earnings = self
            .store
            .read_daily_earnings(pool_id, self.earnings_window)
            .await?;

        let workers = cycle
            .workers
            .iter()
            .map(|w| {
                json!({
                    "cycle_id": cycle_id,
                    "pool_id": w.pool_id,
                    "timestamp": w.timestamp,
                    "worker_name": w.worker_name,
                    "status": w.status.as_str(),
                    "hashrate_10m": w.hashrate_10m,
                    "hashrate_1h": w.hashrate_1h,
                    "hashrate_24h": w.hashrate_24h,
                    "last_exchange_time": w.last_exchange_time,
                })
            })
            .collect();
        let anomalies = cycle
            .anomalies
            .iter()
            .map(|a| {
                json!({
                    "cycle_id": a.cycle_id,
                    "pool_id": a.pool_id,
                    "timestamp": a.timestamp,
                    "anomaly_type": a.anomaly_type.as_str(),
                    "description": a.description,
                    "severity": a.severity.as_str(),
                    "resolved": a.resolved,
                })
            })
            .collect();

        Ok(Some(vec![
            RemoteBatch {
                table: "pool_metadata",
                rows: vec![to_row(&identity)?],
                on_conflict: "pool_id",
                mode: WriteMode::Upsert,
            },
            RemoteBatch {
                table: "pool_summary",
                rows: vec![to_row(&cycle.summary)?],
                on_conflict: "cycle_id",
                mode: WriteMode::Insert,
            },
            RemoteBatch {
                table: "worker_status",
                rows: workers,
                on_conflict: "cycle_id,worker_name",
                mode: WriteMode::Insert,
            },
            RemoteBatch {
                table: "anomaly_log",
                rows: anomalies,
                on_conflict: "cycle_id,anomaly_type",
                mode: WriteMode::Insert,
            },
            RemoteBatch {
                table: "daily_earnings",
                rows: earnings.iter().map(to_row).collect::<Result<_, _>>()?,
                on_conflict: "pool_id,date",
                mode: WriteMode::Upsert,
            },
        ]))
    }
}

fn to_row<T: Serialize>(value: &T) -> Result<Value, ObserverError> {
    serde_json::to_value(value).map_err(|e| ObserverError::Internal(format!("sync row: {e}")))
}
