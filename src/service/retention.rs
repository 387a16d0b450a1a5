//! Periodic deletion of old time-series rows.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::error::ObserverError;
use crate::persistence::SqliteStore;

/// How often the retention pass runs.
pub const RETENTION_PERIOD: Duration = Duration::from_secs(3600);

/// Deletes summaries and worker rows older than `days`, keeping the newest
/// cycle of every pool. Returns `(summaries, workers)` deleted.
///
/// # Errors
///
/// Returns [`ObserverError::PersistenceError`] on database failure.
pub async fn apply_retention(store: &SqliteStore, days: u64) -> Result<(u64, u64), ObserverError> {
    let workers = store.delete_worker_status_before(days).await?;
    let summaries = store.delete_summaries_before(days).await?;
    if summaries > 0 || workers > 0 {
        tracing::info!(days, summaries, workers, "old observations deleted");
    }
    Ok((summaries, workers))
}

/// Runs [`apply_retention`] every [`RETENTION_PERIOD`] until `shutdown`
/// flips to `true`.
pub fn spawn_retention(
    store: SqliteStore,
    days: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(RETENTION_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = apply_retention(&store, days).await {
                        tracing::error!(error = %e, "retention pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
