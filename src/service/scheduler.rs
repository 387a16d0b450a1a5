//! Periodic per-pool scrape loops.
//!
//! [`Scheduler::spawn`] starts one Tokio task per configured pool. Each task
//! ticks at the pool's interval and runs a cycle through the shared
//! [`CycleRunner`]. A slow cycle delays the next tick instead of stacking
//! cycles, and a shutdown signal stops scheduling without cutting short a
//! cycle that is already committing.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};

use crate::config::PoolConfig;
use crate::error::ObserverError;
use crate::fetch::PageFetcher;
use crate::pipeline::{AnomalyDetector, CycleOutcome, CycleRunner};

/// Drives scrape cycles for every configured pool.
#[derive(Debug)]
pub struct Scheduler<F> {
    runner: CycleRunner<F>,
    default_interval: Duration,
}

impl<F> Clone for Scheduler<F> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            default_interval: self.default_interval,
        }
    }
}

impl<F: PageFetcher + 'static> Scheduler<F> {
    /// Creates a scheduler using `default_interval` for pools without an
    /// override.
    #[must_use]
    pub const fn new(runner: CycleRunner<F>, default_interval: Duration) -> Self {
        Self {
            runner,
            default_interval,
        }
    }

    /// Runs one cycle for a configured pool.
    ///
    /// The identity is re-read from the store first: the stored observer
    /// URL wins over the configured one and an inactive pool is skipped
    /// (`Ok(None)`).
    ///
    /// # Errors
    ///
    /// Returns the error that abandoned the cycle.
    pub async fn run_once(&self, pool: &PoolConfig) -> Result<Option<CycleOutcome>, ObserverError> {
        let pool_id = pool.pool_id();
        let observer_url = match self.runner.store().get_pool(pool_id).await {
            Ok(identity) if !identity.active => {
                tracing::debug!(%pool_id, "pool inactive, cycle skipped");
                return Ok(None);
            }
            Ok(identity) => identity.observer_url,
            Err(ObserverError::UnknownPool(_)) => pool.identity.observer_url.clone(),
            Err(e) => return Err(e),
        };

        let detector = AnomalyDetector::new(pool.thresholds.clone());
        self.runner
            .run(pool_id, &observer_url, &detector)
            .await
            .map(Some)
    }

    /// Spawns one loop per pool. The loops exit once `shutdown` flips to
    /// `true` (or its sender is dropped).
    pub fn spawn(&self, pools: Vec<PoolConfig>, shutdown: watch::Receiver<bool>) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for pool in pools {
            let scheduler = self.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move { scheduler.pool_loop(pool, shutdown).await });
        }
        tasks
    }

    async fn pool_loop(self, pool: PoolConfig, mut shutdown: watch::Receiver<bool>) {
        let period = pool.interval(self.default_interval);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            pool_id = %pool.pool_id(),
            interval_secs = period.as_secs(),
            "scrape loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }
            // failures are logged and published by the runner
            let _ = self.run_once(&pool).await;
        }
        tracing::info!(pool_id = %pool.pool_id(), "scrape loop stopped");
    }
}
