//! One scrape cycle, end to end.
//!
//! fetch (bounded, one retry on transient failure) → acquire the pool's
//! commit lock → normalize → read baseline → detect → commit → publish.
//!
//! Nothing touches the store before the fetch succeeded, and the commit lock
//! is never held across the network call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use tracing::Instrument;

use super::detector::AnomalyDetector;
use super::normalizer::normalize;
use crate::domain::{AnomalyCandidate, CycleEvent, CycleId, EventBus, PoolId, RawPage};
use crate::error::{ErrorClass, ObserverError};
use crate::fetch::{PageFetcher, check_complete};
use crate::persistence::SqliteStore;
use crate::retry::retry_async;
use crate::service::PoolLocks;

/// The initial fetch plus one retry.
const FETCH_ATTEMPTS: usize = 2;

/// What a committed cycle wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Identifier shared by every row of the cycle.
    pub cycle_id: CycleId,
    /// Worker rows written.
    pub workers: usize,
    /// Daily earnings rows upserted.
    pub daily_earnings: usize,
    /// Anomalies raised and written.
    pub anomalies: Vec<AnomalyCandidate>,
}

/// Runs scrape cycles against a shared store.
#[derive(Debug)]
pub struct CycleRunner<F> {
    fetcher: Arc<F>,
    store: SqliteStore,
    locks: Arc<PoolLocks>,
    events: EventBus,
    fetch_timeout: Duration,
    retry_delay: Duration,
}

impl<F> Clone for CycleRunner<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            store: self.store.clone(),
            locks: Arc::clone(&self.locks),
            events: self.events.clone(),
            fetch_timeout: self.fetch_timeout,
            retry_delay: self.retry_delay,
        }
    }
}

impl<F: PageFetcher> CycleRunner<F> {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        fetcher: Arc<F>,
        store: SqliteStore,
        locks: Arc<PoolLocks>,
        events: EventBus,
        fetch_timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            locks,
            events,
            fetch_timeout,
            retry_delay,
        }
    }

    /// Returns the store cycles are committed to.
    #[must_use]
    pub const fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Runs one cycle for a pool and publishes its outcome.
    ///
    /// # Errors
    ///
    /// Returns the error that abandoned the cycle. Nothing of an abandoned
    /// cycle is persisted.
    pub async fn run(
        &self,
        pool_id: &PoolId,
        observer_url: &str,
        detector: &AnomalyDetector,
    ) -> Result<CycleOutcome, ObserverError> {
        let span = tracing::info_span!("cycle", %pool_id);
        let result = self
            .execute(pool_id, observer_url, detector)
            .instrument(span.clone())
            .await;
        let event = span.in_scope(|| match &result {
            Ok(outcome) => {
                tracing::info!(
                    cycle_id = %outcome.cycle_id,
                    workers = outcome.workers,
                    daily_earnings = outcome.daily_earnings,
                    anomalies = outcome.anomalies.len(),
                    "cycle committed"
                );
                CycleEvent::CycleCommitted {
                    pool_id: pool_id.clone(),
                    cycle_id: outcome.cycle_id,
                    workers: outcome.workers,
                    daily_earnings: outcome.daily_earnings,
                    anomalies: outcome.anomalies.len(),
                    timestamp: Utc::now(),
                }
            }
            Err(err) => {
                log_failure(err);
                CycleEvent::CycleFailed {
                    pool_id: pool_id.clone(),
                    class: err.class(),
                    message: err.to_string(),
                    timestamp: Utc::now(),
                }
            }
        });
        self.events.publish(event);
        result
    }

    async fn execute(
        &self,
        pool_id: &PoolId,
        observer_url: &str,
        detector: &AnomalyDetector,
    ) -> Result<CycleOutcome, ObserverError> {
        let raw = self.fetch_page(observer_url).await?;
        tracing::debug!(
            workers = raw.workers.len(),
            daily_earnings = raw.daily_earnings.len(),
            "page extracted"
        );

        let _guard = self.locks.acquire(pool_id).await;
        let observed_at = Utc::now().trunc_subsecs(6);
        let snapshot = normalize(pool_id, &raw, observed_at)?;
        let baseline = self.store.read_baseline(pool_id).await?;
        if baseline.is_none() {
            tracing::info!("first cycle for pool, establishing baseline");
        }
        let anomalies = detector.detect(&snapshot, baseline.as_ref());
        for anomaly in &anomalies {
            tracing::warn!(
                anomaly_type = %anomaly.anomaly_type,
                severity = %anomaly.severity,
                "{}",
                anomaly.description
            );
        }

        let cycle_id = self.store.commit_cycle(pool_id, &snapshot, &anomalies).await?;
        Ok(CycleOutcome {
            cycle_id,
            workers: snapshot.workers.len(),
            daily_earnings: snapshot.daily_earnings.len(),
            anomalies,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<RawPage, ObserverError> {
        retry_async(
            |attempt| async move {
                let result = self.fetch_once(url).await;
                if let Err(e) = &result {
                    tracing::debug!(attempt, error = %e, "fetch attempt failed");
                }
                result
            },
            FETCH_ATTEMPTS,
            self.retry_delay,
            ObserverError::is_transient,
        )
        .await
    }

    async fn fetch_once(&self, url: &str) -> Result<RawPage, ObserverError> {
        let page = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| ObserverError::FetchTimeout {
                url: url.to_string(),
                timeout_secs: self.fetch_timeout.as_secs(),
            })??;
        check_complete(&page)?;
        Ok(page)
    }
}

fn log_failure(err: &ObserverError) {
    match err.class() {
        ErrorClass::Transient => tracing::warn!(error = %err, "cycle abandoned, transient failure"),
        ErrorClass::Structural => {
            tracing::error!(error = %err, "cycle abandoned, page does not match the known layout");
        }
        ErrorClass::Referential => {
            tracing::error!(error = %err, "cycle abandoned, pool identity is not provisioned");
        }
        ErrorClass::Storage => tracing::error!(error = %err, "cycle rolled back"),
        ErrorClass::Request | ErrorClass::Internal => tracing::error!(error = %err, "cycle failed"),
    }
}
