//! SQLite implementation of the snapshot store.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use super::models::{
    ANOMALY_COLUMNS, AnomalyRow, CycleRecord, EARNING_COLUMNS, EarningRow, POOL_COLUMNS, PoolRow,
    SUMMARY_COLUMNS, StoreStats, StoredSummary, SummaryRow, TableStats, WORKER_COLUMNS, WorkerRow,
    anomaly_from_row, convert_all, decode_ts, earning_from_row, encode_date, encode_ts,
    pool_from_row, summary_from_row, worker_from_row,
};
use crate::domain::{
    AnomalyCandidate, AnomalyEvent, Baseline, CycleId, DailyEarningsRecord, NewPool, PoolId,
    PoolIdentity, PoolUpdate, Snapshot, WorkerStatusRecord,
};
use crate::error::ObserverError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed snapshot store using `sqlx::SqlitePool`.
///
/// One scrape cycle is written by [`SqliteStore::commit_cycle`] inside a
/// single transaction, so readers see either the whole cycle or nothing.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `database_url` and runs
    /// the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] if the database cannot be
    /// opened or migrated.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, ObserverError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    /// Opens a private in-memory database.
    ///
    /// The pool holds exactly one connection that is never recycled, since
    /// every SQLite memory connection is a separate database.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] if the database cannot be
    /// created or migrated.
    pub async fn in_memory() -> Result<Self, ObserverError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, ObserverError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ObserverError::PersistenceError(format!("migration failed: {e}")))?;
        Ok(Self { pool })
    }

    /// Opens a transaction holding the write lock from `BEGIN`, so it waits
    /// out the busy timeout instead of failing with `SQLITE_BUSY` when a
    /// read is later upgraded to a write.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, ObserverError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Checks that the database answers.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn ping(&self) -> Result<(), ObserverError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    // ---- pool identities ----

    /// Provisions a new pool identity.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::InvalidRequest`] for invalid fields,
    /// [`ObserverError::PoolExists`] if the id is taken, or
    /// [`ObserverError::PersistenceError`] on database failure.
    pub async fn create_pool(&self, new: &NewPool) -> Result<PoolIdentity, ObserverError> {
        new.validate()?;
        let now = Utc::now().trunc_subsecs(6);
        let identity = PoolIdentity {
            pool_id: new.pool_id.clone(),
            pool_name: new.pool_name.trim().to_string(),
            observer_url: new.observer_url.clone(),
            client_name: new.client_name.clone(),
            country: new.country.clone(),
            company: new.company.clone(),
            location: new.location.clone(),
            contact_email: new.contact_email.clone(),
            tags: new.tags.clone(),
            active: new.active,
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(&format!(
            "INSERT INTO pool_metadata ({POOL_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (pool_id) DO NOTHING"
        ))
        .bind(identity.pool_id.as_str())
        .bind(&identity.pool_name)
        .bind(&identity.observer_url)
        .bind(&identity.client_name)
        .bind(&identity.country)
        .bind(&identity.company)
        .bind(&identity.location)
        .bind(&identity.contact_email)
        .bind(encode_tags(&identity.tags)?)
        .bind(identity.active)
        .bind(encode_ts(&identity.created_at))
        .bind(encode_ts(&identity.updated_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ObserverError::PoolExists(identity.pool_id.to_string()));
        }
        tracing::info!(pool_id = %identity.pool_id, "pool provisioned");
        Ok(identity)
    }

    /// Loads one pool identity.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::UnknownPool`] if the pool is not provisioned
    /// or [`ObserverError::PersistenceError`] on database failure.
    pub async fn get_pool(&self, pool_id: &PoolId) -> Result<PoolIdentity, ObserverError> {
        let row = sqlx::query_as::<_, PoolRow>(&format!(
            "SELECT {POOL_COLUMNS} FROM pool_metadata WHERE pool_id = ?"
        ))
        .bind(pool_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ObserverError::UnknownPool(pool_id.to_string()))?;
        pool_from_row(row)
    }

    /// Lists pool identities ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn list_pools(&self, active_only: bool) -> Result<Vec<PoolIdentity>, ObserverError> {
        let rows = sqlx::query_as::<_, PoolRow>(&format!(
            "SELECT {POOL_COLUMNS} FROM pool_metadata WHERE (? = 0 OR active = 1) ORDER BY pool_id"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows, pool_from_row)
    }

    /// Applies an administrative update to a pool identity.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::UnknownPool`], [`ObserverError::InvalidRequest`]
    /// for invalid new values, or [`ObserverError::PersistenceError`].
    pub async fn update_pool(
        &self,
        pool_id: &PoolId,
        update: &PoolUpdate,
    ) -> Result<PoolIdentity, ObserverError> {
        let mut tx = self.begin_write().await?;

        let row = sqlx::query_as::<_, PoolRow>(&format!(
            "SELECT {POOL_COLUMNS} FROM pool_metadata WHERE pool_id = ?"
        ))
        .bind(pool_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ObserverError::UnknownPool(pool_id.to_string()))?;
        let mut identity = pool_from_row(row)?;
        update.apply(&mut identity)?;

        sqlx::query(
            "UPDATE pool_metadata SET pool_name = ?, observer_url = ?, client_name = ?, \
             country = ?, company = ?, location = ?, contact_email = ?, tags = ?, active = ?, \
             updated_at = ? WHERE pool_id = ?",
        )
        .bind(&identity.pool_name)
        .bind(&identity.observer_url)
        .bind(&identity.client_name)
        .bind(&identity.country)
        .bind(&identity.company)
        .bind(&identity.location)
        .bind(&identity.contact_email)
        .bind(encode_tags(&identity.tags)?)
        .bind(identity.active)
        .bind(encode_ts(&identity.updated_at))
        .bind(pool_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(%pool_id, active = identity.active, "pool updated");
        Ok(identity)
    }

    /// Enables or disables scraping of a pool.
    ///
    /// # Errors
    ///
    /// Same as [`SqliteStore::update_pool`].
    pub async fn set_pool_active(
        &self,
        pool_id: &PoolId,
        active: bool,
    ) -> Result<PoolIdentity, ObserverError> {
        let update = PoolUpdate {
            active: Some(active),
            ..PoolUpdate::default()
        };
        self.update_pool(pool_id, &update).await
    }

    // ---- cycle commit ----

    /// Writes one cycle atomically: the summary, every worker row, the daily
    /// earnings upserts and the anomaly events.
    ///
    /// The pool identity is checked inside the transaction. Any failure
    /// rolls the whole cycle back.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::UnknownPool`] if the pool is not provisioned
    /// or [`ObserverError::PersistenceError`] if any statement fails.
    pub async fn commit_cycle(
        &self,
        pool_id: &PoolId,
        snapshot: &Snapshot,
        anomalies: &[AnomalyCandidate],
    ) -> Result<CycleId, ObserverError> {
        let cycle_id = CycleId::new();
        let cycle = cycle_id.to_string();
        let summary = &snapshot.summary;
        let timestamp = encode_ts(&summary.timestamp);

        let mut tx = self.begin_write().await?;

        let known = sqlx::query_scalar::<_, i64>("SELECT 1 FROM pool_metadata WHERE pool_id = ?")
            .bind(pool_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if known.is_none() {
            return Err(ObserverError::UnknownPool(pool_id.to_string()));
        }

        sqlx::query(&format!(
            "INSERT INTO pool_summary ({SUMMARY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&cycle)
        .bind(pool_id.as_str())
        .bind(&timestamp)
        .bind(summary.current_hashrate)
        .bind(summary.avg_hashrate_24h)
        .bind(i64::from(summary.online_workers))
        .bind(i64::from(summary.offline_workers))
        .bind(summary.balance.to_string())
        .bind(summary.last_income.to_string())
        .execute(&mut *tx)
        .await?;

        for worker in &snapshot.workers {
            sqlx::query(&format!(
                "INSERT INTO worker_status (cycle_id, {WORKER_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&cycle)
            .bind(pool_id.as_str())
            .bind(&timestamp)
            .bind(&worker.worker_name)
            .bind(worker.status.as_str())
            .bind(worker.hashrate_10m)
            .bind(worker.hashrate_1h)
            .bind(worker.hashrate_24h)
            .bind(&worker.last_exchange_time)
            .execute(&mut *tx)
            .await?;
        }

        for earning in &snapshot.daily_earnings {
            sqlx::query(&format!(
                "INSERT INTO daily_earnings ({EARNING_COLUMNS}) VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT (pool_id, date) DO UPDATE SET \
                 total_income = excluded.total_income, \
                 hashrate = excluded.hashrate, \
                 recorded_at = excluded.recorded_at"
            ))
            .bind(pool_id.as_str())
            .bind(encode_date(&earning.date))
            .bind(earning.total_income.to_string())
            .bind(earning.hashrate)
            .bind(encode_ts(&earning.recorded_at))
            .execute(&mut *tx)
            .await?;
        }

        for anomaly in anomalies {
            sqlx::query(
                "INSERT INTO anomaly_log \
                 (pool_id, cycle_id, timestamp, anomaly_type, description, severity, resolved) \
                 VALUES (?, ?, ?, ?, ?, ?, 0)",
            )
            .bind(pool_id.as_str())
            .bind(&cycle)
            .bind(&timestamp)
            .bind(anomaly.anomaly_type.as_str())
            .bind(&anomaly.description)
            .bind(anomaly.severity.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(cycle_id)
    }

    // ---- reads ----

    /// Returns the latest committed summary of a pool.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn read_latest(
        &self,
        pool_id: &PoolId,
    ) -> Result<Option<StoredSummary>, ObserverError> {
        sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM pool_summary WHERE pool_id = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(pool_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(summary_from_row)
        .transpose()
    }

    /// Returns the worker rows of the latest committed cycle of a pool.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn read_latest_workers(
        &self,
        pool_id: &PoolId,
    ) -> Result<Vec<WorkerStatusRecord>, ObserverError> {
        let rows = sqlx::query_as::<_, WorkerRow>(&format!(
            "SELECT {WORKER_COLUMNS} FROM worker_status WHERE cycle_id = \
             (SELECT cycle_id FROM pool_summary WHERE pool_id = ? ORDER BY id DESC LIMIT 1) \
             ORDER BY id"
        ))
        .bind(pool_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows, worker_from_row)
    }

    /// Returns the detection baseline of a pool, or `None` before its first
    /// committed cycle.
    ///
    /// The last payout is the newest summary whose balance is lower than the
    /// balance of the summary before it.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn read_baseline(&self, pool_id: &PoolId) -> Result<Option<Baseline>, ObserverError> {
        let Some(latest) = self.read_latest(pool_id).await? else {
            return Ok(None);
        };

        let (first_seen, last_payout) = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT \
               (SELECT MIN(timestamp) FROM pool_summary WHERE pool_id = ?1), \
               (SELECT MAX(timestamp) FROM ( \
                  SELECT timestamp, CAST(balance AS REAL) AS balance, \
                         LAG(CAST(balance AS REAL)) OVER (ORDER BY id) AS previous \
                  FROM pool_summary WHERE pool_id = ?1) \
                WHERE previous IS NOT NULL AND balance < previous)",
        )
        .bind(pool_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        let first_seen_at = match first_seen {
            Some(ts) => decode_ts(&ts)?,
            None => latest.summary.timestamp,
        };
        let last_payout_at = last_payout.as_deref().map(decode_ts).transpose()?;

        Ok(Some(Baseline {
            summary: latest.summary,
            last_payout_at,
            first_seen_at,
        }))
    }

    /// Reads back everything one committed cycle wrote.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn read_cycle(
        &self,
        cycle_id: &CycleId,
    ) -> Result<Option<CycleRecord>, ObserverError> {
        let cycle = cycle_id.to_string();
        let Some(row) = sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM pool_summary WHERE cycle_id = ?"
        ))
        .bind(&cycle)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let workers = sqlx::query_as::<_, WorkerRow>(&format!(
            "SELECT {WORKER_COLUMNS} FROM worker_status WHERE cycle_id = ? ORDER BY id"
        ))
        .bind(&cycle)
        .fetch_all(&self.pool)
        .await?;
        let anomalies = sqlx::query_as::<_, AnomalyRow>(&format!(
            "SELECT {ANOMALY_COLUMNS} FROM anomaly_log WHERE cycle_id = ? ORDER BY id"
        ))
        .bind(&cycle)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(CycleRecord {
            summary: summary_from_row(row)?,
            workers: convert_all(workers, worker_from_row)?,
            anomalies: convert_all(anomalies, anomaly_from_row)?,
        }))
    }

    /// Returns the newest `limit` daily earnings rows of a pool, newest
    /// day first.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn read_daily_earnings(
        &self,
        pool_id: &PoolId,
        limit: u32,
    ) -> Result<Vec<DailyEarningsRecord>, ObserverError> {
        let rows = sqlx::query_as::<_, EarningRow>(&format!(
            "SELECT {EARNING_COLUMNS} FROM daily_earnings WHERE pool_id = ? \
             ORDER BY date DESC LIMIT ?"
        ))
        .bind(pool_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows, earning_from_row)
    }

    /// Returns anomaly events, newest first, optionally filtered by pool,
    /// age and resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn read_anomalies(
        &self,
        pool_id: Option<&PoolId>,
        since: Option<DateTime<Utc>>,
        unresolved_only: bool,
    ) -> Result<Vec<AnomalyEvent>, ObserverError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {ANOMALY_COLUMNS} FROM anomaly_log WHERE 1 = 1"));
        if let Some(pool_id) = pool_id {
            query.push(" AND pool_id = ").push_bind(pool_id.as_str().to_string());
        }
        if let Some(since) = since {
            query.push(" AND timestamp >= ").push_bind(encode_ts(&since));
        }
        if unresolved_only {
            query.push(" AND resolved = 0");
        }
        query.push(" ORDER BY id DESC");

        let rows = query
            .build_query_as::<AnomalyRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows, anomaly_from_row)
    }

    /// Returns the summaries of a pool committed at or after `since`,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn read_summaries_since(
        &self,
        pool_id: &PoolId,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredSummary>, ObserverError> {
        let rows = sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM pool_summary WHERE pool_id = ? AND timestamp >= ? \
             ORDER BY id"
        ))
        .bind(pool_id.as_str())
        .bind(encode_ts(&since))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows, summary_from_row)
    }

    /// Marks an anomaly event resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::AnomalyNotFound`] for an unknown id or
    /// [`ObserverError::PersistenceError`] on database failure.
    pub async fn resolve_anomaly(&self, id: i64) -> Result<AnomalyEvent, ObserverError> {
        let row = sqlx::query_as::<_, AnomalyRow>(&format!(
            "UPDATE anomaly_log SET resolved = 1 WHERE id = ? RETURNING {ANOMALY_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ObserverError::AnomalyNotFound(id))?;
        anomaly_from_row(row)
    }

    /// Returns row counts and covered time spans.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn stats(&self) -> Result<StoreStats, ObserverError> {
        let (pools, active_pools) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(active), 0) FROM pool_metadata",
        )
        .fetch_one(&self.pool)
        .await?;
        let unresolved_anomalies =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM anomaly_log WHERE resolved = 0")
                .fetch_one(&self.pool)
                .await?;

        let mut tables = Vec::with_capacity(4);
        for (table, column) in [
            ("pool_summary", "timestamp"),
            ("worker_status", "timestamp"),
            ("daily_earnings", "recorded_at"),
            ("anomaly_log", "timestamp"),
        ] {
            let (rows, first, last) = sqlx::query_as::<_, (i64, Option<String>, Option<String>)>(
                &format!("SELECT COUNT(*), MIN({column}), MAX({column}) FROM {table}"),
            )
            .fetch_one(&self.pool)
            .await?;
            tables.push(TableStats {
                table,
                rows,
                first: first.as_deref().map(decode_ts).transpose()?,
                last: last.as_deref().map(decode_ts).transpose()?,
            });
        }

        Ok(StoreStats {
            pools,
            active_pools,
            unresolved_anomalies,
            tables,
        })
    }

    // ---- retention ----

    /// Deletes summaries (and, through the cascade, their worker rows)
    /// older than `days`. The newest summary of every pool is kept so that
    /// detection always has a baseline. Anomalies and identities are never
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn delete_summaries_before(&self, days: u64) -> Result<u64, ObserverError> {
        let result = sqlx::query(
            "DELETE FROM pool_summary WHERE timestamp < ? \
             AND id NOT IN (SELECT MAX(id) FROM pool_summary GROUP BY pool_id)",
        )
        .bind(cutoff(days))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Deletes worker rows older than `days`, keeping the rows of every
    /// pool's newest cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::PersistenceError`] on database failure.
    pub async fn delete_worker_status_before(&self, days: u64) -> Result<u64, ObserverError> {
        let result = sqlx::query(
            "DELETE FROM worker_status WHERE timestamp < ? AND cycle_id NOT IN \
             (SELECT cycle_id FROM pool_summary WHERE id IN \
              (SELECT MAX(id) FROM pool_summary GROUP BY pool_id))",
        )
        .bind(cutoff(days))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn cutoff(days: u64) -> String {
    let days = i64::try_from(days).unwrap_or(i64::MAX / 86_400_000);
    let cutoff = chrono::Duration::try_days(days)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    encode_ts(&cutoff)
}

fn encode_tags(tags: &[String]) -> Result<String, ObserverError> {
    serde_json::to_string(tags).map_err(|e| ObserverError::Internal(format!("tags: {e}")))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{AnomalyType, Severity, SummarySnapshot, WorkerStatus};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    /// Current time at the stored precision.
    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    async fn store() -> SqliteStore {
        let Ok(store) = SqliteStore::in_memory().await else {
            panic!("in-memory store");
        };
        store
    }

    fn pool_id(raw: &str) -> PoolId {
        let Ok(id) = PoolId::new(raw) else {
            panic!("valid id");
        };
        id
    }

    fn new_pool(raw: &str) -> NewPool {
        NewPool {
            pool_id: pool_id(raw),
            pool_name: format!("Pool {raw}"),
            observer_url: format!("https://observer.test/{raw}"),
            client_name: "Client".to_string(),
            country: "Kazakhstan".to_string(),
            company: "Hosting LLP".to_string(),
            location: "Ekibastuz".to_string(),
            contact_email: String::new(),
            tags: vec!["kz".to_string()],
            active: true,
        }
    }

    async fn provisioned(raw: &str) -> (SqliteStore, PoolId) {
        let store = store().await;
        let Ok(identity) = store.create_pool(&new_pool(raw)).await else {
            panic!("create pool");
        };
        (store, identity.pool_id)
    }

    fn worker(
        pool: &PoolId,
        at: DateTime<Utc>,
        name: &str,
        status: WorkerStatus,
    ) -> WorkerStatusRecord {
        WorkerStatusRecord {
            pool_id: pool.clone(),
            timestamp: at,
            worker_name: name.to_string(),
            status,
            hashrate_10m: 100.0,
            hashrate_1h: 101.0,
            hashrate_24h: 99.5,
            last_exchange_time: "1 min ago".to_string(),
        }
    }

    fn earning(pool: &PoolId, at: DateTime<Utc>, day: u32, income: Decimal) -> DailyEarningsRecord {
        let Some(date) = NaiveDate::from_ymd_opt(2026, 3, day) else {
            panic!("valid date");
        };
        DailyEarningsRecord {
            pool_id: pool.clone(),
            date,
            total_income: income,
            hashrate: 37_500.0,
            recorded_at: at,
        }
    }

    fn snapshot(pool: &PoolId, at: DateTime<Utc>, balance: Decimal) -> Snapshot {
        Snapshot {
            summary: SummarySnapshot {
                pool_id: pool.clone(),
                timestamp: at,
                current_hashrate: 38_384.0,
                avg_hashrate_24h: 37_900.0,
                online_workers: 1,
                offline_workers: 1,
                balance,
                last_income: Decimal::new(412, 5),
            },
            workers: vec![
                worker(pool, at, "rig-001", WorkerStatus::Online),
                worker(pool, at, "rig-002", WorkerStatus::Offline),
            ],
            daily_earnings: vec![earning(pool, at, 1, Decimal::new(1, 2))],
        }
    }

    fn offline_candidate() -> AnomalyCandidate {
        AnomalyCandidate {
            anomaly_type: AnomalyType::OfflineWorkers,
            severity: Severity::Medium,
            description: "1 worker(s) offline: rig-002".to_string(),
        }
    }

    #[tokio::test]
    async fn commit_then_read_latest() {
        let (store, pool) = provisioned("kz-01").await;
        let snap = snapshot(&pool, now(), Decimal::new(1_570_138, 8));

        let Ok(cycle_id) = store.commit_cycle(&pool, &snap, &[offline_candidate()]).await else {
            panic!("commit");
        };

        let Ok(Some(latest)) = store.read_latest(&pool).await else {
            panic!("latest summary");
        };
        assert_eq!(latest.cycle_id, cycle_id);
        assert_eq!(latest.summary, snap.summary);

        let Ok(workers) = store.read_latest_workers(&pool).await else {
            panic!("latest workers");
        };
        assert_eq!(workers, snap.workers);

        let Ok(Some(cycle)) = store.read_cycle(&cycle_id).await else {
            panic!("cycle readback");
        };
        assert_eq!(cycle.anomalies.len(), 1);
        assert!(cycle.anomalies.iter().all(|a| !a.resolved && a.cycle_id == cycle_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pools_commit_on_a_shared_file() {
        let name = format!("pool-observer-{}.db", uuid::Uuid::new_v4());
        let path = std::env::temp_dir().join(name);
        let url = format!("sqlite://{}", path.display());
        let Ok(store) = SqliteStore::connect(&url, 8).await else {
            panic!("file store");
        };

        let mut pools = Vec::new();
        for n in 0..8 {
            let Ok(identity) = store.create_pool(&new_pool(&format!("kz-{n:02}"))).await else {
                panic!("create pool");
            };
            pools.push(identity.pool_id);
        }

        let mut tasks = tokio::task::JoinSet::new();
        for pool in &pools {
            for _ in 0..10 {
                let store = store.clone();
                let pool = pool.clone();
                tasks.spawn(async move {
                    let snap = snapshot(&pool, now(), Decimal::ONE);
                    store.commit_cycle(&pool, &snap, &[offline_candidate()]).await
                });
            }
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => failures.push(e.to_string()),
                Err(e) => failures.push(e.to_string()),
            }
        }
        assert!(failures.is_empty(), "failed commits: {failures:?}");

        let Ok(stats) = store.stats().await else {
            panic!("stats");
        };
        assert_eq!(stats.pools, 8);
        let summaries = stats.tables.iter().find(|t| t.table == "pool_summary");
        assert_eq!(summaries.map(|t| t.rows), Some(80));

        drop(store);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn failure_after_summary_insert_rolls_back_everything() {
        let (store, pool) = provisioned("kz-01").await;
        let at = now();
        let mut snap = snapshot(&pool, at, Decimal::ONE);
        // bypasses the normalizer; the second insert hits the unique index
        snap.workers
            .push(worker(&pool, at, "rig-001", WorkerStatus::Offline));

        let result = store.commit_cycle(&pool, &snap, &[offline_candidate()]).await;
        assert!(matches!(result, Err(ObserverError::PersistenceError(_))));

        assert!(matches!(store.read_latest(&pool).await, Ok(None)));
        assert!(matches!(store.read_latest_workers(&pool).await, Ok(w) if w.is_empty()));
        assert!(matches!(store.read_daily_earnings(&pool, 30).await, Ok(e) if e.is_empty()));
        assert!(matches!(
            store.read_anomalies(Some(&pool), None, false).await,
            Ok(a) if a.is_empty()
        ));
    }

    #[tokio::test]
    async fn unknown_pool_writes_nothing() {
        let store = store().await;
        let ghost = pool_id("ghost");
        let snap = snapshot(&ghost, now(), Decimal::ONE);

        let result = store.commit_cycle(&ghost, &snap, &[offline_candidate()]).await;
        assert!(matches!(result, Err(ObserverError::UnknownPool(ref id)) if id == "ghost"));

        let Ok(stats) = store.stats().await else {
            panic!("stats");
        };
        assert!(stats.tables.iter().all(|t| t.rows == 0));
    }

    #[tokio::test]
    async fn daily_earnings_upsert_keeps_one_row() {
        let (store, pool) = provisioned("kz-01").await;
        let first = now();
        let second = first + chrono::Duration::minutes(10);

        let mut snap = snapshot(&pool, first, Decimal::ONE);
        snap.daily_earnings = vec![earning(&pool, first, 1, Decimal::new(1, 2))];
        assert!(store.commit_cycle(&pool, &snap, &[]).await.is_ok());

        let mut snap = snapshot(&pool, second, Decimal::ONE);
        snap.daily_earnings = vec![earning(&pool, second, 1, Decimal::new(15, 3))];
        assert!(store.commit_cycle(&pool, &snap, &[]).await.is_ok());

        let Ok(rows) = store.read_daily_earnings(&pool, 30).await else {
            panic!("earnings");
        };
        assert_eq!(rows.len(), 1);
        let Some(row) = rows.first() else {
            panic!("one row");
        };
        assert_eq!(row.total_income, Decimal::new(15, 3));
        assert_eq!(row.recorded_at, second);
    }

    #[tokio::test]
    async fn baseline_tracks_payouts() {
        let (store, pool) = provisioned("kz-01").await;
        assert!(matches!(store.read_baseline(&pool).await, Ok(None)));

        let t0 = now() - chrono::Duration::hours(3);
        let t1 = t0 + chrono::Duration::hours(1);
        let t2 = t1 + chrono::Duration::hours(1);
        for (at, balance) in [(t0, 50), (t1, 10), (t2, 20)] {
            let snap = snapshot(&pool, at, Decimal::new(balance, 3));
            assert!(store.commit_cycle(&pool, &snap, &[]).await.is_ok());
        }

        let Ok(Some(baseline)) = store.read_baseline(&pool).await else {
            panic!("baseline");
        };
        assert_eq!(baseline.summary.timestamp, t2);
        assert_eq!(baseline.first_seen_at, t0);
        assert_eq!(baseline.last_payout_at, Some(t1));
    }

    #[tokio::test]
    async fn duplicate_pool_is_rejected() {
        let (store, _) = provisioned("kz-01").await;
        let result = store.create_pool(&new_pool("kz-01")).await;
        assert!(matches!(result, Err(ObserverError::PoolExists(_))));
    }

    #[tokio::test]
    async fn pool_updates_and_active_filter() {
        let (store, pool) = provisioned("kz-01").await;
        assert!(store.create_pool(&new_pool("kz-02")).await.is_ok());

        let update = PoolUpdate {
            location: Some("Pavlodar".to_string()),
            tags: Some(vec!["kz".to_string(), "hydro".to_string()]),
            ..PoolUpdate::default()
        };
        let Ok(updated) = store.update_pool(&pool, &update).await else {
            panic!("update");
        };
        assert_eq!(updated.location, "Pavlodar");
        assert!(updated.updated_at >= updated.created_at);

        assert!(store.set_pool_active(&pool, false).await.is_ok());
        let Ok(active) = store.list_pools(true).await else {
            panic!("list active");
        };
        let ids: Vec<&str> = active.iter().map(|p| p.pool_id.as_str()).collect();
        assert_eq!(ids, vec!["kz-02"]);

        let Ok(reloaded) = store.get_pool(&pool).await else {
            panic!("get");
        };
        assert!(!reloaded.active);
        assert_eq!(reloaded.tags, vec!["kz".to_string(), "hydro".to_string()]);

        let missing = store.set_pool_active(&pool_id("nope"), true).await;
        assert!(matches!(missing, Err(ObserverError::UnknownPool(_))));
    }

    #[tokio::test]
    async fn resolve_and_filter_anomalies() {
        let (store, pool) = provisioned("kz-01").await;
        let snap = snapshot(&pool, now(), Decimal::ONE);
        assert!(store.commit_cycle(&pool, &snap, &[offline_candidate()]).await.is_ok());

        let Ok(open) = store.read_anomalies(Some(&pool), None, true).await else {
            panic!("anomalies");
        };
        let Some(event) = open.first() else {
            panic!("one open anomaly");
        };
        let Ok(resolved) = store.resolve_anomaly(event.id).await else {
            panic!("resolve");
        };
        assert!(resolved.resolved);

        assert!(matches!(
            store.read_anomalies(Some(&pool), None, true).await,
            Ok(a) if a.is_empty()
        ));
        let since = now() + chrono::Duration::hours(1);
        assert!(matches!(
            store.read_anomalies(None, Some(since), false).await,
            Ok(a) if a.is_empty()
        ));
        assert!(matches!(
            store.resolve_anomaly(9_999).await,
            Err(ObserverError::AnomalyNotFound(9_999))
        ));
    }

    #[tokio::test]
    async fn retention_keeps_latest_cycle_and_anomalies() {
        let (store, pool) = provisioned("kz-01").await;
        let old = now() - chrono::Duration::days(40);
        let older = old - chrono::Duration::days(1);
        for at in [older, old] {
            let snap = snapshot(&pool, at, Decimal::ONE);
            assert!(store.commit_cycle(&pool, &snap, &[offline_candidate()]).await.is_ok());
        }

        assert!(matches!(store.delete_worker_status_before(30).await, Ok(2)));
        assert!(matches!(store.delete_summaries_before(30).await, Ok(1)));

        let Ok(Some(latest)) = store.read_latest(&pool).await else {
            panic!("latest survives");
        };
        assert_eq!(latest.summary.timestamp, old);
        assert!(matches!(store.read_latest_workers(&pool).await, Ok(w) if w.len() == 2));
        assert!(matches!(
            store.read_anomalies(Some(&pool), None, false).await,
            Ok(a) if a.len() == 2
        ));
        assert!(store.get_pool(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn summaries_since_are_oldest_first() {
        let (store, pool) = provisioned("kz-01").await;
        let t0 = now() - chrono::Duration::hours(2);
        let t1 = t0 + chrono::Duration::hours(1);
        for at in [t0, t1] {
            let snap = snapshot(&pool, at, Decimal::ONE);
            assert!(store.commit_cycle(&pool, &snap, &[]).await.is_ok());
        }
        let since = t0 + chrono::Duration::minutes(1);
        let Ok(rows) = store.read_summaries_since(&pool, since).await else {
            panic!("summaries");
        };
        assert_eq!(rows.len(), 1);
        assert!(store.ping().await.is_ok());
    }
}
