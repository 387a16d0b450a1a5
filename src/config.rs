//! Observer configuration loaded from environment variables and a pools file.
//!
//! Follows 12-factor style: process settings come from environment variables
//! (or a `.env` file via `dotenvy`). The monitored pools come from a JSON file
//! (`POOLS_CONFIG`, default `pools_config.json`):
//!
//! ```json
//! {
//!   "pools": [
//!     {
//!       "pool_id": "kz-01",
//!       "pool_name": "KZ Pool 01",
//!       "observer_url": "https://pool.example/observer?access_key=...",
//!       "client_name": "Acme",
//!       "country": "Kazakhstan",
//!       "scrape_interval_secs": 300,
//!       "thresholds": { "hashrate_drop": { "high": 0.4, "medium": 0.25 } }
//!     }
//!   ]
//! }
//! ```
//!
//! Without a pools file a single pool is described by `POOL_ID`,
//! `POOL_NAME`, `OBSERVER_URL`, `CLIENT_NAME`, `COUNTRY`, `COMPANY` and
//! `LOCATION`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{NewPool, PoolId};
use crate::error::ObserverError;
use crate::pipeline::detector::AnomalyThresholds;

/// Top-level observer configuration.
///
/// Loaded once at startup via [`ObserverConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Socket address of the viewer API (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Whether the viewer API is served.
    pub api_enabled: bool,

    /// SQLite connection string.
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Path of the pools JSON file.
    pub pools_config_path: PathBuf,

    /// Default seconds between two cycles of one pool.
    pub scrape_interval_secs: u64,

    /// Seconds a page fetch may take before the cycle is abandoned.
    pub fetch_timeout_secs: u64,

    /// Seconds to wait before the single fetch retry.
    pub fetch_retry_delay_secs: u64,

    /// Remote sync settings; `None` disables sync.
    pub sync: Option<SyncConfig>,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Delete summary and worker rows older than this many days (0 = never).
    pub retention_days: u64,

    /// Log filter directive (`RUST_LOG` syntax).
    pub log_level: String,

    /// Emit JSON log lines instead of the compact format.
    pub log_json: bool,
}

/// Remote data store settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the PostgREST-compatible endpoint (Supabase project URL).
    pub base_url: String,
    /// Service key sent as `apikey` and bearer token.
    pub api_key: String,
    /// Attempts per push before giving up.
    pub max_attempts: usize,
    /// Delay before the first retry; doubles on every further attempt.
    pub initial_backoff_ms: u64,
    /// Number of most recent daily earnings rows pushed per cycle.
    pub earnings_window: u32,
}

impl ObserverConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file and
    /// falls back to defaults when a variable is not set.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Config`] if `LISTEN_ADDR` cannot be parsed or
    /// sync is enabled without `SUPABASE_URL` / `SUPABASE_SERVICE_KEY`.
    pub fn from_env() -> Result<Self, ObserverError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`ObserverConfig::from_env`].
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ObserverError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let listen_addr: SocketAddr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e| ObserverError::Config(format!("LISTEN_ADDR: {e}")))?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://pool_observer.db".to_string());

        let sync = if parse_bool(&lookup, "SYNC_ENABLED", false) {
            let base_url = lookup("SUPABASE_URL").ok_or_else(|| {
                ObserverError::Config("SYNC_ENABLED requires SUPABASE_URL".to_string())
            })?;
            let api_key = lookup("SUPABASE_SERVICE_KEY").ok_or_else(|| {
                ObserverError::Config("SYNC_ENABLED requires SUPABASE_SERVICE_KEY".to_string())
            })?;
            Some(SyncConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                max_attempts: parse_or(&lookup, "SYNC_MAX_ATTEMPTS", 5_usize).max(1),
                initial_backoff_ms: parse_or(&lookup, "SYNC_INITIAL_BACKOFF_MS", 500),
                earnings_window: parse_or(&lookup, "SYNC_EARNINGS_WINDOW", 30),
            })
        } else {
            None
        };

        let log_format = lookup("LOG_FORMAT").unwrap_or_default();

        Ok(Self {
            listen_addr,
            api_enabled: parse_bool(&lookup, "API_ENABLED", true),
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5),
            pools_config_path: PathBuf::from(
                lookup("POOLS_CONFIG").unwrap_or_else(|| "pools_config.json".to_string()),
            ),
            scrape_interval_secs: parse_or(&lookup, "SCRAPE_INTERVAL_SECS", 600_u64).max(1),
            fetch_timeout_secs: parse_or(&lookup, "FETCH_TIMEOUT_SECS", 20_u64).max(1),
            fetch_retry_delay_secs: parse_or(&lookup, "FETCH_RETRY_DELAY_SECS", 5),
            sync,
            event_bus_capacity: parse_or(&lookup, "EVENT_BUS_CAPACITY", 1_024),
            retention_days: parse_or(&lookup, "RETENTION_DAYS", 0),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_json: log_format.eq_ignore_ascii_case("json"),
        })
    }

    /// Fetch timeout as a [`Duration`].
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Fetch retry delay as a [`Duration`].
    #[must_use]
    pub const fn fetch_retry_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_retry_delay_secs)
    }

    /// Default scrape interval as a [`Duration`].
    #[must_use]
    pub const fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    /// Loads the monitored pools.
    ///
    /// Reads the pools file when it exists, otherwise builds a single pool
    /// from `POOL_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Config`] for unreadable or invalid pool
    /// definitions, duplicate pool ids, or when neither source is present.
    pub fn load_pools(&self) -> Result<Vec<PoolConfig>, ObserverError> {
        if self.pools_config_path.exists() {
            load_pools_file(&self.pools_config_path)
        } else {
            tracing::info!(
                path = %self.pools_config_path.display(),
                "pools file not found, using environment variables"
            );
            pool_from_lookup(|key| std::env::var(key).ok()).map(|pool| vec![pool])
        }
    }
}

/// Per-pool configuration: identity, schedule and anomaly thresholds.
///
/// Immutable for the duration of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Identity used to provision the pool when it is not in the store yet.
    #[serde(flatten)]
    pub identity: NewPool,
    /// Per-pool override of the scrape interval.
    #[serde(default)]
    pub scrape_interval_secs: Option<u64>,
    /// Anomaly thresholds for this pool.
    #[serde(default)]
    pub thresholds: AnomalyThresholds,
}

impl PoolConfig {
    /// Returns the pool identifier.
    #[must_use]
    pub fn pool_id(&self) -> &PoolId {
        &self.identity.pool_id
    }

    /// Scrape interval for this pool, falling back to `default`.
    #[must_use]
    pub fn interval(&self, default: Duration) -> Duration {
        self.scrape_interval_secs
            .filter(|secs| *secs > 0)
            .map_or(default, Duration::from_secs)
    }
}

#[derive(Debug, Deserialize)]
struct PoolsFile {
    #[serde(default)]
    pools: Vec<PoolConfig>,
}

/// Parses and validates a pools JSON document.
///
/// # Errors
///
/// Returns [`ObserverError::Config`] for invalid JSON, invalid pool
/// identities, invalid thresholds or duplicate pool ids.
pub fn parse_pools(json: &str) -> Result<Vec<PoolConfig>, ObserverError> {
    let file: PoolsFile = serde_json::from_str(json)
        .map_err(|e| ObserverError::Config(format!("invalid pools file: {e}")))?;

    let mut seen = HashSet::new();
    for pool in &file.pools {
        pool.identity
            .validate()
            .map_err(|e| ObserverError::Config(e.to_string()))?;
        pool.thresholds
            .validate()
            .map_err(|e| ObserverError::Config(format!("pool {}: {e}", pool.pool_id())))?;
        if !seen.insert(pool.pool_id().clone()) {
            return Err(ObserverError::Config(format!(
                "pool {} is defined twice",
                pool.pool_id()
            )));
        }
    }
    Ok(file.pools)
}

fn load_pools_file(path: &Path) -> Result<Vec<PoolConfig>, ObserverError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| ObserverError::Config(format!("{}: {e}", path.display())))?;
    let pools = parse_pools(&json)?;
    tracing::info!(path = %path.display(), pools = pools.len(), "pools file loaded");
    Ok(pools)
}

/// Builds a single pool from `POOL_*` variables.
///
/// # Errors
///
/// Returns [`ObserverError::Config`] when `POOL_ID` or `OBSERVER_URL` is
/// missing or invalid.
pub fn pool_from_lookup<L>(lookup: L) -> Result<PoolConfig, ObserverError>
where
    L: Fn(&str) -> Option<String>,
{
    let observer_url = lookup("OBSERVER_URL").ok_or_else(|| {
        ObserverError::Config("no pools file and OBSERVER_URL is not set".to_string())
    })?;
    let pool_id = PoolId::new(lookup("POOL_ID").unwrap_or_else(|| "default".to_string()))
        .map_err(|e| ObserverError::Config(e.to_string()))?;

    let identity = NewPool {
        pool_id,
        pool_name: lookup("POOL_NAME").unwrap_or_else(|| "Default Pool".to_string()),
        observer_url,
        client_name: lookup("CLIENT_NAME").unwrap_or_default(),
        country: lookup("COUNTRY").unwrap_or_default(),
        company: lookup("COMPANY").unwrap_or_default(),
        location: lookup("LOCATION").unwrap_or_default(),
        contact_email: lookup("CONTACT_EMAIL").unwrap_or_default(),
        tags: Vec::new(),
        active: true,
    };
    identity
        .validate()
        .map_err(|e| ObserverError::Config(e.to_string()))?;

    Ok(PoolConfig {
        identity,
        scrape_interval_secs: None,
        thresholds: AnomalyThresholds::default(),
    })
}

/// Parses a variable as `T`, returning `default` on missing or invalid values.
fn parse_or<L, T>(lookup: &L, key: &str, default: T) -> T
where
    L: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool<L>(lookup: &L, key: &str, default: bool) -> bool
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
