//! Service layer: scheduling, commit serialization and store upkeep.
//!
//! [`Scheduler`] runs one periodic scrape loop per pool; [`PoolLocks`]
//! serializes the commits of a pool across loops and manual triggers.
//! [`provision_pools`] seeds identities at startup and
//! [`spawn_retention`] trims old time-series rows.

pub mod pool_locks;
pub mod provision;
pub mod retention;
pub mod scheduler;

pub use pool_locks::PoolLocks;
pub use provision::provision_pools;
pub use retention::{apply_retention, spawn_retention};
pub use scheduler::Scheduler;
