//! Startup provisioning of configured pools.

use crate::config::PoolConfig;
use crate::error::ObserverError;
use crate::persistence::SqliteStore;

/// Creates the identity of every configured pool missing from the store.
/// Pools already provisioned are left untouched: the stored identity wins
/// over the configuration file. Returns the number of pools created.
///
/// # Errors
///
/// Returns [`ObserverError::InvalidRequest`] for an invalid configured pool
/// or [`ObserverError::PersistenceError`] on database failure.
pub async fn provision_pools(
    store: &SqliteStore,
    pools: &[PoolConfig],
) -> Result<usize, ObserverError> {
    let mut created = 0;
    for pool in pools {
        match store.create_pool(&pool.identity).await {
            Ok(identity) => {
                tracing::info!(
                    pool_id = %identity.pool_id,
                    name = %identity.pool_name,
                    "pool provisioned"
                );
                created += 1;
            }
            Err(ObserverError::PoolExists(_)) => {
                tracing::debug!(pool_id = %pool.pool_id(), "pool already provisioned");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}
