//! Per-pool commit serialization.
//!
//! [`PoolLocks`] hands out one [`tokio::sync::Mutex`] per pool. The cycle
//! runner holds it across baseline read, detection and commit so that two
//! cycles of the same pool never interleave, while cycles of different pools
//! proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::PoolId;

/// Lazily populated map of per-pool mutexes.
///
/// # Concurrency
///
/// - Commits of different pools are concurrent.
/// - Commits of the same pool are serialized.
/// - The outer map is only write-locked the first time a pool is seen.
#[derive(Debug, Default)]
pub struct PoolLocks {
    locks: RwLock<HashMap<PoolId, Arc<Mutex<()>>>>,
}

impl PoolLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns the commit guard of `pool_id`.
    pub async fn acquire(&self, pool_id: &PoolId) -> OwnedMutexGuard<()> {
        self.lock_for(pool_id).await.lock_owned().await
    }

    async fn lock_for(&self, pool_id: &PoolId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(pool_id) {
            return Arc::clone(lock);
        }
        let mut map = self.locks.write().await;
        Arc::clone(map.entry(pool_id.clone()).or_default())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    impl PoolLocks {
        async fn try_acquire(&self, pool_id: &PoolId) -> Option<OwnedMutexGuard<()>> {
            self.lock_for(pool_id).await.try_lock_owned().ok()
        }

        async fn len(&self) -> usize {
            self.locks.read().await.len()
        }
    }

    fn pool(raw: &str) -> PoolId {
        let Ok(id) = PoolId::new(raw) else {
            panic!("valid id");
        };
        id
    }

    #[tokio::test]
    async fn same_pool_is_serialized() {
        let locks = PoolLocks::new();
        let a = pool("kz-01");

        let guard = locks.acquire(&a).await;
        assert!(locks.try_acquire(&a).await.is_none());
        drop(guard);
        assert!(locks.try_acquire(&a).await.is_some());
    }

    #[tokio::test]
    async fn different_pools_are_independent() {
        let locks = PoolLocks::new();
        assert_eq!(locks.len().await, 0);

        let _a = locks.acquire(&pool("kz-01")).await;
        let b = locks.try_acquire(&pool("kz-02")).await;
        assert!(b.is_some());
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let locks = Arc::new(PoolLocks::new());
        let a = pool("kz-01");
        let guard = locks.acquire(&a).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            let a = a.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&a).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert!(waiter.await.is_ok());
    }
}
