//! Asset lock registry shared by concurrent response runs.
//!
//! Each asset has at most one holder (a response id). Steps acquire
//! every asset they touch before executing and release afterwards, so
//! two runs never issue conflicting actions against the same asset.
//! Assets are always taken in sorted order, which prevents deadlock
//! between runs contending for overlapping sets.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

/// Error returned when a lock cannot be acquired within the wait
/// ceiling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("timed out waiting for lock on asset '{asset}'")]
pub struct LockTimeout {
    /// Asset that was still held when the ceiling elapsed.
    pub asset: String,
}

/// Shared registry mapping assets to the run currently holding them.
#[derive(Default)]
pub struct AssetLockRegistry {
    holders: Mutex<HashMap<String, Uuid>>,
    released: Notify,
}

impl AssetLockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires exclusive locks on every asset for `holder`, waiting
    /// at most `ceiling` in total. Assets are taken in sorted order.
    /// On timeout, every lock taken by this call is released before
    /// the error is returned.
    pub async fn acquire(
        self: &Arc<Self>,
        holder: Uuid,
        assets: &BTreeSet<String>,
        ceiling: Duration,
    ) -> Result<(), LockTimeout> {
        let deadline = Instant::now() + ceiling;
        let mut taken: Vec<String> = Vec::with_capacity(assets.len());

        // BTreeSet iteration is the fixed global order.
        for asset in assets {
            loop {
                let notified = self.released.notified();
                tokio::pin!(notified);
                {
                    let mut holders = self.holders.lock().await;
                    if !holders.contains_key(asset) {
                        holders.insert(asset.clone(), holder);
                        taken.push(asset.clone());
                        trace!(%holder, %asset, "lock acquired");
                        break;
                    }
                    // Register for the release wakeup while still
                    // holding the map, so a release between our check
                    // and the await cannot be missed.
                    notified.as_mut().enable();
                }

                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero()
                    || tokio::time::timeout(remaining, notified).await.is_err()
                {
                    debug!(%holder, %asset, "lock wait ceiling exceeded");
                    self.release_assets(holder, &taken).await;
                    return Err(LockTimeout {
                        asset: asset.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Releases every given asset held by `holder` and wakes waiters.
    pub async fn release(&self, holder: Uuid, assets: &BTreeSet<String>) {
        let list: Vec<String> = assets.iter().cloned().collect();
        self.release_assets(holder, &list).await;
    }

    async fn release_assets(&self, holder: Uuid, assets: &[String]) {
        if assets.is_empty() {
            return;
        }
        {
            let mut holders = self.holders.lock().await;
            for asset in assets {
                if holders.get(asset) == Some(&holder) {
                    holders.remove(asset);
                    trace!(%holder, %asset, "lock released");
                }
            }
        }
        self.released.notify_waiters();
    }

    /// Releases everything held by `holder`, regardless of asset.
    pub async fn release_all(&self, holder: Uuid) {
        {
            let mut holders = self.holders.lock().await;
            holders.retain(|_, h| *h != holder);
        }
        self.released.notify_waiters();
    }

    /// Returns the run currently holding the asset, if any.
    pub async fn holder_of(&self, asset: &str) -> Option<Uuid> {
        self.holders.lock().await.get(asset).copied()
    }

    /// Number of assets currently locked.
    pub async fn held_count(&self) -> usize {
        self.holders.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let registry = Arc::new(AssetLockRegistry::new());
        let run = Uuid::new_v4();
        let set = assets(&["srv-01", "ws-02"]);

        registry
            .acquire(run, &set, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(registry.holder_of("srv-01").await, Some(run));
        assert_eq!(registry.held_count().await, 2);

        registry.release(run, &set).await;
        assert_eq!(registry.held_count().await, 0);
    }

    #[tokio::test]
    async fn test_contended_acquire_times_out() {
        let registry = Arc::new(AssetLockRegistry::new());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let set = assets(&["srv-01"]);

        registry
            .acquire(first, &set, Duration::from_secs(1))
            .await
            .unwrap();

        let err = registry
            .acquire(second, &set, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.asset, "srv-01");
        // The loser must not be left holding anything
        assert_eq!(registry.holder_of("srv-01").await, Some(first));
    }

    #[tokio::test]
    async fn test_timeout_releases_partial_acquisition() {
        let registry = Arc::new(AssetLockRegistry::new());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        // first holds only the later asset in sort order
        registry
            .acquire(first, &assets(&["b-asset"]), Duration::from_secs(1))
            .await
            .unwrap();

        let err = registry
            .acquire(second, &assets(&["a-asset", "b-asset"]), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.asset, "b-asset");
        // a-asset was taken then rolled back on timeout
        assert_eq!(registry.holder_of("a-asset").await, None);
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let registry = Arc::new(AssetLockRegistry::new());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let set = assets(&["srv-01"]);

        registry
            .acquire(first, &set, Duration::from_secs(1))
            .await
            .unwrap();

        let registry2 = Arc::clone(&registry);
        let set2 = set.clone();
        let waiter = tokio::spawn(async move {
            registry2
                .acquire(second, &set2, Duration::from_secs(5))
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.release(first, &set).await;

        waiter.await.unwrap().unwrap();
        assert_eq!(registry.holder_of("srv-01").await, Some(second));
    }

    #[tokio::test]
    async fn test_disjoint_sets_do_not_block() {
        let registry = Arc::new(AssetLockRegistry::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry
            .acquire(a, &assets(&["srv-01"]), Duration::from_millis(50))
            .await
            .unwrap();
        registry
            .acquire(b, &assets(&["srv-02"]), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(registry.held_count().await, 2);
    }

    #[tokio::test]
    async fn test_overlapping_sets_no_deadlock() {
        // Two tasks repeatedly locking overlapping sets in sorted
        // order must always make progress.
        let registry = Arc::new(AssetLockRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..2 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let holder = Uuid::new_v4();
                let set = assets(&["a", "b", "c"]);
                for _ in 0..25 {
                    registry
                        .acquire(holder, &set, Duration::from_secs(5))
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                    registry.release(holder, &set).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.held_count().await, 0);
    }

    #[tokio::test]
    async fn test_release_all() {
        let registry = Arc::new(AssetLockRegistry::new());
        let run = Uuid::new_v4();
        registry
            .acquire(run, &assets(&["x", "y", "z"]), Duration::from_secs(1))
            .await
            .unwrap();
        registry.release_all(run).await;
        assert_eq!(registry.held_count().await, 0);
    }
}
