//! Per-handle leases.
//!
//! Writers against the same object must not interleave their read-modify-write
//! cycles, or they race on the ETag. A lease is held for the whole cycle and
//! released when the guard drops, on every exit path. Waiting for a lease
//! observes the caller's cancellation token like every other wait.

use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{ResourceHandle, ResourceKind, Subject};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

type Locks = Mutex<HashMap<LeaseKey, Arc<tokio::sync::Mutex<()>>>>;

/// Stable identity of a leased object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseKey {
    pub kind: ResourceKind,
    pub handle: ResourceHandle,
}

impl LeaseKey {
    pub fn new(kind: ResourceKind, handle: ResourceHandle) -> Self {
        Self { kind, handle }
    }

    fn subject(&self) -> Subject {
        Subject::new(self.kind, self.handle.clone())
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.kind, self.handle)
    }
}

/// Map of lease keys to async mutexes. An entry lives only while someone holds
/// or waits for its lease.
#[derive(Debug, Default)]
pub struct LeaseMap {
    locks: Arc<Locks>,
}

fn lock_map(locks: &Locks) -> MutexGuard<'_, HashMap<LeaseKey, Arc<tokio::sync::Mutex<()>>>> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drop `key`'s entry if the map holds the only reference to its mutex.
fn prune(locks: &Locks, key: &LeaseKey) {
    let mut map = lock_map(locks);
    if map.get(key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
        map.remove(key);
    }
}

impl LeaseMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide map shared by every reconciler that does not inject its own.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<LeaseMap>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Wait until no other holder has `key`, then take it.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Cancelled` if `cancel` fires first.
    pub async fn acquire(
        &self,
        key: LeaseKey,
        cancel: &CancellationToken,
    ) -> ReconcileResult<Lease> {
        let mutex = Arc::clone(lock_map(&self.locks).entry(key.clone()).or_default());
        log::debug!("Acquiring lease on {key}");

        let guard = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            guard = mutex.lock_owned() => Some(guard),
        };
        let Some(guard) = guard else {
            prune(&self.locks, &key);
            log::debug!("Gave up waiting for lease on {key}");
            return Err(ReconcileError::Cancelled {
                subject: key.subject(),
                last_status: "(waiting for lease)".to_string(),
            });
        };

        Ok(Lease {
            key,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        })
    }

    pub fn is_held(&self, key: &LeaseKey) -> bool {
        lock_map(&self.locks)
            .get(key)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one key; released on drop.
#[derive(Debug)]
pub struct Lease {
    key: LeaseKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Locks>,
}

impl Lease {
    pub fn key(&self) -> &LeaseKey {
        &self.key
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // The guard owns a reference to the mutex; release it before pruning.
        drop(self.guard.take());
        prune(&self.locks, &self.key);
        log::debug!("Released lease on {}", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(handle: &str) -> LeaseKey {
        LeaseKey::new(ResourceKind::KeyValueStore, handle.into())
    }

    #[tokio::test]
    async fn test_lease_released_on_drop() {
        let map = LeaseMap::new();
        let cancel = CancellationToken::new();
        let lease = map.acquire(key("store"), &cancel).await.unwrap();
        assert!(map.is_held(lease.key()));
        drop(lease);
        assert!(!map.is_held(&key("store")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_is_serialized() {
        let map = Arc::new(LeaseMap::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let first = map.acquire(key("store"), &cancel).await.unwrap();

        let waiter = {
            let map = Arc::clone(&map);
            let order = Arc::clone(&order);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _lease = map.acquire(key("store"), &cancel).await.unwrap();
                order.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        order.lock().unwrap().push("first");
        drop(first);
        waiter.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let map = LeaseMap::new();
        let cancel = CancellationToken::new();
        let _a = map.acquire(key("a"), &cancel).await.unwrap();
        let b = tokio::time::timeout(Duration::from_secs(1), map.acquire(key("b"), &cancel)).await;
        assert!(b.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_gives_up() {
        let map = LeaseMap::new();
        let holder = map.acquire(key("store"), &CancellationToken::new()).await.unwrap();
        let cancel = CancellationToken::new();

        let (result, ()) = tokio::join!(map.acquire(key("store"), &cancel), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            cancel.cancel();
        });

        let err = result.unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled { .. }));
        assert!(err.to_string().contains("(store)"));
        assert!(map.is_held(holder.key()));
    }

    #[tokio::test]
    async fn test_idle_keys_are_pruned() {
        let map = LeaseMap::new();
        let cancel = CancellationToken::new();
        for handle in ["a", "b", "c"] {
            let _lease = map.acquire(key(handle), &cancel).await.unwrap();
        }
        assert!(map.is_empty());

        let held = map.acquire(key("a"), &cancel).await.unwrap();
        assert_eq!(map.len(), 1);
        drop(held);
        assert!(map.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_survives_while_a_waiter_is_queued() {
        let map = Arc::new(LeaseMap::new());
        let cancel = CancellationToken::new();
        let first = map.acquire(key("store"), &cancel).await.unwrap();

        let waiter = {
            let map = Arc::clone(&map);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let lease = map.acquire(key("store"), &cancel).await.unwrap();
                tokio::time::sleep(Duration::from_secs(1)).await;
                drop(lease);
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(first);
        assert_eq!(map.len(), 1);

        waiter.await.unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&LeaseMap::global(), &LeaseMap::global()));
    }
}
