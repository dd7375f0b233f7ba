//! Keyed per-service mutual exclusion.
//!
//! One async mutex per service id, lazily created, so concurrent writes to
//! the same service serialize without a global lock across unrelated
//! services. Idle entries are reclaimed opportunistically on acquire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map from service id to a per-service async lock.
///
/// The outer map lock is a synchronous mutex: every acquisition is a brief
/// HashMap operation that never spans an `.await` point, so a synchronous
/// lock is safe and cheaper than an async one.
#[derive(Clone, Default)]
pub struct ServiceLocks {
    inner: Arc<StdMutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl ServiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for one service, creating it on first use.
    ///
    /// Entries with no other holder are dropped while the map is open, so
    /// the map does not grow with historical service ids.
    pub async fn acquire(&self, service_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("service lock map poisoned");
            map.retain(|id, l| *id == service_id || Arc::strong_count(l) > 1);
            Arc::clone(map.entry(service_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of live lock entries (test observability).
    pub fn entry_count(&self) -> usize {
        self.inner.lock().expect("service lock map poisoned").len()
    }
}
