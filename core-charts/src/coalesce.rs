//! Joins identical in-flight requests.
//!
//! The first caller for a key starts the work; later callers for the same key
//! await the same shared future. Each caller races its own cancellation token
//! against the shared outcome. When the last caller walks away before the work
//! finishes, the work's own token is cancelled and its future dropped.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Slot<V> {
    id: u64,
    future: Shared<BoxFuture<'static, V>>,
    cancel: CancellationToken,
    waiters: usize,
}

type Slots<K, V> = Arc<Mutex<HashMap<K, Slot<V>>>>;

fn lock<K, V>(slots: &Slots<K, V>) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cloning yields a handle to the same set of in-flight requests.
pub struct Coalescer<K, V> {
    slots: Slots<K, V>,
    next_id: Arc<AtomicU64>,
}

impl<K, V> Default for Coalescer<K, V> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K, V> Clone for Coalescer<K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Awaits the outcome for `key`, starting it with `make` if nothing is in
    /// flight. `make` receives the token that is cancelled once nobody is
    /// waiting any more.
    ///
    /// Returns `None` when `caller` is cancelled first.
    pub async fn run<F, Fut>(&self, key: K, caller: &CancellationToken, make: F) -> Option<V>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (future, id) = {
            let mut slots = lock(&self.slots);
            match slots.get_mut(&key) {
                Some(slot) => {
                    slot.waiters += 1;
                    debug!(waiters = slot.waiters, "Joining in-flight request");
                    (slot.future.clone(), slot.id)
                }
                None => {
                    let cancel = CancellationToken::new();
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let future = make(cancel.clone()).boxed().shared();
                    slots.insert(
                        key.clone(),
                        Slot {
                            id,
                            future: future.clone(),
                            cancel,
                            waiters: 1,
                        },
                    );
                    (future, id)
                }
            }
        };

        let mut guard = WaiterGuard {
            slots: Arc::clone(&self.slots),
            key,
            id,
            completed: false,
        };

        let outcome = tokio::select! {
            biased;
            _ = caller.cancelled() => None,
            value = future => Some(value),
        };
        guard.completed = outcome.is_some();
        outcome
    }

    /// Number of keys with work in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.slots).len()
    }
}

struct WaiterGuard<K: Eq + Hash, V> {
    slots: Slots<K, V>,
    key: K,
    id: u64,
    completed: bool,
}

impl<K: Eq + Hash, V> Drop for WaiterGuard<K, V> {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        let Some(slot) = slots.get_mut(&self.key) else {
            return;
        };
        // A newer request may own the key by now.
        if slot.id != self.id {
            return;
        }

        if self.completed {
            slots.remove(&self.key);
            return;
        }

        slot.waiters = slot.waiters.saturating_sub(1);
        if slot.waiters == 0 {
            debug!("Last waiter left, cancelling in-flight request");
            slot.cancel.cancel();
            slots.remove(&self.key);
        }
    }
}
