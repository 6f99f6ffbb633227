// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collapses concurrent refreshes of the same credential into one exchange.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::AuthError;

type SharedRefresh<T> = Shared<BoxFuture<'static, Result<T, AuthError>>>;

struct InFlight<T> {
    id: u64,
    refresh: SharedRefresh<T>,
}

type Registry<K, T> = Arc<Mutex<HashMap<K, InFlight<T>>>>;

/// Registry of in-flight refreshes keyed by a stable cache key.
///
/// The first caller for a key spawns the refresh as its own task; later
/// callers await the same shared result. The task deregisters itself when it
/// finishes, successfully or not, so failures are never replayed.
pub struct RefreshDeduper<K, T> {
    in_flight: Registry<K, T>,
    next_id: AtomicU64,
}

impl<K, T> Default for RefreshDeduper<K, T> {
    fn default() -> Self {
        Self { in_flight: Arc::new(Mutex::new(HashMap::new())), next_id: AtomicU64::new(0) }
    }
}

impl<K, T> RefreshDeduper<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the in-flight refresh for `key`, starting one with `start` if
    /// none is registered.
    ///
    /// `start` runs under the registry lock and must only build the future.
    /// The spawned refresh runs to completion even if every caller goes away.
    pub async fn get_or_start<F, Fut>(&self, key: K, start: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AuthError>> + Send + 'static,
    {
        let refresh = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(key = ?key, "joining in-flight refresh");
                    existing.refresh.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let refresh = self.spawn(key.clone(), id, start());
                    in_flight.insert(key, InFlight { id, refresh: refresh.clone() });
                    refresh
                }
            }
        };
        refresh.await
    }

    fn spawn<Fut>(&self, key: K, id: u64, fut: Fut) -> SharedRefresh<T>
    where
        Fut: Future<Output = Result<T, AuthError>> + Send + 'static,
    {
        let registry = Arc::clone(&self.in_flight);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = fut.await;
            deregister(&registry, &task_key, id);
            result
        });

        let registry = Arc::clone(&self.in_flight);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    // The task never reached its own deregistration.
                    deregister(&registry, &key, id);
                    Err(AuthError::TaskFailed(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Number of refreshes currently registered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.lock().contains_key(key)
    }
}

fn deregister<K: Eq + Hash, T>(registry: &Registry<K, T>, key: &K, id: u64) {
    let mut in_flight = registry.lock();
    if in_flight.get(key).is_some_and(|entry| entry.id == id) {
        in_flight.remove(key);
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
