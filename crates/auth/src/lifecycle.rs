// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-provider credential state: cache, in-flight refreshes and timers.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::CredentialCache;
use crate::clock::Clock;
use crate::credential::{CachedCredential, SAFETY_WINDOW};
use crate::dedup::RefreshDeduper;
use crate::scheduler::RefreshScheduler;
use crate::timer::Timer;

/// Everything a provider owns for the identities it serves.
///
/// `K` keys the cache and timers; `D` keys in-flight refreshes and defaults
/// to `K`.
///
/// Writes go through [`commit`](Self::commit), which is tagged with the
/// epoch observed when the refresh started. [`cleanup`](Self::cleanup) bumps
/// the epoch, so refreshes still running at teardown finish without
/// repopulating the cache or arming timers.
pub struct Lifecycle<K, D = K> {
    pub cache: CredentialCache<K>,
    pub deduper: RefreshDeduper<D, CachedCredential>,
    pub scheduler: RefreshScheduler<K>,
    clock: Arc<dyn Clock>,
    window: Duration,
    gate: Mutex<u64>,
}

impl<K, D> Lifecycle<K, D>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    D: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(timer: Arc<dyn Timer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: CredentialCache::new(),
            deduper: RefreshDeduper::new(),
            scheduler: RefreshScheduler::new(timer, Arc::clone(&clock), SAFETY_WINDOW),
            clock,
            window: SAFETY_WINDOW,
            gate: Mutex::new(0),
        }
    }

    pub fn epoch(&self) -> u64 {
        *self.gate.lock()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_fresh(&self, credential: &CachedCredential, required: &BTreeSet<String>) -> bool {
        credential.is_fresh(required, self.now_ms(), self.window)
    }

    /// The cached credential for `key` if it is fresh and covers `required`.
    pub fn fresh(&self, key: &K, required: &BTreeSet<String>) -> Option<CachedCredential> {
        self.cache.get_fresh(key, required, self.now_ms(), self.window)
    }

    /// Store a refreshed credential and arm its proactive refresh.
    ///
    /// Skipped entirely when `cleanup` ran after `epoch` was read. A
    /// credential already inside the safety window is cached but gets no
    /// timer; the next on-demand call refreshes it. Returns whether the
    /// credential was stored.
    pub fn commit<F, Fut>(
        &self,
        epoch: u64,
        key: K,
        credential: CachedCredential,
        refresh: F,
    ) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let gate = self.gate.lock();
        if *gate != epoch {
            debug!(key = ?key, "discarding refresh that finished after cleanup");
            return false;
        }
        let expires_at_ms = credential.expires_at_ms;
        let arm = credential.is_fresh(&BTreeSet::new(), self.now_ms(), self.window);
        self.cache.put(key.clone(), credential);
        if arm {
            self.scheduler.arm(key, expires_at_ms, refresh);
        } else {
            debug!(key = ?key, "credential already inside safety window, not arming");
            self.scheduler.cancel(&key);
        }
        drop(gate);
        true
    }

    /// Cancel every timer and drop every cached credential. Idempotent.
    /// Returns the number of timers that were still armed.
    pub fn cleanup(&self) -> usize {
        let mut gate = self.gate.lock();
        *gate += 1;
        let cancelled = self.scheduler.cancel_all();
        self.cache.clear();
        cancelled
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
