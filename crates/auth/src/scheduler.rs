// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive refresh timers, one per identity.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::timer::{Timer, TimerHandle};

struct Armed {
    id: u64,
    handle: TimerHandle,
}

type ArmedMap<K> = Arc<Mutex<HashMap<K, Armed>>>;

/// Arms a refresh `window` before each credential expires.
///
/// Arming an identity cancels its previous timer, so at most one timer per
/// identity is ever outstanding.
pub struct RefreshScheduler<K> {
    timer: Arc<dyn Timer>,
    clock: Arc<dyn Clock>,
    window: Duration,
    armed: ArmedMap<K>,
    next_id: AtomicU64,
}

impl<K> RefreshScheduler<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(timer: Arc<dyn Timer>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            timer,
            clock,
            window,
            armed: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Time left until `expires_at_ms - window`, or zero if already past.
    pub fn delay_until_refresh(&self, expires_at_ms: u64) -> Duration {
        let refresh_at = expires_at_ms.saturating_sub(self.window.as_millis() as u64);
        Duration::from_millis(refresh_at.saturating_sub(self.clock.now_ms()))
    }

    /// Schedule `refresh` to run once, `window` before `expires_at_ms`.
    pub fn arm<F, Fut>(&self, key: K, expires_at_ms: u64, refresh: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay_until_refresh(expires_at_ms);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.armed);
        let fire_key = key.clone();
        let task = async move {
            {
                let mut armed = registry.lock();
                if armed.get(&fire_key).is_some_and(|a| a.id == id) {
                    armed.remove(&fire_key);
                }
            }
            debug!(key = ?fire_key, "scheduled refresh firing");
            refresh().await;
        }
        .boxed();

        // Held across scheduling so a zero-delay fire cannot deregister
        // before the entry is inserted.
        let mut armed = self.armed.lock();
        if let Some(previous) = armed.remove(&key) {
            previous.handle.cancel();
        }
        debug!(key = ?key, delay_secs = delay.as_secs(), "arming refresh timer");
        let handle = self.timer.schedule(delay, task);
        armed.insert(key, Armed { id, handle });
    }

    /// Cancel the timer for `key`. Returns whether one was armed.
    pub fn cancel(&self, key: &K) -> bool {
        match self.armed.lock().remove(key) {
            Some(armed) => {
                armed.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every outstanding timer, returning how many were armed.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Armed> = self.armed.lock().drain().map(|(_, armed)| armed).collect();
        for armed in &drained {
            armed.handle.cancel();
        }
        drained.len()
    }

    /// Number of timers armed and not yet fired or cancelled.
    pub fn armed(&self) -> usize {
        self.armed.lock().len()
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.armed.lock().contains_key(key)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
