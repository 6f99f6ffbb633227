// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory credential cache keyed by identity.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;

use crate::credential::CachedCredential;

/// Map from identity to its current credential.
///
/// Every access takes the lock for the duration of a single map operation,
/// so readers only ever see complete entries.
pub struct CredentialCache<K> {
    entries: Mutex<HashMap<K, CachedCredential>>,
}

impl<K> Default for CredentialCache<K> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone> CredentialCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<CachedCredential> {
        self.entries.lock().get(key).cloned()
    }

    /// Return the cached entry, or insert the one produced by `seed` when
    /// the identity has never been cached.
    pub fn get_or_seed<F>(&self, key: &K, seed: F) -> Option<CachedCredential>
    where
        F: FnOnce() -> Option<CachedCredential>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            return Some(existing.clone());
        }
        let seeded = seed()?;
        entries.insert(key.clone(), seeded.clone());
        Some(seeded)
    }

    /// Return the cached entry only if it is fresh for `required`.
    pub fn get_fresh(
        &self,
        key: &K,
        required: &BTreeSet<String>,
        now_ms: u64,
        window: Duration,
    ) -> Option<CachedCredential> {
        self.get(key).filter(|c| c.is_fresh(required, now_ms, window))
    }

    pub fn put(&self, key: K, credential: CachedCredential) {
        self.entries.lock().insert(key, credential);
    }

    pub fn remove(&self, key: &K) -> Option<CachedCredential> {
        self.entries.lock().remove(key)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
