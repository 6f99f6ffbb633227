// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeSet;
use std::time::Duration;

/// Lead time before expiry at which a credential is treated as stale.
pub const SAFETY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Platform account (hub) identifier.
pub type AccountId = u64;

/// Private app identifier.
pub type AppId = u64;

/// A short-lived bearer credential together with its expiry and scopes.
///
/// Entries are always replaced wholesale; nothing mutates a cached value in
/// place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub access_token: String,
    /// Absolute expiry in Unix milliseconds.
    pub expires_at_ms: u64,
    /// Scope groups the credential was issued with. Empty means untracked.
    pub granted_scopes: BTreeSet<String>,
    /// Only present for OAuth2 credentials.
    pub refresh_token: Option<String>,
}

impl CachedCredential {
    pub fn new(access_token: impl Into<String>, expires_at_ms: u64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at_ms,
            granted_scopes: BTreeSet::new(),
            refresh_token: None,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    /// True when the credential outlives `now + window` and grants every
    /// required scope group. An empty `required` set skips the scope check.
    pub fn is_fresh(&self, required: &BTreeSet<String>, now_ms: u64, window: Duration) -> bool {
        let deadline = now_ms.saturating_add(window.as_millis() as u64);
        deadline < self.expires_at_ms && self.covers(required)
    }

    pub fn covers(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.granted_scopes)
    }

    /// Scope groups in `required` that this credential lacks.
    pub fn missing_scopes(&self, required: &BTreeSet<String>) -> Vec<String> {
        required.difference(&self.granted_scopes).cloned().collect()
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
