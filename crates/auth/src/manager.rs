// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry point for the rest of the CLI.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::api::{AccountIdentity, AuthApi};
use crate::clock::{Clock, SystemClock};
use crate::credential::{AccountId, AppId};
use crate::error::AuthError;
use crate::oauth::OAuth2Provider;
use crate::pak::PersonalAccessKeyProvider;
use crate::private_app::PrivateAppUserTokenProvider;
use crate::store::AccountStore;
use crate::timer::{Timer, TokioTimer};

type PrivateAppSlot = Arc<OnceCell<PrivateAppUserTokenProvider>>;

/// Owns one provider of each kind for a process (or a test).
///
/// Private app providers are created per account on first use; creation
/// runs at most once per account even under concurrent first calls.
pub struct AuthManager {
    api: Arc<dyn AuthApi>,
    timer: Arc<dyn Timer>,
    clock: Arc<dyn Clock>,
    oauth: OAuth2Provider,
    pak: PersonalAccessKeyProvider,
    private_apps: Mutex<HashMap<AccountId, PrivateAppSlot>>,
}

impl AuthManager {
    /// Manager on the tokio timer and the system clock.
    pub fn new(store: Arc<dyn AccountStore>, api: Arc<dyn AuthApi>) -> Self {
        Self::with_runtime(store, api, Arc::new(TokioTimer), Arc::new(SystemClock))
    }

    pub fn with_runtime(
        store: Arc<dyn AccountStore>,
        api: Arc<dyn AuthApi>,
        timer: Arc<dyn Timer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let oauth = OAuth2Provider::new(
            Arc::clone(&api),
            Arc::clone(&store),
            Arc::clone(&timer),
            Arc::clone(&clock),
        );
        let pak = PersonalAccessKeyProvider::new(
            Arc::clone(&api),
            store,
            Arc::clone(&timer),
            Arc::clone(&clock),
        );
        Self { api, timer, clock, oauth, pak, private_apps: Mutex::new(HashMap::new()) }
    }

    pub async fn oauth_access_token(&self, account_id: AccountId) -> Result<String, AuthError> {
        self.oauth.access_token(account_id).await
    }

    pub async fn personal_access_key_access_token(
        &self,
        account_id: AccountId,
        force_refresh: bool,
    ) -> Result<String, AuthError> {
        self.pak.access_token(account_id, force_refresh).await
    }

    /// A private app user token, or `None` when the account's key cannot
    /// issue them.
    pub async fn private_app_user_token(
        &self,
        account_id: AccountId,
        app_id: AppId,
        required_scope_groups: &BTreeSet<String>,
    ) -> Result<Option<String>, AuthError> {
        let (slot, provider) = self.private_app_provider(account_id).await?;
        let token = provider.get_token(app_id, required_scope_groups).await;
        // Cleanup ran mid-call and dropped this slot.
        if !self.is_registered(account_id, &slot) {
            let cancelled = provider.cleanup();
            debug!(account = account_id, cancelled, "discarded orphaned private app provider");
        }
        token
    }

    /// Account metadata from a fresh key exchange.
    pub async fn account_identity(
        &self,
        account_id: AccountId,
    ) -> Result<AccountIdentity, AuthError> {
        self.pak.account_identity(account_id).await
    }

    async fn private_app_provider(
        &self,
        account_id: AccountId,
    ) -> Result<(PrivateAppSlot, PrivateAppUserTokenProvider), AuthError> {
        let slot = Arc::clone(self.private_apps.lock().entry(account_id).or_default());
        let provider = slot
            .get_or_try_init(|| {
                PrivateAppUserTokenProvider::init(
                    account_id,
                    Arc::clone(&self.api),
                    self.pak.clone(),
                    Arc::clone(&self.timer),
                    Arc::clone(&self.clock),
                )
            })
            .await?
            .clone();
        Ok((slot, provider))
    }

    fn is_registered(&self, account_id: AccountId, slot: &PrivateAppSlot) -> bool {
        self.private_apps.lock().get(&account_id).is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Cancel every timer and drop every cached credential. Idempotent.
    pub fn cleanup(&self) {
        let private_apps: Vec<PrivateAppSlot> =
            self.private_apps.lock().drain().map(|(_, slot)| slot).collect();
        let mut cancelled = self.oauth.cleanup() + self.pak.cleanup();
        for provider in private_apps.iter().filter_map(|slot| slot.get()) {
            cancelled += provider.cleanup();
        }
        debug!(cancelled, "auth manager cleaned up");
    }

    /// Timers currently armed across all providers.
    pub fn armed_timers(&self) -> usize {
        let private_apps: usize = self
            .private_apps
            .lock()
            .values()
            .filter_map(|slot| slot.get())
            .map(PrivateAppUserTokenProvider::armed_timers)
            .sum();
        self.oauth.armed_timers() + self.pak.armed_timers() + private_apps
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
