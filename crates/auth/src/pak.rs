// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Personal access key exchange.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use crate::api::{AccountIdentity, AuthApi};
use crate::clock::Clock;
use crate::config::{AccountConfig, AuthType, Environment, TokenInfo};
use crate::credential::{AccountId, CachedCredential};
use crate::error::AuthError;
use crate::lifecycle::Lifecycle;
use crate::store::{require_account, AccountStore};
use crate::timer::Timer;

/// In-flight refreshes are keyed by the key and the expiry of the token
/// being replaced, so a refresh for a newer token generation never joins
/// one for an older generation.
type RefreshKey = (String, u64);

struct Inner {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn AccountStore>,
    lifecycle: Lifecycle<AccountId, RefreshKey>,
}

/// Hands out access tokens derived from an account's personal access key.
#[derive(Clone)]
pub struct PersonalAccessKeyProvider {
    inner: Arc<Inner>,
}

fn personal_access_key(account: &AccountConfig) -> Result<String, AuthError> {
    account
        .personal_access_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or(AuthError::MissingPersonalAccessKey(account.account_id))
}

impl PersonalAccessKeyProvider {
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<dyn AccountStore>,
        timer: Arc<dyn Timer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { inner: Arc::new(Inner { api, store, lifecycle: Lifecycle::new(timer, clock) }) }
    }

    fn account(&self, account_id: AccountId) -> Result<(AccountConfig, String), AuthError> {
        let account =
            require_account(&*self.inner.store, account_id, AuthType::PersonalAccessKey)?;
        let key = personal_access_key(&account)?;
        Ok((account, key))
    }

    /// A usable access token for `account_id`. `force_refresh` exchanges the
    /// key even when the cached token is still fresh.
    pub async fn access_token(
        &self,
        account_id: AccountId,
        force_refresh: bool,
    ) -> Result<String, AuthError> {
        let (account, key) = self.account(account_id)?;
        let lifecycle = &self.inner.lifecycle;
        let cached = lifecycle.cache.get_or_seed(&account_id, || account.token_info().cached());

        if !force_refresh {
            if let Some(ref cached) = cached {
                if lifecycle.is_fresh(cached, &BTreeSet::new()) {
                    debug!(account = account_id, "using cached access token");
                    return Ok(cached.access_token.clone());
                }
            }
        }
        let current_expiry = cached.map_or(0, |c| c.expires_at_ms);
        let credential = refresh(Arc::clone(&self.inner), account_id, key, current_expiry).await?;
        Ok(credential.access_token)
    }

    /// Environment the account lives in.
    pub fn environment(&self, account_id: AccountId) -> Result<Environment, AuthError> {
        self.account(account_id).map(|(account, _)| account.env)
    }

    /// Exchange the key and report what it says about the account.
    ///
    /// Always hits the network; identity data is never cached.
    pub async fn account_identity(
        &self,
        account_id: AccountId,
    ) -> Result<AccountIdentity, AuthError> {
        let (account, key) = self.account(account_id)?;
        let resp =
            self.inner.api.exchange_personal_access_key(account.env, &key, account_id).await?;
        Ok(resp.identity())
    }

    pub async fn enabled_features(
        &self,
        account_id: AccountId,
    ) -> Result<BTreeMap<String, u64>, AuthError> {
        Ok(self.account_identity(account_id).await?.enabled_features)
    }

    /// Cancel proactive refreshes and forget cached tokens.
    pub fn cleanup(&self) -> usize {
        self.inner.lifecycle.cleanup()
    }

    pub fn armed_timers(&self) -> usize {
        self.inner.lifecycle.scheduler.armed()
    }
}

fn refresh(
    inner: Arc<Inner>,
    account_id: AccountId,
    key: String,
    current_expiry: u64,
) -> BoxFuture<'static, Result<CachedCredential, AuthError>> {
    async move {
        let epoch = inner.lifecycle.epoch();
        let task = Arc::clone(&inner);
        let dedup_key = (key.clone(), current_expiry);
        inner
            .lifecycle
            .deduper
            .get_or_start(dedup_key, move || exchange(task, account_id, key, epoch))
            .await
    }
    .boxed()
}

async fn exchange(
    inner: Arc<Inner>,
    account_id: AccountId,
    key: String,
    epoch: u64,
) -> Result<CachedCredential, AuthError> {
    let account = require_account(&*inner.store, account_id, AuthType::PersonalAccessKey)?;
    let resp = inner.api.exchange_personal_access_key(account.env, &key, account_id).await?;

    let credential = CachedCredential::new(resp.access_token, resp.expires_at_millis)
        .with_scopes(resp.scope_groups);
    let token_info = TokenInfo {
        access_token: Some(credential.access_token.clone()),
        refresh_token: None,
        expires_at: Some(credential.expires_at_ms),
    };
    if let Err(e) = inner.store.persist_token(account_id, &token_info) {
        warn!(account = account_id, err = %e, "failed to persist access token");
    }

    let weak = Arc::downgrade(&inner);
    inner.lifecycle.commit(epoch, account_id, credential.clone(), move || {
        scheduled_refresh(weak, account_id)
    });
    info!(
        account = account_id,
        expires_at_ms = credential.expires_at_ms,
        "refreshed personal access key token"
    );
    Ok(credential)
}

async fn scheduled_refresh(inner: Weak<Inner>, account_id: AccountId) {
    let Some(inner) = inner.upgrade() else { return };
    let key = match require_account(&*inner.store, account_id, AuthType::PersonalAccessKey)
        .and_then(|account| personal_access_key(&account))
    {
        Ok(key) => key,
        Err(e) => {
            warn!(account = account_id, err = %e, "scheduled refresh skipped");
            return;
        }
    };
    let current_expiry = inner.lifecycle.cache.get(&account_id).map_or(0, |c| c.expires_at_ms);
    if let Err(e) = refresh(inner, account_id, key, current_expiry).await {
        warn!(account = account_id, err = %e, "scheduled personal access key refresh failed");
    }
}

#[cfg(test)]
#[path = "pak_tests.rs"]
mod tests;
