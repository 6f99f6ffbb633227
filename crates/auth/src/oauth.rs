// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth2 refresh-token exchange.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::clock::Clock;
use crate::config::{AccountConfig, AuthType, Environment, TokenInfo};
use crate::credential::{AccountId, CachedCredential};
use crate::error::AuthError;
use crate::lifecycle::Lifecycle;
use crate::store::{require_account, AccountStore};
use crate::timer::Timer;

/// Share of the server-reported lifetime we treat as usable, to absorb
/// clock skew.
pub const LIFETIME_FACTOR: f64 = 0.75;

struct Inner {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn AccountStore>,
    lifecycle: Lifecycle<AccountId>,
}

/// Hands out OAuth2 access tokens, refreshing them with the account's
/// refresh token.
#[derive(Clone)]
pub struct OAuth2Provider {
    inner: Arc<Inner>,
}

/// Client settings needed for one exchange.
struct Grant {
    env: Environment,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl Grant {
    /// `cached_refresh` is a rotated token from an earlier exchange and wins
    /// over the configured one.
    fn from_account(
        account: &AccountConfig,
        cached_refresh: Option<String>,
    ) -> Result<Self, AuthError> {
        let account_id = account.account_id;
        let auth = account.auth.as_ref();
        let refresh_token = cached_refresh
            .or_else(|| auth.and_then(|a| a.token_info.refresh_token.clone()))
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingRefreshToken(account_id))?;
        let (client_id, client_secret) = auth
            .and_then(|a| Some((a.client_id.clone()?, a.client_secret.clone()?)))
            .ok_or(AuthError::MissingClientCredentials(account_id))?;
        Ok(Self { env: account.env, client_id, client_secret, refresh_token })
    }
}

impl OAuth2Provider {
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<dyn AccountStore>,
        timer: Arc<dyn Timer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { inner: Arc::new(Inner { api, store, lifecycle: Lifecycle::new(timer, clock) }) }
    }

    /// A usable access token for `account_id`, exchanging the refresh token
    /// when the cached one is missing or inside the safety window.
    pub async fn access_token(&self, account_id: AccountId) -> Result<String, AuthError> {
        let account = require_account(&*self.inner.store, account_id, AuthType::OAuth2)?;
        let lifecycle = &self.inner.lifecycle;
        let cached = lifecycle.cache.get_or_seed(&account_id, || account.token_info().cached());
        Grant::from_account(&account, cached.as_ref().and_then(|c| c.refresh_token.clone()))?;

        if let Some(cached) = cached.filter(|c| lifecycle.is_fresh(c, &BTreeSet::new())) {
            debug!(account = account_id, "using cached oauth access token");
            return Ok(cached.access_token);
        }
        let credential = refresh(Arc::clone(&self.inner), account_id).await?;
        Ok(credential.access_token)
    }

    /// Cancel proactive refreshes and forget cached tokens.
    pub fn cleanup(&self) -> usize {
        self.inner.lifecycle.cleanup()
    }

    pub fn armed_timers(&self) -> usize {
        self.inner.lifecycle.scheduler.armed()
    }
}

/// Refresh through the deduper so concurrent callers and the timer share
/// one exchange.
fn refresh(
    inner: Arc<Inner>,
    account_id: AccountId,
) -> BoxFuture<'static, Result<CachedCredential, AuthError>> {
    async move {
        let epoch = inner.lifecycle.epoch();
        let task = Arc::clone(&inner);
        inner
            .lifecycle
            .deduper
            .get_or_start(account_id, move || exchange(task, account_id, epoch))
            .await
    }
    .boxed()
}

async fn exchange(
    inner: Arc<Inner>,
    account_id: AccountId,
    epoch: u64,
) -> Result<CachedCredential, AuthError> {
    let account = require_account(&*inner.store, account_id, AuthType::OAuth2)?;
    let previous = inner.lifecycle.cache.get(&account_id).and_then(|c| c.refresh_token);
    let grant = Grant::from_account(&account, previous)?;

    let Grant { env, client_id, client_secret, refresh_token } = grant;
    let resp =
        inner.api.exchange_oauth_token(env, &client_id, &client_secret, &refresh_token).await?;

    let lifetime_ms = (resp.expires_in as f64 * 1000.0 * LIFETIME_FACTOR) as u64;
    let expires_at_ms = inner.lifecycle.now_ms().saturating_add(lifetime_ms);
    let refresh_token = resp.refresh_token.unwrap_or(refresh_token);
    let credential = CachedCredential::new(resp.access_token, expires_at_ms)
        .with_refresh_token(Some(refresh_token.clone()));

    let token_info = TokenInfo {
        access_token: Some(credential.access_token.clone()),
        refresh_token: Some(refresh_token),
        expires_at: Some(expires_at_ms),
    };
    if let Err(e) = inner.store.persist_token(account_id, &token_info) {
        warn!(account = account_id, err = %e, "failed to persist oauth token");
    }

    let weak = Arc::downgrade(&inner);
    inner.lifecycle.commit(epoch, account_id, credential.clone(), move || {
        scheduled_refresh(weak, account_id)
    });
    info!(account = account_id, expires_at_ms, "refreshed oauth access token");
    Ok(credential)
}

async fn scheduled_refresh(inner: Weak<Inner>, account_id: AccountId) {
    let Some(inner) = inner.upgrade() else { return };
    if let Err(e) = refresh(inner, account_id).await {
        warn!(account = account_id, err = %e, "scheduled oauth refresh failed");
    }
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
