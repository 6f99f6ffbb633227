// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Private app user tokens, issued against an account's personal access key.
//!
//! Unlike the other providers a cached token must also carry every scope
//! group the caller asks for. A token that is fresh but too narrow is widened
//! server-side with an update call rather than replaced.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, error, info, warn};

use crate::api::{AuthApi, PrivateAppUserToken};
use crate::clock::Clock;
use crate::config::Environment;
use crate::credential::{AccountId, AppId, CachedCredential};
use crate::error::AuthError;
use crate::lifecycle::Lifecycle;
use crate::pak::PersonalAccessKeyProvider;
use crate::timer::Timer;

/// Scope groups the personal access key needs before user tokens can be
/// issued.
pub const REQUIRED_KEY_SCOPES: [&str; 2] = ["temporary_token.read", "temporary_token.write"];

/// Extra refreshes a caller starts after joining one that was begun for a
/// narrower scope set.
const MAX_SCOPE_RETRIES: usize = 2;

type Identity = (AccountId, AppId);

struct Inner {
    account_id: AccountId,
    env: Environment,
    api: Arc<dyn AuthApi>,
    pak: PersonalAccessKeyProvider,
    enabled: bool,
    lifecycle: Lifecycle<Identity>,
}

/// User tokens for the private apps of one account.
#[derive(Clone)]
pub struct PrivateAppUserTokenProvider {
    inner: Arc<Inner>,
}

impl PrivateAppUserTokenProvider {
    /// Check the account's key scopes and build the provider.
    ///
    /// A key without both temporary-token scope groups yields a disabled
    /// provider, not an error.
    pub async fn init(
        account_id: AccountId,
        api: Arc<dyn AuthApi>,
        pak: PersonalAccessKeyProvider,
        timer: Arc<dyn Timer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let env = pak.environment(account_id)?;
        let bearer = pak.access_token(account_id, false).await?;
        let granted = api.fetch_scope_groups(env, account_id, &bearer).await?;
        let enabled = REQUIRED_KEY_SCOPES.iter().all(|s| granted.iter().any(|g| g == s));
        if enabled {
            debug!(account = account_id, "private app user tokens enabled");
        } else {
            debug!(
                account = account_id,
                "personal access key lacks temporary token scopes, private app user tokens disabled"
            );
        }
        Ok(Self {
            inner: Arc::new(Inner {
                account_id,
                env,
                api,
                pak,
                enabled,
                lifecycle: Lifecycle::new(timer, clock),
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    pub fn account_id(&self) -> AccountId {
        self.inner.account_id
    }

    /// A user token for `app_id` granting at least `required`.
    ///
    /// Returns `Ok(None)` when the provider is disabled.
    pub async fn get_token(
        &self,
        app_id: AppId,
        required: &BTreeSet<String>,
    ) -> Result<Option<String>, AuthError> {
        let account_id = self.inner.account_id;
        if !self.inner.enabled {
            debug!(account = account_id, app_id, "private app user tokens disabled, skipping");
            return Ok(None);
        }
        if let Some(cached) = self.inner.lifecycle.fresh(&(account_id, app_id), required) {
            debug!(account = account_id, app_id, "using cached private app user token");
            return Ok(Some(cached.access_token));
        }
        match self.resolve(app_id, required).await {
            Ok(credential) => Ok(Some(credential.access_token)),
            Err(e) => {
                error!(
                    account = account_id,
                    app_id,
                    err = %e,
                    "failed to get private app user token"
                );
                Err(AuthError::PrivateApp { account_id, app_id, message: e.to_string() })
            }
        }
    }

    async fn resolve(
        &self,
        app_id: AppId,
        required: &BTreeSet<String>,
    ) -> Result<CachedCredential, AuthError> {
        let mut attempt = 0;
        loop {
            let credential = refresh(Arc::clone(&self.inner), app_id, required.clone()).await?;
            if credential.covers(required) {
                return Ok(credential);
            }
            if attempt == MAX_SCOPE_RETRIES {
                return Err(AuthError::InsufficientScopes {
                    app_id,
                    missing: credential.missing_scopes(required),
                });
            }
            attempt += 1;
            debug!(
                account = self.inner.account_id,
                app_id, attempt, "joined refresh was for narrower scope groups, refreshing again"
            );
        }
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
    app_id: AppId,
    required: BTreeSet<String>,
) -> BoxFuture<'static, Result<CachedCredential, AuthError>> {
    async move {
        let epoch = inner.lifecycle.epoch();
        let task = Arc::clone(&inner);
        let key = (inner.account_id, app_id);
        inner
            .lifecycle
            .deduper
            .get_or_start(key, move || exchange(task, app_id, required, epoch))
            .await
    }
    .boxed()
}

fn credential_of(token: &PrivateAppUserToken) -> CachedCredential {
    CachedCredential::new(token.user_token.clone(), token.expires_at)
        .with_scopes(token.cached_scope_groups.iter().cloned())
}

/// Fetch the app's current user token and create, widen or reuse it.
async fn exchange(
    inner: Arc<Inner>,
    app_id: AppId,
    required: BTreeSet<String>,
    epoch: u64,
) -> Result<CachedCredential, AuthError> {
    let (account_id, env) = (inner.account_id, inner.env);
    let bearer = inner.pak.access_token(account_id, false).await?;
    let api = &inner.api;

    let token = match api.fetch_private_app_user_token(env, account_id, app_id, &bearer).await? {
        None => {
            info!(account = account_id, app_id, "creating private app user token");
            api.create_private_app_user_token(env, account_id, app_id, &required, &bearer).await?
        }
        Some(existing) if !inner.lifecycle.is_fresh(&credential_of(&existing), &required) => {
            let scopes: BTreeSet<String> =
                existing.cached_scope_groups.union(&required).cloned().collect();
            info!(account = account_id, app_id, "updating private app user token");
            api.update_private_app_user_token(
                env,
                account_id,
                app_id,
                &existing.user_token_key,
                &scopes,
                &bearer,
            )
            .await?
        }
        Some(existing) => existing,
    };

    let credential = credential_of(&token);
    let weak = Arc::downgrade(&inner);
    let scopes = credential.granted_scopes.clone();
    inner.lifecycle.commit(epoch, (account_id, app_id), credential.clone(), move || {
        scheduled_refresh(weak, app_id, scopes)
    });
    Ok(credential)
}

async fn scheduled_refresh(inner: Weak<Inner>, app_id: AppId, scopes: BTreeSet<String>) {
    let Some(inner) = inner.upgrade() else { return };
    let account_id = inner.account_id;
    if let Err(e) = refresh(inner, app_id, scopes).await {
        warn!(account = account_id, app_id, err = %e, "scheduled private app token refresh failed");
    }
}

#[cfg(test)]
#[path = "private_app_tests.rs"]
mod tests;
