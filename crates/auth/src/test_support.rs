// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fakes, builders, and assertion helpers.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::{AccessTokenResponse, AuthApi, OAuthTokenResponse, PrivateAppUserToken};
use crate::clock::Clock;
use crate::config::{AccountConfig, AccountsFile, AuthSettings, AuthType, Environment, TokenInfo};
use crate::credential::{AccountId, AppId};
use crate::error::AuthError;
use crate::store::JsonAccountStore;

static CRYPTO: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Wall clock that follows tokio's (possibly paused) time.
///
/// Starts at a fixed epoch so expiry values in tests are stable.
#[derive(Debug, Clone, Copy)]
pub struct PausedClock {
    base_ms: u64,
    start: tokio::time::Instant,
}

impl PausedClock {
    pub const BASE_MS: u64 = 1_700_000_000_000;

    pub fn new() -> Self {
        Self { base_ms: Self::BASE_MS, start: tokio::time::Instant::now() }
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for PausedClock {
    fn now_ms(&self) -> u64 {
        self.base_ms + self.start.elapsed().as_millis() as u64
    }
}

/// Endpoints of [`FakeAuthApi`], for call counts and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    OAuth,
    PersonalAccessKey,
    ScopeGroups,
    FetchUserToken,
    CreateUserToken,
    UpdateUserToken,
}

const CALLS: usize = 6;

/// Scripted in-process [`AuthApi`].
///
/// Tokens are numbered per endpoint (`oauth-access-1`, `pak-access-2`, ...)
/// and expire relative to the injected clock. Private app user tokens are
/// kept in a server-side map so fetch, create and update behave like the
/// real endpoints.
pub struct FakeAuthApi {
    clock: Arc<dyn Clock>,
    latency: Duration,
    oauth_expires_in: u64,
    rotate_refresh_token: bool,
    pak_lifetime: Duration,
    user_token_lifetime: Duration,
    scope_groups: Vec<String>,
    calls: [AtomicU32; CALLS],
    failures: Mutex<HashMap<FakeCall, VecDeque<AuthError>>>,
    user_tokens: Mutex<HashMap<(AccountId, AppId), PrivateAppUserToken>>,
    refresh_tokens_seen: Mutex<Vec<String>>,
    scope_requests: Mutex<Vec<(FakeCall, BTreeSet<String>)>>,
}

impl FakeAuthApi {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            latency: Duration::ZERO,
            oauth_expires_in: 3600,
            rotate_refresh_token: true,
            pak_lifetime: Duration::from_secs(3600),
            user_token_lifetime: Duration::from_secs(3600),
            scope_groups: vec![
                "temporary_token.read".to_owned(),
                "temporary_token.write".to_owned(),
            ],
            calls: Default::default(),
            failures: Mutex::new(HashMap::new()),
            user_tokens: Mutex::new(HashMap::new()),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            scope_requests: Mutex::new(Vec::new()),
        }
    }

    /// Delay every call by `latency` of tokio time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_oauth_expires_in(mut self, secs: u64) -> Self {
        self.oauth_expires_in = secs;
        self
    }

    pub fn without_refresh_rotation(mut self) -> Self {
        self.rotate_refresh_token = false;
        self
    }

    pub fn with_pak_lifetime(mut self, lifetime: Duration) -> Self {
        self.pak_lifetime = lifetime;
        self
    }

    pub fn with_user_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.user_token_lifetime = lifetime;
        self
    }

    pub fn with_scope_groups(mut self, groups: &[&str]) -> Self {
        self.scope_groups = groups.iter().map(|g| (*g).to_owned()).collect();
        self
    }

    /// Make the next call to `call` fail with `err`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, call: FakeCall, err: AuthError) {
        self.failures.lock().entry(call).or_default().push_back(err);
    }

    pub fn calls(&self, call: FakeCall) -> u32 {
        self.calls[call as usize].load(Ordering::SeqCst)
    }

    /// Refresh tokens presented to the OAuth endpoint, in order.
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().clone()
    }

    /// Scope groups sent with each create or update, in order.
    pub fn scope_requests(&self) -> Vec<(FakeCall, BTreeSet<String>)> {
        self.scope_requests.lock().clone()
    }

    /// Seed a server-side user token.
    pub fn insert_user_token(&self, account_id: AccountId, token: PrivateAppUserToken) {
        self.user_tokens.lock().insert((account_id, token.app_id), token);
    }

    pub fn user_token(&self, account_id: AccountId, app_id: AppId) -> Option<PrivateAppUserToken> {
        self.user_tokens.lock().get(&(account_id, app_id)).cloned()
    }

    /// Count the call, wait out the latency, then apply any queued failure.
    /// Returns the 1-based call number.
    async fn enter(&self, call: FakeCall) -> Result<u32, AuthError> {
        let n = self.calls[call as usize].fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(err) = self.failures.lock().get_mut(&call).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(n)
    }

    fn expires_at(&self, lifetime: Duration) -> u64 {
        self.clock.now_ms() + lifetime.as_millis() as u64
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn exchange_oauth_token(
        &self,
        _env: Environment,
        _client_id: &str,
        _client_secret: &str,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, AuthError> {
        self.refresh_tokens_seen.lock().push(refresh_token.to_owned());
        let n = self.enter(FakeCall::OAuth).await?;
        Ok(OAuthTokenResponse {
            access_token: format!("oauth-access-{n}"),
            refresh_token: self.rotate_refresh_token.then(|| format!("oauth-refresh-{n}")),
            expires_in: self.oauth_expires_in,
        })
    }

    async fn exchange_personal_access_key(
        &self,
        _env: Environment,
        _personal_access_key: &str,
        account_id: AccountId,
    ) -> Result<AccessTokenResponse, AuthError> {
        let n = self.enter(FakeCall::PersonalAccessKey).await?;
        Ok(AccessTokenResponse {
            access_token: format!("pak-access-{n}"),
            expires_at_millis: self.expires_at(self.pak_lifetime),
            scope_groups: self.scope_groups.clone(),
            enabled_features: [("feature-a".to_owned(), 1)].into(),
            hub_id: account_id,
            account_type: Some("DEVELOPER_TEST".to_owned()),
            parent_hub_id: None,
            user_id: Some(100),
            hub_name: Some(format!("hub-{account_id}")),
        })
    }

    async fn fetch_scope_groups(
        &self,
        _env: Environment,
        _account_id: AccountId,
        _bearer: &str,
    ) -> Result<Vec<String>, AuthError> {
        self.enter(FakeCall::ScopeGroups).await?;
        Ok(self.scope_groups.clone())
    }

    async fn fetch_private_app_user_token(
        &self,
        _env: Environment,
        account_id: AccountId,
        app_id: AppId,
        _bearer: &str,
    ) -> Result<Option<PrivateAppUserToken>, AuthError> {
        self.enter(FakeCall::FetchUserToken).await?;
        Ok(self.user_token(account_id, app_id))
    }

    async fn create_private_app_user_token(
        &self,
        _env: Environment,
        account_id: AccountId,
        app_id: AppId,
        scope_groups: &BTreeSet<String>,
        _bearer: &str,
    ) -> Result<PrivateAppUserToken, AuthError> {
        self.scope_requests.lock().push((FakeCall::CreateUserToken, scope_groups.clone()));
        let n = self.enter(FakeCall::CreateUserToken).await?;
        let token = PrivateAppUserToken {
            user_token_key: format!("utk-{app_id}"),
            user_token: format!("user-token-{app_id}-created-{n}"),
            app_id,
            user_id: Some(100),
            cached_scope_groups: scope_groups.clone(),
            expires_at: self.expires_at(self.user_token_lifetime),
        };
        self.insert_user_token(account_id, token.clone());
        Ok(token)
    }

    async fn update_private_app_user_token(
        &self,
        _env: Environment,
        account_id: AccountId,
        app_id: AppId,
        user_token_key: &str,
        scope_groups: &BTreeSet<String>,
        _bearer: &str,
    ) -> Result<PrivateAppUserToken, AuthError> {
        self.scope_requests.lock().push((FakeCall::UpdateUserToken, scope_groups.clone()));
        let n = self.enter(FakeCall::UpdateUserToken).await?;
        let token = PrivateAppUserToken {
            user_token_key: user_token_key.to_owned(),
            user_token: format!("user-token-{app_id}-updated-{n}"),
            app_id,
            user_id: Some(100),
            cached_scope_groups: scope_groups.clone(),
            expires_at: self.expires_at(self.user_token_lifetime),
        };
        self.insert_user_token(account_id, token.clone());
        Ok(token)
    }
}

/// OAuth2 account with client credentials and refresh token `rt-{id}`.
pub fn oauth_account(account_id: AccountId) -> AccountConfig {
    let mut account = AccountConfig::new(account_id, AuthType::OAuth2);
    account.auth = Some(AuthSettings {
        client_id: Some("client-id".to_owned()),
        client_secret: Some("client-secret".to_owned()),
        scopes: vec!["content".to_owned()],
        token_info: TokenInfo {
            refresh_token: Some(format!("rt-{account_id}")),
            ..Default::default()
        },
    });
    account
}

/// Personal-access-key account with key `pak-{id}`.
pub fn pak_account(account_id: AccountId) -> AccountConfig {
    let mut account = AccountConfig::new(account_id, AuthType::PersonalAccessKey);
    account.personal_access_key = Some(format!("pak-{account_id}"));
    account
}

/// In-memory store holding `accounts`.
pub fn memory_store(accounts: Vec<AccountConfig>) -> Arc<JsonAccountStore> {
    Arc::new(JsonAccountStore::in_memory(AccountsFile { accounts, ..Default::default() }))
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
