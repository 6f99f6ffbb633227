// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::config::AccountConfig;
use crate::store::JsonAccountStore;
use crate::test_support::{memory_store, oauth_account, FakeAuthApi, FakeCall, PausedClock};
use crate::timer::TokioTimer;

struct Harness {
    provider: OAuth2Provider,
    api: Arc<FakeAuthApi>,
    store: Arc<JsonAccountStore>,
    clock: Arc<PausedClock>,
}

fn harness(accounts: Vec<AccountConfig>, configure: fn(FakeAuthApi) -> FakeAuthApi) -> Harness {
    let clock = Arc::new(PausedClock::new());
    let api = Arc::new(configure(FakeAuthApi::new(clock.clone())));
    let store = memory_store(accounts);
    let provider =
        OAuth2Provider::new(api.clone(), store.clone(), Arc::new(TokioTimer), clock.clone());
    Harness { provider, api, store, clock }
}

fn default_harness() -> Harness {
    harness(vec![oauth_account(1)], |api| api)
}

fn persisted(store: &JsonAccountStore, account_id: AccountId) -> TokenInfo {
    store.account(account_id).map(|a| a.token_info()).unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn unknown_account_fails_before_network() {
    let h = default_harness();
    let err = h.provider.access_token(99).await.expect_err("should fail");
    assert_eq!(err, AuthError::AccountNotFound(99));
    assert_eq!(h.api.calls(FakeCall::OAuth), 0);
}

#[tokio::test(start_paused = true)]
async fn wrong_auth_type_fails_before_network() {
    let h = harness(vec![crate::test_support::pak_account(1)], |api| api);
    let err = h.provider.access_token(1).await.expect_err("should fail");
    assert!(
        matches!(err, AuthError::InvalidAuthType { expected: AuthType::OAuth2, .. }),
        "{err:?}"
    );
    assert_eq!(h.api.calls(FakeCall::OAuth), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_refresh_token_fails_before_network() {
    let mut account = oauth_account(1);
    if let Some(auth) = account.auth.as_mut() {
        auth.token_info.refresh_token = None;
    }
    let h = harness(vec![account], |api| api);

    let err = h.provider.access_token(1).await.expect_err("should fail");
    assert_eq!(err, AuthError::MissingRefreshToken(1));
    assert!(err.is_config());
    assert_eq!(h.api.calls(FakeCall::OAuth), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_client_secret_is_config_error() {
    let mut account = oauth_account(1);
    if let Some(auth) = account.auth.as_mut() {
        auth.client_secret = None;
    }
    let h = harness(vec![account], |api| api);

    crate::assert_err_contains!(h.provider.access_token(1).await, "client secret");
    assert_eq!(h.api.calls(FakeCall::OAuth), 0);
}

#[tokio::test(start_paused = true)]
async fn exchanges_once_then_serves_from_cache() -> anyhow::Result<()> {
    let h = default_harness();

    assert_eq!(h.provider.access_token(1).await?, "oauth-access-1");
    assert_eq!(h.provider.access_token(1).await?, "oauth-access-1");
    assert_eq!(h.api.calls(FakeCall::OAuth), 1);

    // 0.75 of the reported hour.
    let cached = h.provider.inner.lifecycle.cache.get(&1).expect("cached");
    assert_eq!(cached.expires_at_ms, h.clock.now_ms() + 2_700_000);
    assert_eq!(cached.refresh_token.as_deref(), Some("oauth-refresh-1"));
    assert_eq!(h.provider.armed_timers(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_exchange() {
    let h = harness(vec![oauth_account(1)], |api| api.with_latency(Duration::from_secs(1)));

    let results =
        futures_util::future::join_all((0..10).map(|_| h.provider.access_token(1))).await;

    assert_eq!(h.api.calls(FakeCall::OAuth), 1);
    for result in results {
        assert_eq!(result.ok().as_deref(), Some("oauth-access-1"));
    }
}

#[tokio::test(start_paused = true)]
async fn persists_rotated_refresh_token() -> anyhow::Result<()> {
    let h = default_harness();
    h.provider.access_token(1).await?;

    let info = persisted(&h.store, 1);
    assert_eq!(info.access_token.as_deref(), Some("oauth-access-1"));
    assert_eq!(info.refresh_token.as_deref(), Some("oauth-refresh-1"));
    assert_eq!(info.expires_at, Some(PausedClock::BASE_MS + 2_700_000));

    let stored = h.store.account(1).and_then(|a| a.auth).expect("auth block");
    assert_eq!(stored.client_secret.as_deref(), Some("client-secret"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn keeps_refresh_token_when_server_does_not_rotate() -> anyhow::Result<()> {
    let h = harness(vec![oauth_account(1)], |api| api.without_refresh_rotation());
    h.provider.access_token(1).await?;

    assert_eq!(persisted(&h.store, 1).refresh_token.as_deref(), Some("rt-1"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failure_is_not_cached() -> anyhow::Result<()> {
    let h = default_harness();
    h.api.fail_next(
        FakeCall::OAuth,
        AuthError::Exchange { status: Some(400), message: "invalid_grant".into() },
    );

    let err = h.provider.access_token(1).await.expect_err("should fail");
    assert_eq!(err.status(), Some(400));
    assert_eq!(h.provider.inner.lifecycle.deduper.in_flight(), 0);
    assert_eq!(h.provider.armed_timers(), 0);

    assert_eq!(h.provider.access_token(1).await?, "oauth-access-2");
    assert_eq!(h.api.calls(FakeCall::OAuth), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timer_refreshes_before_expiry_with_rotated_token() -> anyhow::Result<()> {
    let h = default_harness();
    h.provider.access_token(1).await?;

    // Expiry is 2700s out, so the timer fires at 2400s.
    tokio::time::sleep(Duration::from_secs(2399)).await;
    assert_eq!(h.api.calls(FakeCall::OAuth), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.api.calls(FakeCall::OAuth), 2);
    assert_eq!(h.api.refresh_tokens_seen(), vec!["rt-1", "oauth-refresh-1"]);
    assert_eq!(h.provider.armed_timers(), 1);

    assert_eq!(h.provider.access_token(1).await?, "oauth-access-2");
    assert_eq!(h.api.calls(FakeCall::OAuth), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn huge_expires_in_saturates_expiry() -> anyhow::Result<()> {
    let h = harness(vec![oauth_account(1)], |api| api.with_oauth_expires_in(u64::MAX));

    assert_eq!(h.provider.access_token(1).await?, "oauth-access-1");
    assert_eq!(h.provider.access_token(1).await?, "oauth-access-1");
    assert_eq!(h.api.calls(FakeCall::OAuth), 1);
    assert_eq!(persisted(&h.store, 1).expires_at, Some(u64::MAX));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_timer_refresh_is_not_retried() -> anyhow::Result<()> {
    let h = default_harness();
    h.provider.access_token(1).await?;
    h.api.fail_next(FakeCall::OAuth, AuthError::Exchange { status: None, message: "down".into() });

    tokio::time::sleep(Duration::from_secs(2401)).await;
    assert_eq!(h.api.calls(FakeCall::OAuth), 2);
    assert_eq!(h.provider.armed_timers(), 0);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(h.api.calls(FakeCall::OAuth), 2);

    // The next on-demand call sees a stale token and retries.
    assert_eq!(h.provider.access_token(1).await?, "oauth-access-3");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cleanup_cancels_timers() -> anyhow::Result<()> {
    let h = default_harness();
    h.provider.access_token(1).await?;
    assert_eq!(h.provider.armed_timers(), 1);

    assert_eq!(h.provider.cleanup(), 1);
    assert_eq!(h.provider.cleanup(), 0);
    assert_eq!(h.provider.armed_timers(), 0);

    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
    assert_eq!(h.api.calls(FakeCall::OAuth), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn late_refresh_does_not_resurrect_cache() -> anyhow::Result<()> {
    let h = harness(vec![oauth_account(1)], |api| api.with_latency(Duration::from_secs(10)));

    let provider = h.provider.clone();
    let pending = tokio::spawn(async move { provider.access_token(1).await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.provider.cleanup();

    assert_eq!(pending.await??, "oauth-access-1");
    assert!(h.provider.inner.lifecycle.cache.is_empty());
    assert_eq!(h.provider.armed_timers(), 0);
    // The rotated refresh token is still written back.
    assert_eq!(persisted(&h.store, 1).refresh_token.as_deref(), Some("oauth-refresh-1"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn seeds_cache_from_persisted_token() -> anyhow::Result<()> {
    let clock = PausedClock::new();
    let mut account = oauth_account(1);
    if let Some(auth) = account.auth.as_mut() {
        auth.token_info.access_token = Some("persisted".into());
        auth.token_info.expires_at = Some(clock.now_ms() + 3_600_000);
    }
    let h = harness(vec![account], |api| api);

    assert_eq!(h.provider.access_token(1).await?, "persisted");
    assert_eq!(h.api.calls(FakeCall::OAuth), 0);

    // Past the window the persisted refresh token is exchanged.
    tokio::time::sleep(Duration::from_secs(3600 - 299)).await;
    assert_eq!(h.provider.access_token(1).await?, "oauth-access-1");
    assert_eq!(h.api.refresh_tokens_seen(), vec!["rt-1"]);
    Ok(())
}
