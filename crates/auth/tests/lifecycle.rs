// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end credential flows through `AuthManager` with a file-backed store.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use devhub_auth::api::HttpAuthApi;
use devhub_auth::clock::SystemClock;
use devhub_auth::config::{AccountsFile, AuthSettings, TokenInfo};
use devhub_auth::store::{AccountStore, JsonAccountStore};
use devhub_auth::test_support::{
    ensure_crypto_provider, oauth_account, pak_account, FakeAuthApi, FakeCall, PausedClock,
};
use devhub_auth::timer::TokioTimer;
use devhub_auth::AuthManager;

fn write_accounts(path: &Path, file: &AccountsFile) -> anyhow::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(file)?)?;
    Ok(())
}

fn persisted(path: &Path, account_id: u64) -> anyhow::Result<TokenInfo> {
    let store = JsonAccountStore::open(path)?;
    Ok(store.account(account_id).map(|a| a.token_info()).unwrap_or_default())
}

#[tokio::test(start_paused = true)]
async fn personal_access_key_token_lifecycle() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("accounts.json");

    // Account 123 holds a token that expires ten minutes from now.
    let mut account = pak_account(123);
    account.auth = Some(AuthSettings {
        token_info: TokenInfo {
            access_token: Some("persisted-token".into()),
            refresh_token: None,
            expires_at: Some(PausedClock::BASE_MS + 10 * 60 * 1000),
        },
        ..Default::default()
    });
    let file = AccountsFile { accounts: vec![account], ..Default::default() };
    write_accounts(&path, &file)?;

    let clock = Arc::new(PausedClock::new());
    let api = Arc::new(FakeAuthApi::new(clock.clone()));
    let store = Arc::new(JsonAccountStore::open(&path)?);
    let manager = AuthManager::with_runtime(store, api.clone(), Arc::new(TokioTimer), clock);

    assert_eq!(manager.personal_access_key_access_token(123, false).await?, "persisted-token");
    assert_eq!(api.calls(FakeCall::PersonalAccessKey), 0);

    tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
    assert_eq!(manager.personal_access_key_access_token(123, false).await?, "pak-access-1");
    assert_eq!(api.calls(FakeCall::PersonalAccessKey), 1);

    let info = persisted(&path, 123)?;
    assert_eq!(info.access_token.as_deref(), Some("pak-access-1"));
    assert!(info.expires_at > Some(PausedClock::BASE_MS + 5 * 60 * 1000));

    manager.cleanup();
    assert_eq!(manager.armed_timers(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn private_app_token_widens_scopes() -> anyhow::Result<()> {
    let clock = Arc::new(PausedClock::new());
    let api = Arc::new(FakeAuthApi::new(clock.clone()));
    let store = Arc::new(JsonAccountStore::in_memory(AccountsFile {
        accounts: vec![pak_account(9)],
        ..Default::default()
    }));
    let manager = AuthManager::with_runtime(store, api.clone(), Arc::new(TokioTimer), clock);

    let a: BTreeSet<String> = ["a".to_owned()].into();
    let ab: BTreeSet<String> = ["a".to_owned(), "b".to_owned()].into();

    let first = manager.private_app_user_token(9, 5, &a).await?;
    let second = manager.private_app_user_token(9, 5, &ab).await?;
    assert_ne!(first, second);
    assert_eq!(api.calls(FakeCall::CreateUserToken), 1);
    assert_eq!(api.calls(FakeCall::UpdateUserToken), 1);

    let server = api.user_token(9, 5).map(|t| t.cached_scope_groups).unwrap_or_default();
    assert!(server.is_superset(&ab));
    manager.cleanup();
    Ok(())
}

/// Token endpoint that rotates the refresh token on every call.
async fn token_server() -> anyhow::Result<(String, Arc<AtomicU32>)> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let app = Router::new().route(
        "/oauth/v1/token",
        post(move |body: String| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
                if !body.contains("grant_type=refresh_token") {
                    return (axum::http::StatusCode::BAD_REQUEST, "{}".to_owned());
                }
                let resp = serde_json::json!({
                    "access_token": format!("http-access-{n}"),
                    "refresh_token": format!("http-refresh-{n}"),
                    "expires_in": 1800,
                });
                (axum::http::StatusCode::OK, resp.to_string())
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((format!("http://{addr}"), calls))
}

#[tokio::test]
async fn oauth_over_http_dedups_and_persists() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let (origin, calls) = token_server().await?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("accounts.json");
    let file = AccountsFile { accounts: vec![oauth_account(1)], ..Default::default() };
    write_accounts(&path, &file)?;

    let store = Arc::new(JsonAccountStore::open(&path)?);
    let api = Arc::new(HttpAuthApi::new(Duration::from_secs(5)).with_origin(origin));
    let manager = Arc::new(AuthManager::with_runtime(
        store,
        api,
        Arc::new(TokioTimer),
        Arc::new(SystemClock),
    ));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move { manager.oauth_access_token(1).await }));
    }
    for handle in handles {
        assert_eq!(handle.await??, "http-access-1");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let info = persisted(&path, 1)?;
    assert_eq!(info.access_token.as_deref(), Some("http-access-1"));
    assert_eq!(info.refresh_token.as_deref(), Some("http-refresh-1"));

    manager.cleanup();
    assert_eq!(manager.armed_timers(), 0);
    Ok(())
}
