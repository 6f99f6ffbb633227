// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use super::*;
use crate::test_support::ensure_crypto_provider;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    uri: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

/// Serve `responses` in order (repeating the last) and record every request.
async fn mock_server(responses: Vec<(u16, String)>) -> (SocketAddr, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    let responses = Arc::new(responses);

    let app = Router::new().fallback(move |req: Request| {
        let log = Arc::clone(&log_clone);
        let resps = Arc::clone(&responses);
        async move {
            let method = req.method().to_string();
            let uri = req.uri().to_string();
            let (authorization, content_type) = {
                let header = |name: &str| {
                    req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
                };
                (header("authorization"), header("content-type"))
            };
            let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap_or_default();
            let body = String::from_utf8_lossy(&bytes).into_owned();

            let idx = {
                let mut log = log.lock();
                log.push(Recorded { method, uri, authorization, content_type, body });
                log.len() - 1
            };
            let (status, body) = resps
                .get(idx)
                .or(resps.last())
                .cloned()
                .unwrap_or((500, "{}".to_owned()));
            (StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), body)
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (addr, log)
}

fn api(addr: SocketAddr) -> HttpAuthApi {
    ensure_crypto_provider();
    HttpAuthApi::new(Duration::from_secs(5)).with_origin(format!("http://{addr}/"))
}

fn recorded(log: &Log, idx: usize) -> Recorded {
    log.lock()[idx].clone()
}

#[tokio::test]
async fn oauth_exchange_posts_form() -> anyhow::Result<()> {
    let body = serde_json::json!({
        "access_token": "at-1",
        "refresh_token": "rt-2",
        "expires_in": 1800,
    });
    let (addr, log) = mock_server(vec![(200, body.to_string())]).await;

    let resp = api(addr).exchange_oauth_token(Environment::Prod, "cid", "secret", "rt-1").await?;
    assert_eq!(resp.access_token, "at-1");
    assert_eq!(resp.refresh_token.as_deref(), Some("rt-2"));
    assert_eq!(resp.expires_in, 1800);

    let req = recorded(&log, 0);
    assert_eq!(req.method, "POST");
    assert_eq!(req.uri, "/oauth/v1/token");
    assert_eq!(req.content_type.as_deref(), Some("application/x-www-form-urlencoded"));
    assert!(req.body.contains("grant_type=refresh_token"));
    assert!(req.body.contains("client_id=cid"));
    assert!(req.body.contains("client_secret=secret"));
    assert!(req.body.contains("refresh_token=rt-1"));
    Ok(())
}

#[tokio::test]
async fn oauth_exchange_surfaces_error_description() {
    let body = r#"{"error":"invalid_grant","error_description":"refresh token revoked"}"#;
    let (addr, _log) = mock_server(vec![(400, body.to_owned())]).await;

    let err = api(addr)
        .exchange_oauth_token(Environment::Prod, "cid", "secret", "rt")
        .await
        .expect_err("should fail");
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("refresh token revoked"), "{err}");
}

#[tokio::test]
async fn personal_access_key_exchange_posts_json() -> anyhow::Result<()> {
    let body = serde_json::json!({
        "oauthAccessToken": "pak-at",
        "expiresAtMillis": 1_700_000_000_000u64,
        "scopeGroups": ["temporary_token.read"],
        "enabledFeatures": { "feature-a": 1 },
        "hubId": 42,
        "accountType": "DEVELOPER_TEST",
        "parentHubId": 7,
    });
    let (addr, log) = mock_server(vec![(200, body.to_string())]).await;

    let resp = api(addr).exchange_personal_access_key(Environment::Qa, "my-pak", 42).await?;
    assert_eq!(resp.access_token, "pak-at");
    assert_eq!(resp.expires_at_millis, 1_700_000_000_000);
    assert_eq!(resp.identity().parent_hub_id, Some(7));
    assert_eq!(resp.enabled_features.get("feature-a"), Some(&1));

    let req = recorded(&log, 0);
    assert_eq!(req.uri, "/localdevauth/v1/auth/refresh?portalId=42");
    let sent: serde_json::Value = serde_json::from_str(&req.body)?;
    assert_eq!(sent["encodedOAuthRefreshToken"], "my-pak");
    Ok(())
}

#[tokio::test]
async fn message_field_wins_over_raw_body() {
    let body = r#"{"status":"error","message":"personal access key is invalid"}"#;
    let (addr, _log) = mock_server(vec![(401, body.to_owned())]).await;

    crate::assert_err_contains!(
        api(addr).exchange_personal_access_key(Environment::Prod, "bad", 1).await,
        "personal access key is invalid"
    );
}

#[tokio::test]
async fn malformed_success_body_is_decode_error() {
    let (addr, _log) = mock_server(vec![(200, "not json".to_owned())]).await;

    let err = api(addr)
        .exchange_oauth_token(Environment::Prod, "cid", "secret", "rt")
        .await
        .expect_err("should fail");
    assert!(matches!(err, AuthError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn scope_groups_use_bearer() -> anyhow::Result<()> {
    let body = r#"{"scopeGroups":["temporary_token.read","temporary_token.write"]}"#;
    let (addr, log) = mock_server(vec![(200, body.to_owned())]).await;

    let groups = api(addr).fetch_scope_groups(Environment::Prod, 9, "pak-at").await?;
    assert_eq!(groups, vec!["temporary_token.read", "temporary_token.write"]);

    let req = recorded(&log, 0);
    assert_eq!(req.method, "GET");
    assert_eq!(req.uri, "/localdevauth/v1/auth/scope-groups?portalId=9");
    assert_eq!(req.authorization.as_deref(), Some("Bearer pak-at"));
    Ok(())
}

#[tokio::test]
async fn missing_user_token_is_none() -> anyhow::Result<()> {
    let (addr, log) = mock_server(vec![(404, r#"{"message":"not found"}"#.to_owned())]).await;

    let token = api(addr).fetch_private_app_user_token(Environment::Prod, 9, 77, "pak-at").await?;
    assert!(token.is_none());
    assert_eq!(recorded(&log, 0).uri, "/localdevauth/v1/app/77/user-token?portalId=9");
    Ok(())
}

#[tokio::test]
async fn user_token_create_and_update() -> anyhow::Result<()> {
    let token = |scopes: &[&str]| {
        serde_json::json!({
            "userTokenKey": "utk-1",
            "userToken": "user-token",
            "appId": 77,
            "cachedScopeGroups": scopes,
            "expiresAt": 1_700_000_000_000u64,
        })
        .to_string()
    };
    let (addr, log) =
        mock_server(vec![(200, token(&["a"])), (200, token(&["a", "b"]))]).await;
    let api = api(addr);

    let created = api
        .create_private_app_user_token(Environment::Prod, 9, 77, &["a".to_owned()].into(), "pak")
        .await?;
    assert_eq!(created.user_token_key, "utk-1");

    let wanted: BTreeSet<String> = ["a".to_owned(), "b".to_owned()].into();
    let updated = api
        .update_private_app_user_token(Environment::Prod, 9, 77, "utk-1", &wanted, "pak")
        .await?;
    assert_eq!(updated.cached_scope_groups, wanted);

    let create = recorded(&log, 0);
    assert_eq!(create.method, "POST");
    assert_eq!(create.uri, "/localdevauth/v1/app/77/user-token?portalId=9");
    let sent: serde_json::Value = serde_json::from_str(&create.body)?;
    assert_eq!(sent["scopeGroups"], serde_json::json!(["a"]));

    let update = recorded(&log, 1);
    assert_eq!(update.method, "PUT");
    assert_eq!(update.uri, "/localdevauth/v1/app/77/user-token/utk-1?portalId=9");
    let sent: serde_json::Value = serde_json::from_str(&update.body)?;
    assert_eq!(sent["scopeGroups"], serde_json::json!(["a", "b"]));
    Ok(())
}

#[tokio::test]
async fn unreachable_server_has_no_status() {
    // Bind then drop so the port is closed.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let err = api(addr)
        .exchange_oauth_token(Environment::Prod, "cid", "secret", "rt")
        .await
        .expect_err("should fail");
    assert!(matches!(err, AuthError::Exchange { status: None, .. }), "{err:?}");
}

#[yare::parameterized(
    message     = { r#"{"message":"bad key"}"#, "bad key" },
    oauth_pair  = {
        r#"{"error":"invalid_grant","error_description":"expired"}"#,
        "invalid_grant: expired"
    },
    error_only  = { r#"{"error":"server_error"}"#, "server_error" },
    raw         = { "gateway timeout", "gateway timeout" },
    empty       = { "  ", "empty response body" },
)]
fn error_message_extraction(body: &str, expected: &str) {
    assert_eq!(error_message(body), expected);
}

#[test]
fn origin_defaults_per_environment() {
    ensure_crypto_provider();
    let api = HttpAuthApi::default();
    assert_eq!(api.url(Environment::Qa, "/x"), "https://api.hubapiqa.com/x");
    assert_eq!(api.url(Environment::Prod, "/x"), "https://api.hubapi.com/x");
}
