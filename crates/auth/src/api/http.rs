// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! reqwest-backed [`AuthApi`].

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{AccessTokenResponse, AuthApi, OAuthTokenResponse, PrivateAppUserToken};
use crate::config::Environment;
use crate::credential::{AccountId, AppId};
use crate::error::AuthError;

/// Default request timeout for auth calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to the platform's auth endpoints over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    http: reqwest::Client,
    /// Replaces the per-environment origin when set.
    origin: Option<String>,
}

impl Default for HttpAuthApi {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpAuthApi {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { http, origin: None }
    }

    /// Send every request to `origin` regardless of account environment.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into().trim_end_matches('/').to_owned());
        self
    }

    fn url(&self, env: Environment, path: &str) -> String {
        let origin = self.origin.as_deref().unwrap_or(env.api_origin());
        format!("{origin}{path}")
    }

    fn user_token_url(&self, env: Environment, account_id: AccountId, app_id: AppId) -> String {
        self.url(env, &format!("/localdevauth/v1/app/{app_id}/user-token?portalId={account_id}"))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Pull a human-readable message out of an error response body.
fn error_message(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = err.message {
            return message;
        }
        match (err.error, err.error_description) {
            (Some(error), Some(description)) => return format!("{error}: {description}"),
            (None, Some(description)) => return description,
            (Some(error), None) => return error,
            (None, None) => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn transport(e: reqwest::Error) -> AuthError {
    AuthError::Exchange { status: None, message: e.to_string() }
}

/// Read the body of `resp`, mapping non-2xx statuses to [`AuthError::Exchange`].
async fn read_body(resp: reqwest::Response) -> Result<String, AuthError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(AuthError::Exchange {
            status: Some(status.as_u16()),
            message: error_message(&body),
        });
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, AuthError> {
    serde_json::from_str(body).map_err(|e| AuthError::Decode(e.to_string()))
}

async fn decode_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AuthError> {
    let body = read_body(resp).await?;
    decode(&body)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeGroupsResponse {
    #[serde(default)]
    scope_groups: Vec<String>,
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn exchange_oauth_token(
        &self,
        env: Environment,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, AuthError> {
        let url = self.url(env, "/oauth/v1/token");
        debug!(%url, "exchanging oauth refresh token");
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(transport)?;
        decode_response(resp).await
    }

    async fn exchange_personal_access_key(
        &self,
        env: Environment,
        personal_access_key: &str,
        account_id: AccountId,
    ) -> Result<AccessTokenResponse, AuthError> {
        let url = self.url(env, &format!("/localdevauth/v1/auth/refresh?portalId={account_id}"));
        debug!(%url, "exchanging personal access key");
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "encodedOAuthRefreshToken": personal_access_key }))
            .send()
            .await
            .map_err(transport)?;
        decode_response(resp).await
    }

    async fn fetch_scope_groups(
        &self,
        env: Environment,
        account_id: AccountId,
        bearer: &str,
    ) -> Result<Vec<String>, AuthError> {
        let url =
            self.url(env, &format!("/localdevauth/v1/auth/scope-groups?portalId={account_id}"));
        let resp = self.http.get(&url).bearer_auth(bearer).send().await.map_err(transport)?;
        let body: ScopeGroupsResponse = decode_response(resp).await?;
        Ok(body.scope_groups)
    }

    async fn fetch_private_app_user_token(
        &self,
        env: Environment,
        account_id: AccountId,
        app_id: AppId,
        bearer: &str,
    ) -> Result<Option<PrivateAppUserToken>, AuthError> {
        let url = self.user_token_url(env, account_id, app_id);
        let resp = self.http.get(&url).bearer_auth(bearer).send().await.map_err(transport)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(account = account_id, app_id, "no private app user token yet");
            return Ok(None);
        }
        decode_response(resp).await.map(Some)
    }

    async fn create_private_app_user_token(
        &self,
        env: Environment,
        account_id: AccountId,
        app_id: AppId,
        scope_groups: &BTreeSet<String>,
        bearer: &str,
    ) -> Result<PrivateAppUserToken, AuthError> {
        let url = self.user_token_url(env, account_id, app_id);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(bearer)
            .json(&serde_json::json!({ "scopeGroups": scope_groups }))
            .send()
            .await
            .map_err(transport)?;
        decode_response(resp).await
    }

    async fn update_private_app_user_token(
        &self,
        env: Environment,
        account_id: AccountId,
        app_id: AppId,
        user_token_key: &str,
        scope_groups: &BTreeSet<String>,
        bearer: &str,
    ) -> Result<PrivateAppUserToken, AuthError> {
        let url = self.url(
            env,
            &format!(
                "/localdevauth/v1/app/{app_id}/user-token/{user_token_key}?portalId={account_id}"
            ),
        );
        let resp = self
            .http
            .put(&url)
            .bearer_auth(bearer)
            .json(&serde_json::json!({ "scopeGroups": scope_groups }))
            .send()
            .await
            .map_err(transport)?;
        decode_response(resp).await
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
