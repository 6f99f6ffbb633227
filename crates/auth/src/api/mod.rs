// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth REST endpoints consumed by the credential providers.

pub mod http;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Environment;
use crate::credential::{AccountId, AppId};
use crate::error::AuthError;

pub use http::HttpAuthApi;

/// Response from the OAuth2 refresh-token grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    /// Present when the server rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Response from a personal access key exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    #[serde(rename = "oauthAccessToken")]
    pub access_token: String,
    pub expires_at_millis: u64,
    #[serde(default)]
    pub scope_groups: Vec<String>,
    #[serde(default)]
    pub enabled_features: BTreeMap<String, u64>,
    pub hub_id: AccountId,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub parent_hub_id: Option<AccountId>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub hub_name: Option<String>,
}

impl AccessTokenResponse {
    /// Account metadata carried alongside the token.
    pub fn identity(&self) -> AccountIdentity {
        AccountIdentity {
            hub_id: self.hub_id,
            hub_name: self.hub_name.clone(),
            account_type: self.account_type.clone(),
            parent_hub_id: self.parent_hub_id,
            user_id: self.user_id,
            enabled_features: self.enabled_features.clone(),
            scope_groups: self.scope_groups.clone(),
        }
    }
}

/// What a personal access key says about the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountIdentity {
    pub hub_id: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_hub_id: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    pub enabled_features: BTreeMap<String, u64>,
    pub scope_groups: Vec<String>,
}

/// A private app user token as returned by the user-token endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateAppUserToken {
    pub user_token_key: String,
    pub user_token: String,
    pub app_id: AppId,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub cached_scope_groups: BTreeSet<String>,
    /// Unix milliseconds.
    pub expires_at: u64,
}

/// Network exchanges used by the providers.
///
/// `bearer` is the access token the request is authorised with; private app
/// calls use the account's personal-access-key token.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn exchange_oauth_token(
        &self,
        env: Environment,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, AuthError>;

    async fn exchange_personal_access_key(
        &self,
        env: Environment,
        personal_access_key: &str,
        account_id: AccountId,
    ) -> Result<AccessTokenResponse, AuthError>;

    async fn fetch_scope_groups(
        &self,
        env: Environment,
        account_id: AccountId,
        bearer: &str,
    ) -> Result<Vec<String>, AuthError>;

    /// `Ok(None)` when the app has no user token yet.
    async fn fetch_private_app_user_token(
        &self,
        env: Environment,
        account_id: AccountId,
        app_id: AppId,
        bearer: &str,
    ) -> Result<Option<PrivateAppUserToken>, AuthError>;

    async fn create_private_app_user_token(
        &self,
        env: Environment,
        account_id: AccountId,
        app_id: AppId,
        scope_groups: &BTreeSet<String>,
        bearer: &str,
    ) -> Result<PrivateAppUserToken, AuthError>;

    async fn update_private_app_user_token(
        &self,
        env: Environment,
        account_id: AccountId,
        app_id: AppId,
        user_token_key: &str,
        scope_groups: &BTreeSet<String>,
        bearer: &str,
    ) -> Result<PrivateAppUserToken, AuthError>;
}
