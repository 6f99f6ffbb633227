// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account records as stored in the devhub accounts file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::credential::{AccountId, CachedCredential};

/// Platform environment an account lives in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Prod,
    Qa,
}

impl Environment {
    /// Base URL of the public API for this environment.
    pub fn api_origin(self) -> &'static str {
        match self {
            Self::Prod => "https://api.hubapi.com",
            Self::Qa => "https://api.hubapiqa.com",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prod => f.write_str("prod"),
            Self::Qa => f.write_str("qa"),
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Ok(Self::Prod),
            "qa" => Ok(Self::Qa),
            other => anyhow::bail!("invalid environment: {other}"),
        }
    }
}

/// How an account authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    #[serde(rename = "personalaccesskey")]
    PersonalAccessKey,
    #[serde(rename = "oauth2")]
    OAuth2,
    #[serde(rename = "apikey")]
    ApiKey,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PersonalAccessKey => f.write_str("personalaccesskey"),
            Self::OAuth2 => f.write_str("oauth2"),
            Self::ApiKey => f.write_str("apikey"),
        }
    }
}

/// Persisted short-lived token state for an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl TokenInfo {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.expires_at.is_none()
    }

    /// The persisted access token as a cache entry, if one is stored.
    pub fn cached(&self) -> Option<CachedCredential> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        Some(
            CachedCredential::new(token, self.expires_at.unwrap_or(0))
                .with_refresh_token(self.refresh_token.clone()),
        )
    }

    /// Overlay the fields set in `update`, keeping the rest.
    pub fn merge(&mut self, update: &TokenInfo) {
        if let Some(ref token) = update.access_token {
            self.access_token = Some(token.clone());
        }
        if let Some(ref token) = update.refresh_token {
            self.refresh_token = Some(token.clone());
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = Some(expires_at);
        }
    }
}

/// OAuth2 client settings plus persisted token state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "TokenInfo::is_empty")]
    pub token_info: TokenInfo,
}

/// A single configured account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub auth_type: AuthType,
    #[serde(default)]
    pub env: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSettings>,
    /// Fields this crate does not interpret, kept intact across writes.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AccountConfig {
    pub fn new(account_id: AccountId, auth_type: AuthType) -> Self {
        Self {
            account_id,
            name: None,
            auth_type,
            env: Environment::Prod,
            personal_access_key: None,
            auth: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn token_info(&self) -> TokenInfo {
        self.auth.as_ref().map(|a| a.token_info.clone()).unwrap_or_default()
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.account_id.to_string())
    }
}

/// Top-level layout of the accounts file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_account: Option<AccountId>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AccountsFile {
    pub fn account(&self, account_id: AccountId) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    pub fn account_mut(&mut self, account_id: AccountId) -> Option<&mut AccountConfig> {
        self.accounts.iter_mut().find(|a| a.account_id == account_id)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
