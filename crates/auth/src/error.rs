// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::config::AuthType;
use crate::credential::{AccountId, AppId};

/// Errors surfaced by the credential providers.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// joined the same in-flight exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("account {0} not found in config")]
    AccountNotFound(AccountId),

    #[error("account {account_id} uses {actual} auth, expected {expected}")]
    InvalidAuthType { account_id: AccountId, expected: AuthType, actual: AuthType },

    #[error("account {0} has no OAuth2 refresh token configured")]
    MissingRefreshToken(AccountId),

    #[error("account {0} has no OAuth2 client id or client secret configured")]
    MissingClientCredentials(AccountId),

    #[error("account {0} has no personal access key configured")]
    MissingPersonalAccessKey(AccountId),

    /// The auth endpoint rejected the exchange or could not be reached.
    /// `status` is `None` for transport-level failures.
    #[error("{}", exchange_message(*status, message))]
    Exchange { status: Option<u16>, message: String },

    #[error("unexpected response from auth endpoint: {0}")]
    Decode(String),

    #[error("token for app {app_id} lacks scope groups: {}", missing.join(", "))]
    InsufficientScopes { app_id: AppId, missing: Vec<String> },

    #[error("private app user token for app {app_id} on account {account_id}: {message}")]
    PrivateApp { account_id: AccountId, app_id: AppId, message: String },

    #[error("refresh task failed: {0}")]
    TaskFailed(String),
}

fn exchange_message(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("token exchange failed (HTTP {code}): {message}"),
        None => format!("token exchange failed: {message}"),
    }
}

impl AuthError {
    /// Configuration problems are detected before any network call.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::InvalidAuthType { .. }
                | Self::MissingRefreshToken(_)
                | Self::MissingClientCredentials(_)
                | Self::MissingPersonalAccessKey(_)
        )
    }

    /// HTTP status reported by the auth endpoint, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Exchange { status, .. } => *status,
            _ => None,
        }
    }
}
