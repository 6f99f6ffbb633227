// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `devhub accounts` and `devhub account`.

use std::fmt::Write;

use devhub_auth::clock::epoch_ms;
use devhub_auth::config::AccountConfig;
use devhub_auth::{AccountId, AuthManager};

/// Table of configured accounts, one per line. The default account is
/// marked with `*`.
pub fn render(accounts: &[AccountConfig], default_account: Option<AccountId>) -> String {
    if accounts.is_empty() {
        return "No accounts configured.\n".to_owned();
    }
    let now_ms = epoch_ms();
    let mut out = String::new();
    let _ = writeln!(out, "  {:<14} {:<20} {:<18} {:<5} TOKEN", "ID", "NAME", "AUTH", "ENV");
    for account in accounts {
        let marker = if Some(account.account_id) == default_account { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} {:<14} {:<20} {:<18} {:<5} {}",
            account.account_id,
            account.name.as_deref().unwrap_or("-"),
            account.auth_type.to_string(),
            account.env.to_string(),
            token_status(account, now_ms),
        );
    }
    out
}

/// Human summary of the persisted access token.
pub fn token_status(account: &AccountConfig, now_ms: u64) -> String {
    match account.token_info().cached() {
        None => "none".to_owned(),
        Some(cached) if cached.expires_at_ms <= now_ms => "expired".to_owned(),
        Some(cached) => {
            let secs = (cached.expires_at_ms - now_ms) / 1000;
            format!("expires in {}m{:02}s", secs / 60, secs % 60)
        }
    }
}

/// Print the account identity reported by a fresh key exchange.
pub async fn identity(manager: &AuthManager, account_id: AccountId) -> anyhow::Result<()> {
    let identity = manager.account_identity(account_id).await?;
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

#[cfg(test)]
#[path = "accounts_tests.rs"]
mod tests;
