// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands: `token`, `account`, `accounts`.

pub mod accounts;
pub mod token;

use std::sync::Arc;

use devhub_auth::api::HttpAuthApi;
use devhub_auth::store::JsonAccountStore;
use devhub_auth::{AccountId, AuthManager};
use tracing::debug;

use crate::config::Config;

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Print an access token for an account.
    Token(token::TokenArgs),
    /// Show what an account's personal access key reports about it.
    Account {
        /// Account (hub) id.
        account_id: AccountId,
    },
    /// List configured accounts.
    Accounts,
}

/// Run the selected subcommand.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let path = config.accounts_path();
    debug!(path = %path.display(), "loading accounts");
    let store = Arc::new(JsonAccountStore::open(&path)?);

    if let Command::Accounts = config.command {
        print!("{}", accounts::render(&store.accounts(), store.default_account()));
        return Ok(());
    }

    let mut api = HttpAuthApi::new(config.http_timeout());
    if let Some(ref origin) = config.api_origin {
        api = api.with_origin(origin.clone());
    }
    let manager = AuthManager::new(store, Arc::new(api));

    let result = match config.command {
        Command::Token(ref args) => token::run(&manager, args).await,
        Command::Account { account_id } => accounts::identity(&manager, account_id).await,
        Command::Accounts => Ok(()),
    };
    manager.cleanup();
    result
}
