// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `devhub token`: print an access token on stdout.

use std::collections::BTreeSet;

use devhub_auth::{AccountId, AppId, AuthManager};

/// CLI arguments for `devhub token`.
#[derive(Debug, clap::Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum TokenCommand {
    /// Access token from the account's OAuth2 refresh token.
    Oauth {
        /// Account (hub) id.
        account_id: AccountId,
    },
    /// Access token from the account's personal access key.
    Pak {
        /// Account (hub) id.
        account_id: AccountId,
        /// Exchange the key even if the cached token is still valid.
        #[arg(long)]
        force: bool,
    },
    /// User token for a private app.
    App {
        /// Account (hub) id.
        account_id: AccountId,
        /// Private app id.
        app_id: AppId,
        /// Scope group the token must grant (repeatable).
        #[arg(long = "scope-group")]
        scope_groups: Vec<String>,
    },
}

pub async fn run(manager: &AuthManager, args: &TokenArgs) -> anyhow::Result<()> {
    let token = match args.command {
        TokenCommand::Oauth { account_id } => manager.oauth_access_token(account_id).await?,
        TokenCommand::Pak { account_id, force } => {
            manager.personal_access_key_access_token(account_id, force).await?
        }
        TokenCommand::App { account_id, app_id, ref scope_groups } => {
            let required: BTreeSet<String> = scope_groups.iter().cloned().collect();
            manager
                .private_app_user_token(account_id, app_id, &required)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "account {account_id} cannot issue private app user tokens \
                         (personal access key lacks temporary_token scopes)"
                    )
                })?
        }
    };
    println!("{token}");
    Ok(())
}
