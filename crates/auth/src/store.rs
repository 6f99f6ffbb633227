// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable account configuration: lookup and token write-back.

use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::{AccountConfig, AccountsFile, AuthSettings, AuthType, TokenInfo};
use crate::credential::AccountId;
use crate::error::AuthError;

/// Source of account records and sink for refreshed tokens.
pub trait AccountStore: Send + Sync {
    fn account(&self, account_id: AccountId) -> Option<AccountConfig>;

    /// Write the set fields of `token` into the account's token info,
    /// leaving every other field of the record untouched.
    fn persist_token(&self, account_id: AccountId, token: &TokenInfo) -> anyhow::Result<()>;
}

/// Look up `account_id` and check that it authenticates with `expected`.
pub fn require_account(
    store: &dyn AccountStore,
    account_id: AccountId,
    expected: AuthType,
) -> Result<AccountConfig, AuthError> {
    let account = store.account(account_id).ok_or(AuthError::AccountNotFound(account_id))?;
    if account.auth_type != expected {
        return Err(AuthError::InvalidAuthType {
            account_id,
            expected,
            actual: account.auth_type,
        });
    }
    Ok(account)
}

/// Accounts file stored as JSON.
///
/// With no path the store lives in memory only and writes are no-ops on disk.
#[derive(Debug)]
pub struct JsonAccountStore {
    path: Option<PathBuf>,
    file: Mutex<AccountsFile>,
}

impl JsonAccountStore {
    /// Load `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "accounts file missing, starting empty");
                AccountsFile::default()
            }
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        Ok(Self { path: Some(path), file: Mutex::new(file) })
    }

    pub fn in_memory(file: AccountsFile) -> Self {
        Self { path: None, file: Mutex::new(file) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn accounts(&self) -> Vec<AccountConfig> {
        self.file.lock().accounts.clone()
    }

    pub fn default_account(&self) -> Option<AccountId> {
        self.file.lock().default_account
    }

    /// Insert or replace the record for `account.account_id`.
    pub fn upsert(&self, account: AccountConfig) -> anyhow::Result<()> {
        let mut file = self.file.lock();
        match file.account_mut(account.account_id) {
            Some(existing) => *existing = account,
            None => file.accounts.push(account),
        }
        self.save(&file)
    }

    fn save(&self, file: &AccountsFile) -> anyhow::Result<()> {
        match self.path {
            Some(ref path) => save(path, file),
            None => Ok(()),
        }
    }
}

impl AccountStore for JsonAccountStore {
    fn account(&self, account_id: AccountId) -> Option<AccountConfig> {
        self.file.lock().account(account_id).cloned()
    }

    fn persist_token(&self, account_id: AccountId, token: &TokenInfo) -> anyhow::Result<()> {
        let mut file = self.file.lock();
        let account = file
            .account_mut(account_id)
            .with_context(|| format!("account {account_id} not found in config"))?;
        account.auth.get_or_insert_with(AuthSettings::default).token_info.merge(token);
        self.save(&file)
    }
}

/// Write `file` to `path` atomically (write tmp + rename).
///
/// The temp name carries the PID and a counter so concurrent saves never
/// share a temp file.
pub fn save(path: &Path, file: &AccountsFile) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(file)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json).with_context(|| format!("write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
