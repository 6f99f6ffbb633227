// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::command::Command;

/// File name of the accounts file inside the config directory.
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// Developer CLI for platform accounts and their access tokens.
#[derive(Debug, Parser)]
#[command(name = "devhub", version, about)]
pub struct Config {
    /// Path to the accounts file.
    #[arg(long, env = "DEVHUB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// API origin used for every account instead of its environment's.
    #[arg(long, env = "DEVHUB_API_ORIGIN", global = true)]
    pub api_origin: Option<String>,

    /// Timeout for auth requests, in seconds.
    #[arg(long, env = "DEVHUB_HTTP_TIMEOUT_SECS", default_value = "30", global = true)]
    pub http_timeout_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "DEVHUB_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DEVHUB_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Validate flag combinations.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other} (expected json or text)"),
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("--http-timeout-secs must be greater than zero");
        }
        if let Some(ref origin) = self.api_origin {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                anyhow::bail!("--api-origin must be an http(s) URL: {origin}");
            }
        }
        Ok(())
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| config_dir().join(ACCOUNTS_FILE))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Directory holding devhub configuration.
///
/// `DEVHUB_CONFIG_DIR`, then `$XDG_CONFIG_HOME/devhub`, then
/// `$HOME/.config/devhub`, then `.devhub`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DEVHUB_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("devhub");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config/devhub");
    }
    PathBuf::from(".devhub")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
