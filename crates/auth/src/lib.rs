// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-lived credential management for the devhub CLI.
//!
//! Three providers hand out bearer tokens for configured accounts:
//! OAuth2 refresh-token exchange ([`oauth`]), personal-access-key exchange
//! ([`pak`]) and private-app user tokens ([`private_app`]). Each one caches
//! its credential, collapses concurrent refreshes into a single network call,
//! proactively refreshes before expiry and writes refreshed tokens back to the
//! account store.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod credential;
pub mod dedup;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod oauth;
pub mod pak;
pub mod private_app;
pub mod scheduler;
pub mod store;
pub mod test_support;
pub mod timer;

pub use credential::{AccountId, AppId, CachedCredential, SAFETY_WINDOW};
pub use error::AuthError;
pub use manager::AuthManager;
