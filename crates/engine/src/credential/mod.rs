// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle: OAuth flows, token refresh, cross-device reuse.
//!
//! One [`CredentialRecord`] represents one authenticated host identity.
//! Browsers hold an opaque `credential_token`; several tokens may alias the
//! same record when the engine discovers they belong to the same external
//! user, so all of that person's devices converge on one record.

pub mod broker;
pub mod oauth;
pub mod pkce;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Refresh the access token proactively once it is within this many seconds
/// of expiry.
pub const REFRESH_WINDOW_SECS: u64 = 300;

/// Durable state for one authenticated host identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of `access_token` as epoch seconds.
    pub expires_at: u64,
    #[serde(default)]
    pub country_code: String,
    pub external_user_id: String,
    #[serde(default)]
    pub display_name: String,
}

/// In-flight OAuth authorization code + PKCE flow, keyed by the `state`
/// nonce. Single use; expires after the configured pending-auth TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuth {
    pub code_verifier: String,
    pub session_code: String,
    pub credential_token: String,
}

/// A usable access token plus the identity details callers need.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub token: String,
    pub country_code: String,
    pub user_id: String,
}

/// Why an access token could not be produced.
///
/// `NoCredential` and `Expired` are deliberately distinct: the first means
/// "prompt login", the second means "the refresh token is dead — notify
/// every session using this credential that re-authentication is required".
#[derive(Debug)]
pub enum TokenError {
    NoCredential,
    Expired,
    /// Transient failure (network, upstream 5xx); the stored record is
    /// untouched and the caller may retry.
    Unavailable(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredential => f.write_str("no credential on file"),
            Self::Expired => f.write_str("credential expired, re-authentication required"),
            Self::Unavailable(msg) => write!(f, "token service unavailable: {msg}"),
        }
    }
}

impl std::error::Error for TokenError {}
