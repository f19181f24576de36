// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injected storage interfaces for sessions and credentials.
//!
//! Production uses the Redis backend; tests and single-process runs use the
//! in-memory backend. These stores are the only state shared across
//! processes — participant rosters are deliberately process-local.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::credential::{CredentialRecord, PendingAuth};
use crate::session::Session;

/// Durable storage of [`Session`] entities keyed by share code, with
/// TTL-based expiry renewed on activity.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, code: &str) -> anyhow::Result<Option<Session>>;
    /// Insert or replace; renews the TTL.
    async fn put(&self, session: &Session) -> anyhow::Result<()>;
    async fn delete(&self, code: &str) -> anyhow::Result<()>;
    /// Renew the TTL without altering any field.
    async fn touch(&self, code: &str) -> anyhow::Result<()>;
    async fn list(&self) -> anyhow::Result<Vec<Session>>;
}

/// Durable storage of credential records, token aliases, the external-user
/// index, and the short-lived pending-authorization table.
///
/// Aliasing: a record lives under exactly one canonical token. Tokens issued
/// later for the same external user become aliases of that canonical token,
/// so `resolve` is the first step of every lookup. The user index replaces
/// the linear record scan the original system used for de-duplication.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a possibly-aliased token to its canonical form. Returns the
    /// input token unchanged when no alias exists.
    async fn resolve(&self, token: &str) -> anyhow::Result<String>;
    /// Fetch the record for a canonical token.
    async fn get(&self, canonical: &str) -> anyhow::Result<Option<CredentialRecord>>;
    /// Insert or replace the record under a canonical token; renews the TTL
    /// and maintains the external-user index.
    async fn put(&self, canonical: &str, record: &CredentialRecord) -> anyhow::Result<()>;
    /// Remove the record and its user-index entry.
    async fn delete(&self, canonical: &str) -> anyhow::Result<()>;
    /// Register `token` as an alias of `canonical`.
    async fn alias(&self, token: &str, canonical: &str) -> anyhow::Result<()>;
    /// Look up the canonical token for an external user, if any.
    async fn find_by_user(&self, external_user_id: &str) -> anyhow::Result<Option<String>>;

    async fn put_pending(&self, state: &str, pending: &PendingAuth) -> anyhow::Result<()>;
    /// Consume a pending authorization; single use.
    async fn take_pending(&self, state: &str) -> anyhow::Result<Option<PendingAuth>>;
    /// Whether any pending authorization references `session_code`.
    async fn pending_for_session(&self, session_code: &str) -> anyhow::Result<bool>;
}
