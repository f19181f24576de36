// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store backend for tests and single-process deployments.
//!
//! Entries carry a deadline and are expired lazily on access; there are no
//! deletion timers, matching the durable backend's TTL semantics.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::credential::{CredentialRecord, PendingAuth};
use crate::session::Session;
use crate::store::{CredentialStore, SessionStore};

struct Expiring<T> {
    value: T,
    deadline: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self { value, deadline: Instant::now() + ttl }
    }

    fn live(&self) -> bool {
        Instant::now() < self.deadline
    }
}

/// In-memory implementation of both store traits.
pub struct MemoryStore {
    session_ttl: Duration,
    credential_ttl: Duration,
    pending_ttl: Duration,
    sessions: RwLock<HashMap<String, Expiring<Session>>>,
    credentials: RwLock<HashMap<String, Expiring<CredentialRecord>>>,
    aliases: RwLock<HashMap<String, String>>,
    user_index: RwLock<HashMap<String, String>>,
    pending: RwLock<HashMap<String, Expiring<PendingAuth>>>,
}

impl MemoryStore {
    pub fn new(session_ttl: Duration, credential_ttl: Duration, pending_ttl: Duration) -> Self {
        Self {
            session_ttl,
            credential_ttl,
            pending_ttl,
            sessions: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            user_index: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, code: &str) -> anyhow::Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(code).filter(|e| e.live()).map(|e| e.value.clone()))
    }

    async fn put(&self, session: &Session) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.code.clone(), Expiring::new(session.clone(), self.session_ttl));
        Ok(())
    }

    async fn delete(&self, code: &str) -> anyhow::Result<()> {
        self.sessions.write().await.remove(code);
        Ok(())
    }

    async fn touch(&self, code: &str) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(code) {
            if entry.live() {
                entry.deadline = Instant::now() + self.session_ttl;
            }
        }
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().filter(|e| e.live()).map(|e| e.value.clone()).collect())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn resolve(&self, token: &str) -> anyhow::Result<String> {
        let aliases = self.aliases.read().await;
        Ok(aliases.get(token).cloned().unwrap_or_else(|| token.to_owned()))
    }

    async fn get(&self, canonical: &str) -> anyhow::Result<Option<CredentialRecord>> {
        let credentials = self.credentials.read().await;
        Ok(credentials.get(canonical).filter(|e| e.live()).map(|e| e.value.clone()))
    }

    async fn put(&self, canonical: &str, record: &CredentialRecord) -> anyhow::Result<()> {
        self.credentials
            .write()
            .await
            .insert(canonical.to_owned(), Expiring::new(record.clone(), self.credential_ttl));
        self.user_index
            .write()
            .await
            .insert(record.external_user_id.clone(), canonical.to_owned());
        Ok(())
    }

    async fn delete(&self, canonical: &str) -> anyhow::Result<()> {
        let removed = self.credentials.write().await.remove(canonical);
        if let Some(entry) = removed {
            self.user_index.write().await.remove(&entry.value.external_user_id);
        }
        Ok(())
    }

    async fn alias(&self, token: &str, canonical: &str) -> anyhow::Result<()> {
        self.aliases.write().await.insert(token.to_owned(), canonical.to_owned());
        Ok(())
    }

    async fn find_by_user(&self, external_user_id: &str) -> anyhow::Result<Option<String>> {
        let index = self.user_index.read().await;
        let Some(canonical) = index.get(external_user_id) else {
            return Ok(None);
        };
        // The index may outlive an expired record; report only live ones.
        let credentials = self.credentials.read().await;
        if credentials.get(canonical).is_some_and(|e| e.live()) {
            Ok(Some(canonical.clone()))
        } else {
            Ok(None)
        }
    }

    async fn put_pending(&self, state: &str, pending: &PendingAuth) -> anyhow::Result<()> {
        self.pending
            .write()
            .await
            .insert(state.to_owned(), Expiring::new(pending.clone(), self.pending_ttl));
        Ok(())
    }

    async fn take_pending(&self, state: &str) -> anyhow::Result<Option<PendingAuth>> {
        let mut pending = self.pending.write().await;
        Ok(pending.remove(state).filter(|e| e.live()).map(|e| e.value))
    }

    async fn pending_for_session(&self, session_code: &str) -> anyhow::Result<bool> {
        let pending = self.pending.read().await;
        Ok(pending.values().any(|e| e.live() && e.value.session_code == session_code))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
