// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed store. Sessions, credentials, aliases, the user index and
//! pending authorizations are JSON values under prefixed keys, each with a
//! native TTL. Expiry is entirely Redis's job; no process timers.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::credential::{CredentialRecord, PendingAuth};
use crate::session::Session;
use crate::store::{CredentialStore, SessionStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
    session_ttl: u64,
    credential_ttl: u64,
    pending_ttl: u64,
}

fn session_key(code: &str) -> String {
    format!("session:{code}")
}

fn cred_key(canonical: &str) -> String {
    format!("cred:{canonical}")
}

fn alias_key(token: &str) -> String {
    format!("cred_alias:{token}")
}

fn user_key(external_user_id: &str) -> String {
    format!("cred_user:{external_user_id}")
}

fn pending_key(state: &str) -> String {
    format!("pending:{state}")
}

/// Decode a stored JSON value. A corrupt value reads as absent — the
/// requester sees "not found", not a store outage.
fn decode<T: serde::de::DeserializeOwned>(kind: &str, json: &str) -> Option<T> {
    match serde_json::from_str(json) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(kind, error = %e, "skipping undecodable store entry");
            None
        }
    }
}

impl RedisStore {
    pub async fn connect(
        redis_url: &str,
        session_ttl: Duration,
        credential_ttl: Duration,
        pending_ttl: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)?;
        let mut last_err = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client.clone()))
                .await
            {
                Ok(Ok(redis)) => {
                    return Ok(Self {
                        redis,
                        session_ttl: session_ttl.as_secs(),
                        credential_ttl: credential_ttl.as_secs(),
                        pending_ttl: pending_ttl.as_secs(),
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(%attempt, error = %e, "redis connection failed");
                    last_err = Some(anyhow::Error::from(e));
                }
                Err(_) => {
                    tracing::warn!(%attempt, "redis connection timed out");
                    last_err = Some(anyhow::anyhow!("redis connection timed out"));
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("redis unreachable")))
    }

    async fn scan_keys(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.redis.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100u32)
                .query_async(&mut conn)
                .await?;
            cursor = next_cursor;
            keys.extend(batch);
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn get(&self, code: &str) -> anyhow::Result<Option<Session>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(session_key(code)).await?;
        Ok(value.and_then(|json| decode("session", &json)))
    }

    async fn put(&self, session: &Session) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        let value = serde_json::to_string(session)?;
        conn.set_ex::<_, _, ()>(session_key(&session.code), value, self.session_ttl)
            .await?;
        Ok(())
    }

    async fn delete(&self, code: &str) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(session_key(code)).await?;
        Ok(())
    }

    async fn touch(&self, code: &str) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        conn.expire::<_, ()>(session_key(code), self.session_ttl as i64)
            .await?;
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<Session>> {
        let keys = self.scan_keys("session:*").await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        let values: Vec<Option<String>> =
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        let sessions = values
            .into_iter()
            .flatten()
            .filter_map(|json| decode::<Session>("session", &json))
            .collect();
        Ok(sessions)
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    async fn resolve(&self, token: &str) -> anyhow::Result<String> {
        let mut conn = self.redis.clone();
        let canonical: Option<String> = conn.get(alias_key(token)).await?;
        Ok(canonical.unwrap_or_else(|| token.to_owned()))
    }

    async fn get(&self, canonical: &str) -> anyhow::Result<Option<CredentialRecord>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(cred_key(canonical)).await?;
        Ok(value.and_then(|json| decode("credential", &json)))
    }

    async fn put(&self, canonical: &str, record: &CredentialRecord) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        let value = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(cred_key(canonical), value, self.credential_ttl)
            .await?;
        conn.set_ex::<_, _, ()>(
            user_key(&record.external_user_id),
            canonical.to_owned(),
            self.credential_ttl,
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, canonical: &str) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        let record = CredentialStore::get(self, canonical).await?;
        conn.del::<_, ()>(cred_key(canonical)).await?;
        if let Some(record) = record {
            conn.del::<_, ()>(user_key(&record.external_user_id)).await?;
        }
        Ok(())
    }

    async fn alias(&self, token: &str, canonical: &str) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(alias_key(token), canonical.to_owned(), self.credential_ttl)
            .await?;
        Ok(())
    }

    async fn find_by_user(&self, external_user_id: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.redis.clone();
        let canonical: Option<String> = conn.get(user_key(external_user_id)).await?;
        let Some(canonical) = canonical else {
            return Ok(None);
        };
        // The index entry may outlive the record; report only live ones.
        let exists: bool = conn.exists(cred_key(&canonical)).await?;
        Ok(exists.then_some(canonical))
    }

    async fn put_pending(&self, state: &str, pending: &PendingAuth) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        let value = serde_json::to_string(pending)?;
        conn.set_ex::<_, _, ()>(pending_key(state), value, self.pending_ttl)
            .await?;
        Ok(())
    }

    async fn take_pending(&self, state: &str) -> anyhow::Result<Option<PendingAuth>> {
        let mut conn = self.redis.clone();
        let key = pending_key(state);
        let value: Option<String> = conn.get(&key).await?;
        match value {
            Some(json) => {
                conn.del::<_, ()>(&key).await?;
                Ok(decode("pending_auth", &json))
            }
            None => Ok(None),
        }
    }

    async fn pending_for_session(&self, session_code: &str) -> anyhow::Result<bool> {
        let keys = self.scan_keys("pending:*").await?;
        if keys.is_empty() {
            return Ok(false);
        }
        let mut conn = self.redis.clone();
        let values: Vec<Option<String>> =
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        for json in values.into_iter().flatten() {
            if let Some(pending) = decode::<PendingAuth>("pending_auth", &json) {
                if pending.session_code == session_code {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;
