// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token broker: hands out fresh access tokens, refreshing transparently.
//!
//! Refreshes are single-flight per credential. Concurrent callers wanting a
//! token for the same record serialize on a per-credential lock, and whoever
//! loses the race re-reads the store and finds an already-fresh token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::credential::{
    oauth, pkce, AccessContext, CredentialRecord, PendingAuth, TokenError, REFRESH_WINDOW_SECS,
};
use crate::state::epoch_secs;
use crate::store::CredentialStore;

/// Result of starting a login flow.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoginStart {
    /// Full authorization URL the browser should be sent to.
    pub auth_url: String,
    /// Opaque token the browser keeps; becomes valid once the flow completes.
    pub credential_token: String,
    pub state: String,
}

/// Result of completing a login flow.
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub session_code: String,
    pub credential_token: String,
}

/// Credential status as reported to the browser.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CredentialStatus {
    pub display_name: String,
    pub external_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
}

pub struct TokenBroker {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    auth_url: String,
    token_url: String,
    profile_url: String,
    client_id: String,
    redirect_uri: String,
    scopes: String,
    /// Per-credential refresh locks, keyed by canonical token.
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenBroker {
    pub fn new(config: &EngineConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            profile_url: config.profile_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Produce a usable access token for `credential_token`, refreshing it
    /// against the authorization server when it is within the refresh window.
    pub async fn access_token(&self, credential_token: &str) -> Result<AccessContext, TokenError> {
        let canonical = self
            .store
            .resolve(credential_token)
            .await
            .map_err(|e| TokenError::Unavailable(e.to_string()))?;

        let record = self.load(&canonical).await?;
        if !needs_refresh(&record) {
            return Ok(context(&record));
        }

        let lock = self.refresh_lock(&canonical).await;
        let _guard = lock.lock().await;

        // A concurrent caller may have refreshed while we waited.
        let record = self.load(&canonical).await?;
        if !needs_refresh(&record) {
            return Ok(context(&record));
        }

        let outcome = self.refresh(&canonical, record).await;
        drop(_guard);
        self.prune_lock(&canonical, &lock).await;
        outcome
    }

    async fn refresh(
        &self,
        canonical: &str,
        mut record: CredentialRecord,
    ) -> Result<AccessContext, TokenError> {
        match oauth::refresh_token(&self.http, &self.token_url, &self.client_id, &record.refresh_token)
            .await
        {
            Ok(token) => {
                record.access_token = token.access_token;
                if let Some(rt) = token.refresh_token {
                    record.refresh_token = rt;
                }
                record.expires_at = epoch_secs() + token.expires_in;
                self.store
                    .put(canonical, &record)
                    .await
                    .map_err(|e| TokenError::Unavailable(e.to_string()))?;
                tracing::info!(user = %record.external_user_id, "access token refreshed");
                Ok(context(&record))
            }
            Err(oauth::RefreshError::Rejected(msg)) => {
                tracing::warn!(user = %record.external_user_id, error = %msg, "refresh token rejected, removing credential");
                if let Err(e) = self.store.delete(canonical).await {
                    tracing::warn!(error = %e, "failed to remove dead credential");
                }
                Err(TokenError::Expired)
            }
            Err(oauth::RefreshError::Transient(msg)) => {
                tracing::warn!(user = %record.external_user_id, error = %msg, "token refresh failed transiently");
                Err(TokenError::Unavailable(msg))
            }
        }
    }

    async fn load(&self, canonical: &str) -> Result<CredentialRecord, TokenError> {
        self.store
            .get(canonical)
            .await
            .map_err(|e| TokenError::Unavailable(e.to_string()))?
            .ok_or(TokenError::NoCredential)
    }

    async fn refresh_lock(&self, canonical: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        Arc::clone(locks.entry(canonical.to_owned()).or_default())
    }

    /// Drop the lock map entry once no other caller holds it.
    async fn prune_lock(&self, canonical: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.refresh_locks.lock().await;
        // 2 == the map's Arc plus ours.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(canonical);
        }
    }

    /// Start an authorization code + PKCE flow.
    ///
    /// Reuses the browser's existing credential token when it supplies one so
    /// a re-login replaces rather than multiplies identities.
    pub async fn begin_login(
        &self,
        session_code: &str,
        existing_token: Option<String>,
    ) -> anyhow::Result<LoginStart> {
        let credential_token = existing_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::compute_code_challenge(&code_verifier);
        let state = pkce::generate_state();

        self.store
            .put_pending(
                &state,
                &PendingAuth {
                    code_verifier,
                    session_code: session_code.to_owned(),
                    credential_token: credential_token.clone(),
                },
            )
            .await?;

        let auth_url = pkce::build_auth_url(
            &self.auth_url,
            &self.client_id,
            &self.redirect_uri,
            &self.scopes,
            &code_challenge,
            &state,
        );

        Ok(LoginStart { auth_url, credential_token, state })
    }

    /// Complete an authorization code exchange from the callback endpoint.
    ///
    /// If the authenticated external user already has a credential record,
    /// that record is updated in place and the new browser token becomes an
    /// alias of it, so every device converges on one record.
    pub async fn complete_login(&self, state: &str, code: &str) -> anyhow::Result<CompletedLogin> {
        let pending = self
            .store
            .take_pending(state)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown or expired auth state"))?;

        let token = oauth::exchange_code(
            &self.http,
            &self.token_url,
            &self.client_id,
            code,
            &pending.code_verifier,
            &self.redirect_uri,
        )
        .await?;
        let refresh_token = token
            .refresh_token
            .ok_or_else(|| anyhow::anyhow!("token response missing refresh_token"))?;

        let profile = oauth::fetch_profile(&self.http, &self.profile_url, &token.access_token).await?;

        let record = CredentialRecord {
            access_token: token.access_token,
            refresh_token,
            expires_at: epoch_secs() + token.expires_in,
            country_code: profile.country,
            external_user_id: profile.id.clone(),
            display_name: profile.display_name,
        };

        match self.store.find_by_user(&profile.id).await? {
            Some(canonical) => {
                self.store.put(&canonical, &record).await?;
                if canonical != pending.credential_token {
                    self.store.alias(&pending.credential_token, &canonical).await?;
                }
                tracing::info!(user = %profile.id, "login merged into existing credential");
            }
            None => {
                self.store.put(&pending.credential_token, &record).await?;
                tracing::info!(user = %profile.id, "login completed, credential stored");
            }
        }

        Ok(CompletedLogin {
            session_code: pending.session_code,
            credential_token: pending.credential_token,
        })
    }

    /// Whether an in-flight login references `session_code`.
    pub async fn has_pending_for_session(&self, session_code: &str) -> anyhow::Result<bool> {
        self.store.pending_for_session(session_code).await
    }

    /// Report the credential behind a browser token, if any.
    pub async fn status(&self, credential_token: &str) -> anyhow::Result<Option<CredentialStatus>> {
        let canonical = self.store.resolve(credential_token).await?;
        let Some(record) = self.store.get(&canonical).await? else {
            return Ok(None);
        };
        let now = epoch_secs();
        let expires_in_secs =
            (record.expires_at > now).then(|| record.expires_at - now);
        Ok(Some(CredentialStatus {
            display_name: record.display_name,
            external_user_id: record.external_user_id,
            expires_in_secs,
        }))
    }

    /// Remove the credential behind a browser token. Returns whether a
    /// record existed.
    pub async fn logout(&self, credential_token: &str) -> anyhow::Result<bool> {
        let canonical = self.store.resolve(credential_token).await?;
        let existed = self.store.get(&canonical).await?.is_some();
        if existed {
            self.store.delete(&canonical).await?;
            tracing::info!("credential removed on logout");
        }
        Ok(existed)
    }
}

fn needs_refresh(record: &CredentialRecord) -> bool {
    record.expires_at <= epoch_secs() + REFRESH_WINDOW_SECS
}

fn context(record: &CredentialRecord) -> AccessContext {
    AccessContext {
        token: record.access_token.clone(),
        country_code: record.country_code.clone(),
        user_id: record.external_user_id.clone(),
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
