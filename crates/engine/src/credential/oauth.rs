// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire calls against the external authorization server.

use serde::Deserialize;

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// Profile of the authenticated external-service user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub country: String,
}

/// Why a refresh attempt failed.
#[derive(Debug)]
pub enum RefreshError {
    /// The authorization server rejected the refresh token (HTTP 4xx).
    /// The stored credential is dead and must be removed.
    Rejected(String),
    /// Network failure or upstream 5xx; the credential may still be good.
    Transient(String),
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> anyhow::Result<TokenResponse> {
    let resp = client
        .post(token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("token exchange failed ({status}): {text}");
    }

    let token: TokenResponse = resp.json().await?;
    Ok(token)
}

/// Perform a single token refresh request.
///
/// A 4xx answer means the refresh token itself was rejected — that outcome
/// is distinguished from transient failures because the caller must delete
/// the credential rather than retry.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    refresh_token: &str,
) -> Result<TokenResponse, RefreshError> {
    let resp = client
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| RefreshError::Transient(e.to_string()))?;

    let status = resp.status();
    if status.is_client_error() {
        let text = resp.text().await.unwrap_or_default();
        return Err(RefreshError::Rejected(format!("refresh rejected ({status}): {text}")));
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(RefreshError::Transient(format!("refresh failed ({status}): {text}")));
    }

    resp.json().await.map_err(|e| RefreshError::Transient(e.to_string()))
}

/// Fetch the authenticated user's profile.
pub async fn fetch_profile(
    client: &reqwest::Client,
    profile_url: &str,
    access_token: &str,
) -> anyhow::Result<UserProfile> {
    let resp = client.get(profile_url).bearer_auth(access_token).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        anyhow::bail!("profile fetch failed ({status})");
    }
    let profile: UserProfile = resp.json().await?;
    Ok(profile)
}
