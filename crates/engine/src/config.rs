// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the auxroom engine.
#[derive(Debug, Clone, clap::Parser)]
pub struct EngineConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "AUXROOM_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8737, env = "AUXROOM_PORT")]
    pub port: u16,

    /// Redis URL for durable session/credential storage.
    /// If unset, an in-memory store is used (single process, lost on restart).
    #[arg(long, env = "AUXROOM_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Session TTL in seconds, renewed on activity.
    #[arg(long, default_value_t = 30 * 24 * 3600, env = "AUXROOM_SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,

    /// Credential record TTL in seconds, renewed on refresh.
    #[arg(long, default_value_t = 60 * 24 * 3600, env = "AUXROOM_CREDENTIAL_TTL_SECS")]
    pub credential_ttl_secs: u64,

    /// Pending-authorization TTL in seconds. A login flow that is not
    /// completed within this window is discarded.
    #[arg(long, default_value_t = 600, env = "AUXROOM_PENDING_AUTH_TTL_SECS")]
    pub pending_auth_ttl_secs: u64,

    /// Cap on the number of playlist items fetched during reconciliation.
    #[arg(long, default_value_t = 1000, env = "AUXROOM_MAX_TRACKS")]
    pub max_tracks: usize,

    /// OAuth authorization endpoint of the external music service.
    #[arg(long, env = "AUXROOM_AUTH_URL")]
    pub auth_url: String,

    /// OAuth token endpoint of the external music service.
    #[arg(long, env = "AUXROOM_TOKEN_URL")]
    pub token_url: String,

    /// Profile endpoint used to resolve the authenticated user.
    #[arg(long, env = "AUXROOM_PROFILE_URL")]
    pub profile_url: String,

    /// Base URL of the external music catalog API.
    #[arg(long, env = "AUXROOM_API_BASE_URL")]
    pub api_base_url: String,

    /// OAuth client id.
    #[arg(long, env = "AUXROOM_CLIENT_ID")]
    pub client_id: String,

    /// OAuth redirect URI (must match the registered application).
    #[arg(long, env = "AUXROOM_REDIRECT_URI")]
    pub redirect_uri: String,

    /// OAuth scopes requested at login.
    #[arg(
        long,
        default_value = "playlist-read playlist-modify user-read",
        env = "AUXROOM_SCOPES"
    )]
    pub scopes: String,
}

impl EngineConfig {
    pub fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_ttl_secs)
    }

    pub fn credential_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.credential_ttl_secs)
    }

    pub fn pending_auth_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pending_auth_ttl_secs)
    }
}
