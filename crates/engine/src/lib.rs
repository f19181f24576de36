// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auxroom: collaborative session synchronization engine.
//!
//! One host shares control of a playlist on an external music service with
//! any number of guest browsers; the engine keeps a shared session view
//! synchronized in real time over WebSocket and reconciles the cached
//! track list against the external service after every mutation.

pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod music;
pub mod rooms;
pub mod session;
pub mod state;
pub mod store;
pub mod sync;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::music::client::HttpMusicService;
use crate::state::AppState;
use crate::store::memory::MemoryStore;
use crate::store::redis::RedisStore;
use crate::store::{CredentialStore, SessionStore};
use crate::transport::build_router;

/// Run the engine server until shutdown.
pub async fn run(config: EngineConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let (sessions, credentials): (Arc<dyn SessionStore>, Arc<dyn CredentialStore>) =
        match &config.redis_url {
            Some(url) => {
                let store = Arc::new(
                    RedisStore::connect(
                        url,
                        config.session_ttl(),
                        config.credential_ttl(),
                        config.pending_auth_ttl(),
                    )
                    .await?,
                );
                tracing::info!("using redis session store");
                (Arc::clone(&store) as _, store as _)
            }
            None => {
                let store = Arc::new(MemoryStore::new(
                    config.session_ttl(),
                    config.credential_ttl(),
                    config.pending_auth_ttl(),
                ));
                tracing::warn!("no redis url configured, sessions will not survive a restart");
                (Arc::clone(&store) as _, store as _)
            }
        };

    let music = Arc::new(HttpMusicService::new(&config.api_base_url));
    let state =
        Arc::new(AppState::new(config, sessions, credentials, music, shutdown.clone()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    tracing::info!("auxroom engine listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
