// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared engine state handed to every transport handler.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::credential::broker::TokenBroker;
use crate::music::MusicService;
use crate::rooms::RoomRegistry;
use crate::store::{CredentialStore, SessionStore};

pub struct AppState {
    pub config: EngineConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub broker: TokenBroker,
    pub rooms: RoomRegistry,
    pub music: Arc<dyn MusicService>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: EngineConfig,
        sessions: Arc<dyn SessionStore>,
        credentials: Arc<dyn CredentialStore>,
        music: Arc<dyn MusicService>,
        shutdown: CancellationToken,
    ) -> Self {
        let broker = TokenBroker::new(&config, Arc::clone(&credentials));
        Self {
            config,
            sessions,
            credentials,
            broker,
            rooms: RoomRegistry::new(),
            music,
            shutdown,
        }
    }
}

pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
