// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the engine.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the axum `Router` with all engine routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Session lifecycle
        .route("/api/v1/sessions", post(http::create_session).get(http::list_sessions))
        .route("/api/v1/sessions/{code}", get(http::get_session).delete(http::delete_session))
        // Playlist operations
        .route("/api/v1/sessions/{code}/playlist", post(http::link_playlist))
        .route("/api/v1/sessions/{code}/tracks", post(http::add_track))
        .route("/api/v1/sessions/{code}/tracks/{external_id}", delete(http::remove_track))
        .route("/api/v1/sessions/{code}/refresh", post(http::refresh_session))
        // OAuth
        .route("/api/v1/auth/login", get(http::auth_login))
        .route("/api/v1/auth/callback", get(http::auth_callback))
        .route("/api/v1/auth/status", get(http::auth_status))
        .route("/api/v1/auth/logout", post(http::auth_logout))
        // WebSocket (coordination protocol)
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
