// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers for the engine API.
//!
//! Mutating endpoints authenticate with the browser's opaque credential
//! token via `Authorization: Bearer`. Track addition is deliberately open
//! to guests: they contribute through the host's credential, which is the
//! whole point of the session.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::credential::{AccessContext, TokenError};
use crate::error::{ApiError, ErrorResponse};
use crate::events::ServerEvent;
use crate::music::MusicError;
use crate::rooms;
use crate::session::{generate_code, is_valid_code, Session};
use crate::state::AppState;
use crate::sync;

type HttpError = (StatusCode, Json<ErrorResponse>);

/// Attempts before giving up on finding a free share code.
const CODE_ATTEMPTS: usize = 16;

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn store_error(e: anyhow::Error) -> HttpError {
    tracing::error!(error = %e, "store unavailable");
    ApiError::Unavailable.to_http_response("session store unavailable")
}

async fn load_session(state: &AppState, code: &str) -> Result<Session, HttpError> {
    if !is_valid_code(code) {
        return Err(ApiError::Invalid.to_http_response("invalid session code"));
    }
    state
        .sessions
        .get(code)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::NotFound.to_http_response("session not found"))
}

/// Resolve the bearer token and require it to be the session's host
/// credential. Returns the canonical token.
async fn require_host(
    state: &AppState,
    headers: &HeaderMap,
    session: &Session,
) -> Result<String, HttpError> {
    let Some(token) = bearer_token(headers) else {
        return Err(ApiError::Unauthorized.to_http_response("missing bearer token"));
    };
    let canonical = state.credentials.resolve(&token).await.map_err(store_error)?;
    if session.host_credential_ref.is_empty() || canonical != session.host_credential_ref {
        return Err(ApiError::Unauthorized.to_http_response("not the session host"));
    }
    Ok(canonical)
}

/// Produce a usable access token for the session's host credential,
/// notifying every backed session when the credential turns out dead.
async fn host_access(state: &AppState, session: &Session) -> Result<AccessContext, HttpError> {
    if session.host_credential_ref.is_empty() {
        return Err(ApiError::Unauthorized.to_http_response("session has no host credential"));
    }
    match state.broker.access_token(&session.host_credential_ref).await {
        Ok(access) => Ok(access),
        Err(TokenError::NoCredential) => {
            Err(ApiError::Unauthorized.to_http_response("no credential on file"))
        }
        Err(TokenError::Expired) => {
            rooms::broadcast_credential_expired(state, &session.host_credential_ref).await;
            Err(ApiError::CredentialExpired
                .to_http_response("credential expired, re-authentication required"))
        }
        Err(TokenError::Unavailable(msg)) => Err(ApiError::Unavailable.to_http_response(msg)),
    }
}

async fn map_music_error(state: &AppState, session: &Session, err: MusicError) -> HttpError {
    match err {
        MusicError::Gone(_) => {
            let playlist_ref = session.external_playlist_ref.clone().unwrap_or_default();
            rooms::broadcast(
                state,
                &session.code,
                &ServerEvent::PlaylistUnavailable {
                    playlist_ref: playlist_ref.clone(),
                    message: "The linked playlist is no longer accessible.".to_owned(),
                },
            )
            .await;
            ApiError::NotFound.to_http_response("playlist no longer accessible")
        }
        MusicError::Unavailable(msg) => ApiError::Unavailable.to_http_response(msg),
    }
}

/// Reconcile after a mutation, translating failures into both the room
/// broadcast and the API error.
async fn sync_and_respond(
    state: &AppState,
    code: &str,
) -> Result<Json<serde_json::Value>, HttpError> {
    match sync::sync_playlist(state, code).await {
        Ok(tracks) => Ok(Json(serde_json::json!({ "tracks": tracks }))),
        Err(err) => {
            sync::handle_sync_failure(state, code, &err).await;
            Err(err.api_error().to_http_response(err.to_string()))
        }
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let session_count = state.sessions.list().await.map(|s| s.len()).unwrap_or(0);
    Json(serde_json::json!({
        "status": "running",
        "session_count": session_count,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<Session>, HttpError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let mut code = None;
    for _ in 0..CODE_ATTEMPTS {
        let candidate = generate_code();
        if state.sessions.get(&candidate).await.map_err(store_error)?.is_none() {
            code = Some(candidate);
            break;
        }
    }
    let Some(code) = code else {
        return Err(ApiError::Internal.to_http_response("could not allocate a session code"));
    };

    let mut session = Session::new(code, req.name.unwrap_or_else(|| "Untitled".to_owned()));
    if let Some(description) = req.description {
        session.user_description = description;
    }

    // A creator who is already logged in claims the host credential now,
    // before any coordination connection exists.
    if let Some(token) = bearer_token(&headers) {
        let canonical = state.credentials.resolve(&token).await.map_err(store_error)?;
        if let Some(record) = state.credentials.get(&canonical).await.map_err(store_error)? {
            session.host_credential_ref = canonical;
            session.host_display_name = record.display_name;
        }
    }

    state.sessions.put(&session).await.map_err(store_error)?;
    tracing::info!(session = %session.code, "session created");
    Ok(Json(session))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Session>>, HttpError> {
    let sessions = state.sessions.list().await.map_err(store_error)?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Session>, HttpError> {
    let session = load_session(&state, &code).await?;
    state.sessions.touch(&code).await.map_err(store_error)?;
    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, HttpError> {
    let session = load_session(&state, &code).await?;
    require_host(&state, &headers, &session).await?;
    state.sessions.delete(&code).await.map_err(store_error)?;
    tracing::info!(session = %code, "session deleted by host");
    Ok(Json(serde_json::json!({ "removed": true })))
}

#[derive(Debug, Deserialize)]
pub struct LinkPlaylistRequest {
    pub external_playlist_ref: String,
    pub external_playlist_url: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn link_playlist(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(req): Json<LinkPlaylistRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let session = load_session(&state, &code).await?;

    // The host links; a logged-in caller may claim a hostless session.
    let Some(token) = bearer_token(&headers) else {
        return Err(ApiError::Unauthorized.to_http_response("missing bearer token"));
    };
    let canonical = state.credentials.resolve(&token).await.map_err(store_error)?;
    let record = state
        .credentials
        .get(&canonical)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::Unauthorized.to_http_response("no credential on file"))?;
    if !session.host_credential_ref.is_empty() && canonical != session.host_credential_ref {
        return Err(ApiError::Unauthorized.to_http_response("not the session host"));
    }

    rooms::link_playlist(
        &state,
        &code,
        &req.external_playlist_ref,
        &req.external_playlist_url,
        req.name.as_deref(),
        Some((canonical.as_str(), record.display_name.as_str())),
    )
    .await
    .map_err(store_error)?;

    sync_and_respond(&state, &code).await
}

#[derive(Debug, Deserialize)]
pub struct AddTrackRequest {
    pub external_id: String,
    /// Display name of the guest who added the track, credited in the
    /// external playlist description.
    #[serde(default)]
    pub added_by: Option<String>,
}

pub async fn add_track(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<AddTrackRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let session = load_session(&state, &code).await?;
    let Some(playlist_ref) = session.external_playlist_ref.clone() else {
        return Err(ApiError::Invalid.to_http_response("no external playlist linked"));
    };
    if req.external_id.trim().is_empty() {
        return Err(ApiError::Invalid.to_http_response("missing track id"));
    }

    let access = host_access(&state, &session).await?;
    if let Err(e) = state.music.add_item(&access, &playlist_ref, &req.external_id).await {
        return Err(map_music_error(&state, &session, e).await);
    }

    // Credit the contributor and push the rebuilt description. Both are
    // best-effort: the track itself is already on the playlist.
    if let Some(added_by) = req.added_by.filter(|n| !n.trim().is_empty()) {
        match rooms::add_contributor(&state, &code, &added_by).await {
            Ok(Some(updated)) => {
                let description = updated.external_description();
                if !description.is_empty() {
                    if let Err(e) = state
                        .music
                        .update_playlist(&access, &playlist_ref, None, &description)
                        .await
                    {
                        tracing::warn!(session = %code, error = %e, "description push failed");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(session = %code, error = %e, "contributor update failed"),
        }
    }

    sync_and_respond(&state, &code).await
}

pub async fn remove_track(
    State(state): State<Arc<AppState>>,
    Path((code, external_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, HttpError> {
    let session = load_session(&state, &code).await?;
    require_host(&state, &headers, &session).await?;
    let Some(playlist_ref) = session.external_playlist_ref.clone() else {
        return Err(ApiError::Invalid.to_http_response("no external playlist linked"));
    };

    let access = host_access(&state, &session).await?;
    if let Err(e) = state.music.remove_item(&access, &playlist_ref, &external_id).await {
        return Err(map_music_error(&state, &session, e).await);
    }

    sync_and_respond(&state, &code).await
}

pub async fn refresh_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, HttpError> {
    if !is_valid_code(code.as_str()) {
        return Err(ApiError::Invalid.to_http_response("invalid session code"));
    }
    sync_and_respond(&state, &code).await
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub session_code: String,
    #[serde(default)]
    pub credential_token: Option<String>,
}

pub async fn auth_login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Json<crate::credential::broker::LoginStart>, HttpError> {
    // The login is anchored to a session so the callback can route back.
    load_session(&state, &query.session_code).await?;
    let start = state
        .broker
        .begin_login(&query.session_code, query.credential_token)
        .await
        .map_err(store_error)?;
    Ok(Json(start))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let done = state.broker.complete_login(&query.state, &query.code).await.map_err(|e| {
        tracing::warn!(error = %e, "authorization callback failed");
        ApiError::Invalid.to_http_response(e.to_string())
    })?;
    Ok(Json(serde_json::json!({
        "session_code": done.session_code,
        "credential_token": done.credential_token,
    })))
}

pub async fn auth_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<crate::credential::broker::CredentialStatus>, HttpError> {
    let Some(token) = bearer_token(&headers) else {
        return Err(ApiError::Unauthorized.to_http_response("missing bearer token"));
    };
    let status = state
        .broker
        .status(&token)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::Unauthorized.to_http_response("no credential on file"))?;
    Ok(Json(status))
}

pub async fn auth_logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, HttpError> {
    let Some(token) = bearer_token(&headers) else {
        return Err(ApiError::Unauthorized.to_http_response("missing bearer token"));
    };
    let removed = state.broker.logout(&token).await.map_err(store_error)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
