// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Playlist reconciliation against the external music service.
//!
//! Triggered by track add/remove, a new playlist link, or an explicit
//! refresh. Reconciliation re-establishes ground truth: it fetches the
//! authoritative ordered track list and overwrites the cached view
//! wholesale. Cached tracks are deliberately left untouched when the
//! external playlist turns out to be gone, so the room keeps something to
//! look at while the host relinks.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::credential::TokenError;
use crate::error::ApiError;
use crate::events::ServerEvent;
use crate::music::{into_track, MusicError, TrackMeta};
use crate::rooms;
use crate::session::Track;
use crate::state::AppState;

/// Why a reconciliation pass failed.
#[derive(Debug)]
pub enum SyncError {
    /// The session has no linked external playlist.
    NotLinked,
    SessionNotFound,
    /// The linked playlist is gone or access to it was revoked.
    PlaylistUnavailable { playlist_ref: String, message: String },
    Credential(TokenError),
    /// Transient external or store failure.
    Unavailable(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLinked => f.write_str("no external playlist linked"),
            Self::SessionNotFound => f.write_str("session not found"),
            Self::PlaylistUnavailable { playlist_ref, message } => {
                write!(f, "playlist {playlist_ref} unavailable: {message}")
            }
            Self::Credential(e) => write!(f, "credential: {e}"),
            Self::Unavailable(msg) => write!(f, "sync unavailable: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    pub fn api_error(&self) -> ApiError {
        match self {
            Self::NotLinked => ApiError::Invalid,
            Self::SessionNotFound => ApiError::NotFound,
            Self::PlaylistUnavailable { .. } => ApiError::NotFound,
            Self::Credential(TokenError::NoCredential) => ApiError::Unauthorized,
            Self::Credential(TokenError::Expired) => ApiError::CredentialExpired,
            Self::Credential(TokenError::Unavailable(_)) | Self::Unavailable(_) => {
                ApiError::Unavailable
            }
        }
    }
}

/// Fetch the authoritative track list and commit it to the session.
/// Returns the reconciled tracks.
pub async fn sync_playlist(state: &AppState, session_code: &str) -> Result<Vec<Track>, SyncError> {
    let session = state
        .sessions
        .get(session_code)
        .await
        .map_err(|e| SyncError::Unavailable(e.to_string()))?
        .ok_or(SyncError::SessionNotFound)?;
    let Some(playlist_ref) = session.external_playlist_ref.clone() else {
        return Err(SyncError::NotLinked);
    };
    if session.host_credential_ref.is_empty() {
        return Err(SyncError::Credential(TokenError::NoCredential));
    }

    let access = state
        .broker
        .access_token(&session.host_credential_ref)
        .await
        .map_err(SyncError::Credential)?;

    let gone = |e: MusicError| match e {
        MusicError::Gone(_) => SyncError::PlaylistUnavailable {
            playlist_ref: playlist_ref.clone(),
            message: "The linked playlist is no longer accessible.".to_owned(),
        },
        MusicError::Unavailable(msg) => SyncError::Unavailable(msg),
    };

    let info = state.music.playlist(&access, &playlist_ref).await.map_err(gone)?;
    let ids = state
        .music
        .playlist_item_ids(&access, &playlist_ref, state.config.max_tracks)
        .await
        .map_err(gone)?;

    // Fetch metadata once per distinct id, then re-project through the
    // ordered id list. Unresolved ids drop out; duplicates each get a
    // freshly minted internal id.
    let mut distinct = Vec::new();
    let mut seen = HashSet::new();
    for id in &ids {
        if seen.insert(id.clone()) {
            distinct.push(id.clone());
        }
    }
    let metas = state.music.tracks_meta(&access, &distinct).await.map_err(gone)?;
    let by_id: HashMap<&str, &TrackMeta> =
        metas.iter().map(|m| (m.external_id.as_str(), m)).collect();
    let tracks: Vec<Track> =
        ids.iter().filter_map(|id| by_id.get(id.as_str())).map(|m| into_track(m)).collect();

    let committed = rooms::apply_synced_tracks(
        state,
        session_code,
        &playlist_ref,
        tracks.clone(),
        Some(info.name),
        Some(info.is_public),
    )
    .await
    .map_err(|e| SyncError::Unavailable(e.to_string()))?;
    if !committed {
        // Either the session vanished, or it was relinked while the fetch
        // was in flight. The relink triggers its own reconciliation, so the
        // session's current tracks are the canonical answer here.
        let current = state
            .sessions
            .get(session_code)
            .await
            .map_err(|e| SyncError::Unavailable(e.to_string()))?
            .ok_or(SyncError::SessionNotFound)?;
        return Ok(current.tracks);
    }

    tracing::info!(session = %session_code, playlist = %playlist_ref, tracks = tracks.len(), "playlist reconciled");
    Ok(tracks)
}

/// Turn a failed reconciliation into the room-visible broadcasts the
/// protocol requires, leaving cached tracks untouched.
pub async fn handle_sync_failure(state: &AppState, session_code: &str, err: &SyncError) {
    match err {
        SyncError::PlaylistUnavailable { playlist_ref, message } => {
            rooms::broadcast(
                state,
                session_code,
                &ServerEvent::PlaylistUnavailable {
                    playlist_ref: playlist_ref.clone(),
                    message: message.clone(),
                },
            )
            .await;
        }
        SyncError::Credential(TokenError::Expired) => {
            // The dead credential backs every session it hosts; notify
            // them all, not just the one that tripped the refresh.
            if let Ok(Some(session)) = state.sessions.get(session_code).await {
                if !session.host_credential_ref.is_empty() {
                    rooms::broadcast_credential_expired(state, &session.host_credential_ref).await;
                }
            }
        }
        _ => {
            tracing::warn!(session = %session_code, error = %err, "reconciliation failed");
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
