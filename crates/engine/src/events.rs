// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format events for the real-time coordination channel.
//!
//! Inbound events are what browsers send over the WebSocket; outbound
//! events are what the engine broadcasts back. Both sides use an `event`
//! tag so clients can dispatch on one field.

use serde::{Deserialize, Serialize};

use crate::session::{Session, Track};

/// Events sent by a connected browser.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a session, optionally claiming host authority.
    JoinSession {
        session_code: String,
        #[serde(default)]
        display_name: String,
        #[serde(default)]
        as_host: bool,
        #[serde(default)]
        credential_token: Option<String>,
    },
    /// Link an external playlist to the session (host only).
    SetPlaylist {
        external_playlist_ref: String,
        external_playlist_url: String,
        #[serde(default)]
        name: Option<String>,
    },
}

/// Events broadcast by the engine to connected browsers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full session snapshot, sent to a connection right after it joins.
    SessionState {
        session: Session,
        is_host: bool,
        participants: Vec<String>,
    },
    ParticipantJoined {
        name: String,
        participants: Vec<String>,
    },
    ParticipantLeft {
        name: String,
        participants: Vec<String>,
    },
    /// The receiving connection has been promoted to host.
    PromotedToHost,
    PlaylistLinked {
        external_playlist_ref: String,
        external_playlist_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// The canonical track list after reconciliation — always the full list,
    /// never a diff.
    PlaylistSynced {
        tracks: Vec<Track>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_public: Option<bool>,
    },
    /// The linked playlist is gone or inaccessible; guests should ask the
    /// host to pick a new one.
    PlaylistUnavailable {
        playlist_ref: String,
        message: String,
    },
    /// The host credential backing this session can no longer be refreshed.
    CredentialExpired {
        message: String,
        reason: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Serialize for the wire. Serialization of these enums cannot fail;
    /// an empty frame is dropped by receivers.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
