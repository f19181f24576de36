// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local participant rosters and the coordination protocol.
//!
//! A room is the set of live connections attached to one session code.
//! Rosters are never persisted; they rebuild from nothing on restart while
//! the sessions themselves survive in the store. All read-modify-write of a
//! session happens under that room's async mutex, and host-authority changes
//! are committed to the store before any broadcast goes out.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::events::ServerEvent;
use crate::session::{elect_host, is_valid_code, sanitize_display_name};
use crate::state::AppState;

/// One live connection in a room.
pub struct Participant {
    pub name: String,
    sender: mpsc::UnboundedSender<String>,
}

impl Participant {
    fn send(&self, event: &ServerEvent) {
        // A closed channel means the connection is tearing down; its
        // disconnect handler will remove it.
        let _ = self.sender.send(event.to_json());
    }
}

/// Roster of a single session, keyed by connection id. Insertion order is
/// the promotion order.
#[derive(Default)]
struct Room {
    participants: IndexMap<String, Participant>,
}

impl Room {
    fn names(&self) -> Vec<String> {
        self.participants.values().map(|p| p.name.clone()).collect()
    }

    fn broadcast(&self, event: &ServerEvent) {
        for participant in self.participants.values() {
            participant.send(event);
        }
    }

    fn broadcast_except(&self, skip: &str, event: &ServerEvent) {
        for (conn_id, participant) in &self.participants {
            if conn_id != skip {
                participant.send(event);
            }
        }
    }
}

/// Per-session slot: the roster plus the mutex that serializes every
/// mutation of that session.
pub struct RoomSlot {
    room: Mutex<Room>,
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<RoomSlot>>>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self { rooms: RwLock::new(HashMap::new()) }
    }

    async fn slot(&self, code: &str) -> Arc<RoomSlot> {
        let mut rooms = self.rooms.write().await;
        Arc::clone(
            rooms
                .entry(code.to_owned())
                .or_insert_with(|| Arc::new(RoomSlot { room: Mutex::new(Room::default()) })),
        )
    }

    async fn get(&self, code: &str) -> Option<Arc<RoomSlot>> {
        self.rooms.read().await.get(code).cloned()
    }

    async fn drop_if_empty(&self, code: &str, slot: &Arc<RoomSlot>) {
        let mut rooms = self.rooms.write().await;
        // A joiner may already hold the slot and be waiting on the room
        // lock; 2 == the map's Arc plus ours.
        if Arc::strong_count(slot) > 2 {
            return;
        }
        if slot.room.lock().await.participants.is_empty() {
            rooms.remove(code);
        }
    }
}

/// Attach a connection to a session. On success the joiner receives a full
/// `session_state` snapshot and everyone else a `participant_joined`.
/// Returns whether the join took effect.
#[allow(clippy::too_many_arguments)]
pub async fn join_session(
    state: &AppState,
    conn_id: &str,
    sender: mpsc::UnboundedSender<String>,
    session_code: &str,
    display_name: &str,
    as_host: bool,
    credential_token: Option<&str>,
) -> bool {
    let reply = |message: &str| {
        let _ = sender.send(ServerEvent::Error { message: message.to_owned() }.to_json());
    };

    if !is_valid_code(session_code) {
        reply("invalid session code");
        return false;
    }

    let slot = state.rooms.slot(session_code).await;
    let mut room = slot.room.lock().await;

    let mut session = match state.sessions.get(session_code).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            reply("session not found");
            drop(room);
            state.rooms.drop_if_empty(session_code, &slot).await;
            return false;
        }
        Err(e) => {
            tracing::error!(session = %session_code, error = %e, "session store unavailable");
            reply("session store unavailable");
            drop(room);
            state.rooms.drop_if_empty(session_code, &slot).await;
            return false;
        }
    };

    // Resolve the presented credential to its canonical record, if any.
    let mut credential_ref = None;
    let mut credential_name = String::new();
    if let Some(token) = credential_token.filter(|t| !t.is_empty()) {
        match resolve_credential(state, token).await {
            Ok(Some((canonical, name))) => {
                credential_ref = Some(canonical);
                credential_name = name;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(session = %session_code, error = %e, "credential lookup failed");
            }
        }
    }

    let is_host = as_host && elect_host(&session, credential_ref.as_deref());
    if as_host && !is_host {
        tracing::debug!(session = %session_code, conn = %conn_id, "host claim denied, joining as guest");
    }

    if is_host {
        session.host_connection_id = conn_id.to_owned();
        if let Some(cred) = &credential_ref {
            session.host_credential_ref = cred.clone();
            if session.host_display_name.is_empty() && !credential_name.is_empty() {
                session.host_display_name = credential_name.clone();
            }
        }
        if let Err(e) = state.sessions.put(&session).await {
            tracing::error!(session = %session_code, error = %e, "failed to persist host election");
            reply("session store unavailable");
            return false;
        }
    } else if let Err(e) = state.sessions.touch(session_code).await {
        tracing::warn!(session = %session_code, error = %e, "failed to renew session ttl");
    }

    let name = if is_host && !session.host_display_name.is_empty() && display_name.trim().is_empty()
    {
        session.host_display_name.clone()
    } else {
        sanitize_display_name(display_name)
    };

    room.participants
        .insert(conn_id.to_owned(), Participant { name: name.clone(), sender: sender.clone() });
    let participants = room.names();

    let _ = sender.send(
        ServerEvent::SessionState { session, is_host, participants: participants.clone() }
            .to_json(),
    );
    room.broadcast_except(conn_id, &ServerEvent::ParticipantJoined { name, participants });

    tracing::info!(session = %session_code, conn = %conn_id, host = is_host, "participant joined");
    true
}

async fn resolve_credential(
    state: &AppState,
    token: &str,
) -> anyhow::Result<Option<(String, String)>> {
    let canonical = state.credentials.resolve(token).await?;
    Ok(state
        .credentials
        .get(&canonical)
        .await?
        .map(|record| (canonical, record.display_name)))
}

/// Link an external playlist over the coordination channel. Host-only by
/// connection id; non-host callers are silently rejected.
pub async fn handle_set_playlist(
    state: &AppState,
    session_code: &str,
    conn_id: &str,
    playlist_ref: &str,
    playlist_url: &str,
    name: Option<&str>,
) -> bool {
    let host_conn = match state.sessions.get(session_code).await {
        Ok(Some(session)) => session.host_connection_id,
        _ => return false,
    };
    if host_conn != conn_id {
        tracing::debug!(session = %session_code, conn = %conn_id, "set_playlist from non-host ignored");
        return false;
    }
    link_playlist(state, session_code, playlist_ref, playlist_url, name, None)
        .await
        .unwrap_or(false)
}

/// Update a session's playlist linkage and broadcast `playlist_linked`.
/// Does not populate tracks — reconciliation does that separately.
///
/// `claim` carries a canonical credential ref + display name that takes the
/// host-credential slot when the session has none yet (a host linking over
/// REST before any coordination connection exists).
pub async fn link_playlist(
    state: &AppState,
    session_code: &str,
    playlist_ref: &str,
    playlist_url: &str,
    name: Option<&str>,
    claim: Option<(&str, &str)>,
) -> anyhow::Result<bool> {
    let slot = state.rooms.slot(session_code).await;
    let room = slot.room.lock().await;

    let Some(mut session) = state.sessions.get(session_code).await? else {
        drop(room);
        state.rooms.drop_if_empty(session_code, &slot).await;
        return Ok(false);
    };

    session.external_playlist_ref = Some(playlist_ref.to_owned());
    session.external_playlist_url = Some(playlist_url.to_owned());
    if let Some(name) = name {
        session.name = name.to_owned();
    }
    if let Some((cred, display_name)) = claim {
        if session.host_credential_ref.is_empty() {
            session.host_credential_ref = cred.to_owned();
            if session.host_display_name.is_empty() {
                session.host_display_name = display_name.to_owned();
            }
        }
    }
    state.sessions.put(&session).await?;

    room.broadcast(&ServerEvent::PlaylistLinked {
        external_playlist_ref: playlist_ref.to_owned(),
        external_playlist_url: playlist_url.to_owned(),
        name: name.map(str::to_owned),
    });
    drop(room);
    state.rooms.drop_if_empty(session_code, &slot).await;
    tracing::info!(session = %session_code, playlist = %playlist_ref, "playlist linked");
    Ok(true)
}

/// Credit a guest in the session's contributor list. Returns the updated
/// session so callers can rebuild the external description.
pub async fn add_contributor(
    state: &AppState,
    session_code: &str,
    name: &str,
) -> anyhow::Result<Option<crate::session::Session>> {
    let slot = state.rooms.slot(session_code).await;
    let room = slot.room.lock().await;

    let Some(mut session) = state.sessions.get(session_code).await? else {
        drop(room);
        state.rooms.drop_if_empty(session_code, &slot).await;
        return Ok(None);
    };
    let name = sanitize_display_name(name);
    if !session.contributors.iter().any(|c| c == &name) {
        session.contributors.push(name);
        state.sessions.put(&session).await?;
    }
    drop(room);
    state.rooms.drop_if_empty(session_code, &slot).await;
    Ok(Some(session))
}

/// Detach a connection. A departing host either hands authority to the
/// first remaining connection or, with the room now empty, leaves the
/// session hostless so a matching credential can reclaim it later.
pub async fn handle_disconnect(state: &AppState, session_code: &str, conn_id: &str) {
    let Some(slot) = state.rooms.get(session_code).await else {
        return;
    };
    let mut room = slot.room.lock().await;

    let Some(participant) = room.participants.shift_remove(conn_id) else {
        return;
    };
    let participants = room.names();

    let session = match state.sessions.get(session_code).await {
        Ok(Some(session)) => Some(session),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(session = %session_code, error = %e, "store unavailable during disconnect");
            None
        }
    };

    if let Some(mut session) = session {
        if session.host_connection_id == conn_id {
            if let Some((next_conn, next)) = room.participants.iter().next() {
                session.host_connection_id = next_conn.clone();
                // Authority must be durable before anyone hears about it.
                if let Err(e) = state.sessions.put(&session).await {
                    tracing::error!(session = %session_code, error = %e, "failed to persist host promotion");
                } else {
                    next.send(&ServerEvent::PromotedToHost);
                    tracing::info!(session = %session_code, conn = %next_conn, "promoted to host");
                }
            } else {
                session.host_connection_id.clear();
                // An in-flight login must outlive the tab that started it;
                // persisting the cleared host slot renews the TTL either way.
                if let Ok(true) = state.broker.has_pending_for_session(session_code).await {
                    tracing::info!(session = %session_code, "host left with a login pending, session kept");
                }
                if let Err(e) = state.sessions.put(&session).await {
                    tracing::warn!(session = %session_code, error = %e, "failed to persist host departure");
                }
            }
        } else if let Err(e) = state.sessions.touch(session_code).await {
            tracing::warn!(session = %session_code, error = %e, "failed to renew session ttl");
        }
    }

    room.broadcast(&ServerEvent::ParticipantLeft { name: participant.name, participants });
    let empty = room.participants.is_empty();
    drop(room);
    if empty {
        state.rooms.drop_if_empty(session_code, &slot).await;
    }
    tracing::info!(session = %session_code, conn = %conn_id, "participant left");
}

/// Commit a reconciled track list and broadcast the canonical state.
///
/// The external fetches happen outside any lock; only this final
/// read-modify-write runs under the room mutex, so it serializes with
/// joins and other mutations of the same session. The track list is
/// replaced wholesale, never patched. `playlist_ref` is the playlist the
/// tracks were fetched from: if the session was relinked while the fetch
/// was in flight, the stale result is discarded rather than committed.
pub async fn apply_synced_tracks(
    state: &AppState,
    session_code: &str,
    playlist_ref: &str,
    tracks: Vec<crate::session::Track>,
    name: Option<String>,
    is_public: Option<bool>,
) -> anyhow::Result<bool> {
    let slot = state.rooms.slot(session_code).await;
    let room = slot.room.lock().await;

    let Some(mut session) = state.sessions.get(session_code).await? else {
        drop(room);
        state.rooms.drop_if_empty(session_code, &slot).await;
        return Ok(false);
    };
    if session.external_playlist_ref.as_deref() != Some(playlist_ref) {
        tracing::debug!(session = %session_code, stale = %playlist_ref, "session relinked during reconciliation, stale result discarded");
        drop(room);
        state.rooms.drop_if_empty(session_code, &slot).await;
        return Ok(false);
    }
    session.tracks = tracks.clone();
    if let Some(name) = &name {
        session.name = name.clone();
    }
    if let Some(public) = is_public {
        session.is_public = public;
    }
    state.sessions.put(&session).await?;

    room.broadcast(&ServerEvent::PlaylistSynced { tracks, name, is_public });
    drop(room);
    state.rooms.drop_if_empty(session_code, &slot).await;
    Ok(true)
}

/// Broadcast an event to every connection in a session's room.
pub async fn broadcast(state: &AppState, session_code: &str, event: &ServerEvent) {
    if let Some(slot) = state.rooms.get(session_code).await {
        slot.room.lock().await.broadcast(event);
    }
}

/// Notify every session backed by `credential_ref` that its host must
/// re-authenticate.
pub async fn broadcast_credential_expired(state: &AppState, credential_ref: &str) {
    let sessions = match state.sessions.list().await {
        Ok(sessions) => sessions,
        Err(e) => {
            tracing::warn!(error = %e, "could not list sessions for credential notice");
            return;
        }
    };
    let event = ServerEvent::CredentialExpired {
        message: "The host's login has expired and must be renewed.".to_owned(),
        reason: "refresh_rejected".to_owned(),
    };
    for session in sessions {
        if session.host_credential_ref == credential_ref {
            broadcast(state, &session.code, &event).await;
        }
    }
}

#[cfg(test)]
#[path = "rooms_tests.rs"]
mod tests;
