// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::EngineConfig;
use crate::credential::{AccessContext, CredentialRecord};
use crate::music::{MusicError, MusicService, PlaylistInfo, TrackMeta};
use crate::session::{Session, Track};
use crate::store::memory::MemoryStore;
use crate::store::{CredentialStore, SessionStore};

/// Music service that refuses everything; rooms never talk to it.
struct NoMusic;

#[async_trait]
impl MusicService for NoMusic {
    async fn playlist(
        &self,
        _access: &AccessContext,
        _playlist_ref: &str,
    ) -> Result<PlaylistInfo, MusicError> {
        Err(MusicError::Unavailable("not wired".into()))
    }
    async fn playlist_item_ids(
        &self,
        _access: &AccessContext,
        _playlist_ref: &str,
        _max: usize,
    ) -> Result<Vec<String>, MusicError> {
        Err(MusicError::Unavailable("not wired".into()))
    }
    async fn tracks_meta(
        &self,
        _access: &AccessContext,
        _ids: &[String],
    ) -> Result<Vec<TrackMeta>, MusicError> {
        Err(MusicError::Unavailable("not wired".into()))
    }
    async fn add_item(
        &self,
        _access: &AccessContext,
        _playlist_ref: &str,
        _external_id: &str,
    ) -> Result<(), MusicError> {
        Err(MusicError::Unavailable("not wired".into()))
    }
    async fn remove_item(
        &self,
        _access: &AccessContext,
        _playlist_ref: &str,
        _external_id: &str,
    ) -> Result<(), MusicError> {
        Err(MusicError::Unavailable("not wired".into()))
    }
    async fn update_playlist(
        &self,
        _access: &AccessContext,
        _playlist_ref: &str,
        _name: Option<&str>,
        _description: &str,
    ) -> Result<(), MusicError> {
        Err(MusicError::Unavailable("not wired".into()))
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        host: "127.0.0.1".into(),
        port: 0,
        redis_url: None,
        session_ttl_secs: 3600,
        credential_ttl_secs: 3600,
        pending_auth_ttl_secs: 600,
        max_tracks: 1000,
        auth_url: "https://auth.example/authorize".into(),
        token_url: "https://auth.example/token".into(),
        profile_url: "https://api.example/me".into(),
        api_base_url: "https://api.example".into(),
        client_id: "client-123".into(),
        redirect_uri: "http://localhost/callback".into(),
        scopes: "playlist-read playlist-modify".into(),
    }
}

fn test_state() -> AppState {
    let store = Arc::new(MemoryStore::new(
        Duration::from_secs(3600),
        Duration::from_secs(3600),
        Duration::from_secs(600),
    ));
    AppState::new(
        test_config(),
        Arc::clone(&store) as Arc<dyn SessionStore>,
        store as Arc<dyn CredentialStore>,
        Arc::new(NoMusic),
        CancellationToken::new(),
    )
}

async fn seed_session(state: &AppState, code: &str) -> anyhow::Result<()> {
    let session = Session::new(code.into(), "test".into());
    state.sessions.put(&session).await
}

fn record(user: &str) -> CredentialRecord {
    CredentialRecord {
        access_token: "at".into(),
        refresh_token: "rt".into(),
        expires_at: u64::MAX,
        country_code: "DE".into(),
        external_user_id: user.into(),
        display_name: "Ann".into(),
    }
}

async fn join(
    state: &AppState,
    conn: &str,
    code: &str,
    name: &str,
    as_host: bool,
    token: Option<&str>,
) -> (mpsc::UnboundedReceiver<String>, bool) {
    let (tx, rx) = mpsc::unbounded_channel();
    let joined = join_session(state, conn, tx, code, name, as_host, token).await;
    (rx, joined)
}

fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> anyhow::Result<serde_json::Value> {
    let frame = rx.try_recv().map_err(|_| anyhow::anyhow!("no event queued"))?;
    Ok(serde_json::from_str(&frame)?)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let Ok(value) = serde_json::from_str(&frame) {
            events.push(value);
        }
    }
    events
}

#[tokio::test]
async fn joining_unknown_session_reports_error() -> anyhow::Result<()> {
    let state = test_state();
    let (mut rx, joined) = join(&state, "c1", "ABC234", "Ann", false, None).await;
    assert!(!joined);
    let event = next_event(&mut rx)?;
    assert_eq!(event["event"], "error");
    assert_eq!(event["message"], "session not found");

    // Malformed codes never reach the store.
    let (mut rx, joined) = join(&state, "c1", "short", "Ann", false, None).await;
    assert!(!joined);
    assert_eq!(next_event(&mut rx)?["message"], "invalid session code");
    Ok(())
}

#[tokio::test]
async fn only_one_host_under_interleaved_joins() -> anyhow::Result<()> {
    let state = test_state();
    seed_session(&state, "ABC234").await?;

    let (mut rx1, _) = join(&state, "c1", "ABC234", "Ann", true, None).await;
    let (mut rx2, _) = join(&state, "c2", "ABC234", "Ben", true, None).await;

    let state1 = next_event(&mut rx1)?;
    assert_eq!(state1["event"], "session_state");
    assert_eq!(state1["is_host"], true);

    let state2 = next_event(&mut rx2)?;
    assert_eq!(state2["is_host"], false, "second host claim must be denied");

    // The first connection additionally hears about the second joiner.
    let joined = next_event(&mut rx1)?;
    assert_eq!(joined["event"], "participant_joined");
    assert_eq!(joined["name"], "Ben");
    assert_eq!(joined["participants"].as_array().map(Vec::len), Some(2));

    let session = state
        .sessions
        .get("ABC234")
        .await?
        .ok_or_else(|| anyhow::anyhow!("session gone"))?;
    assert_eq!(session.host_connection_id, "c1");
    Ok(())
}

#[tokio::test]
async fn matching_credential_reclaims_host_from_another_device() -> anyhow::Result<()> {
    let state = test_state();
    seed_session(&state, "ABC234").await?;
    state.credentials.put("cred-1", &record("user-1")).await?;
    state.credentials.alias("cred-1-phone", "cred-1").await?;

    let (_rx1, _) = join(&state, "c1", "ABC234", "Ann", true, Some("cred-1")).await;

    // Same person, different device, aliased token: takes host authority.
    let (mut rx2, _) = join(&state, "c2", "ABC234", "Ann", true, Some("cred-1-phone")).await;
    assert_eq!(next_event(&mut rx2)?["is_host"], true);

    // A stranger cannot.
    state.credentials.put("cred-2", &record("user-2")).await?;
    let (mut rx3, _) = join(&state, "c3", "ABC234", "Eve", true, Some("cred-2")).await;
    assert_eq!(next_event(&mut rx3)?["is_host"], false);

    let session = state
        .sessions
        .get("ABC234")
        .await?
        .ok_or_else(|| anyhow::anyhow!("session gone"))?;
    assert_eq!(session.host_connection_id, "c2");
    assert_eq!(session.host_credential_ref, "cred-1");
    Ok(())
}

#[tokio::test]
async fn host_disconnect_promotes_first_remaining_only() -> anyhow::Result<()> {
    let state = test_state();
    seed_session(&state, "ABC234").await?;

    let (_rx_host, _) = join(&state, "host", "ABC234", "Ann", true, None).await;
    let (mut rx_g1, _) = join(&state, "g1", "ABC234", "Ben", false, None).await;
    let (mut rx_g2, _) = join(&state, "g2", "ABC234", "Cay", false, None).await;

    handle_disconnect(&state, "ABC234", "host").await;

    let g1_events = drain(&mut rx_g1);
    let g2_events = drain(&mut rx_g2);
    assert!(
        g1_events.iter().any(|e| e["event"] == "promoted_to_host"),
        "first remaining connection must be promoted: {g1_events:?}"
    );
    assert!(
        g2_events.iter().all(|e| e["event"] != "promoted_to_host"),
        "promotion must target exactly one connection: {g2_events:?}"
    );
    assert!(g1_events.iter().any(|e| e["event"] == "participant_left"));
    assert!(g2_events.iter().any(|e| e["event"] == "participant_left"));

    // Authority was durable before the notification.
    let session = state
        .sessions
        .get("ABC234")
        .await?
        .ok_or_else(|| anyhow::anyhow!("session gone"))?;
    assert_eq!(session.host_connection_id, "g1");
    Ok(())
}

#[tokio::test]
async fn sole_host_disconnect_leaves_session_hostless() -> anyhow::Result<()> {
    let state = test_state();
    seed_session(&state, "ABC234").await?;
    state.credentials.put("cred-1", &record("user-1")).await?;

    let (_rx, _) = join(&state, "c1", "ABC234", "Ann", true, Some("cred-1")).await;
    handle_disconnect(&state, "ABC234", "c1").await;

    let session = state
        .sessions
        .get("ABC234")
        .await?
        .ok_or_else(|| anyhow::anyhow!("session gone"))?;
    assert!(session.host_connection_id.is_empty());
    assert_eq!(session.host_credential_ref, "cred-1", "credential claim survives");

    // Rejoin with the same credential reclaims host.
    let (mut rx, _) = join(&state, "c2", "ABC234", "Ann", true, Some("cred-1")).await;
    assert_eq!(next_event(&mut rx)?["is_host"], true);
    Ok(())
}

#[tokio::test]
async fn set_playlist_is_host_only() -> anyhow::Result<()> {
    let state = test_state();
    seed_session(&state, "ABC234").await?;

    let (mut rx_host, _) = join(&state, "host", "ABC234", "Ann", true, None).await;
    let (_rx_guest, _) = join(&state, "guest", "ABC234", "Ben", false, None).await;

    assert!(
        !handle_set_playlist(&state, "ABC234", "guest", "P1", "https://m.example/p1", None).await
    );
    let session = state
        .sessions
        .get("ABC234")
        .await?
        .ok_or_else(|| anyhow::anyhow!("session gone"))?;
    assert!(session.external_playlist_ref.is_none(), "guest link must be ignored");

    assert!(
        handle_set_playlist(
            &state,
            "ABC234",
            "host",
            "P1",
            "https://m.example/p1",
            Some("Road Trip")
        )
        .await
    );
    let session = state
        .sessions
        .get("ABC234")
        .await?
        .ok_or_else(|| anyhow::anyhow!("session gone"))?;
    assert_eq!(session.external_playlist_ref.as_deref(), Some("P1"));
    assert_eq!(session.name, "Road Trip");

    let events = drain(&mut rx_host);
    assert!(events.iter().any(|e| e["event"] == "playlist_linked"
        && e["external_playlist_ref"] == "P1"
        && e["name"] == "Road Trip"));
    Ok(())
}

#[tokio::test]
async fn stale_reconciliation_does_not_overwrite_a_relinked_session() -> anyhow::Result<()> {
    let state = test_state();
    seed_session(&state, "ABC234").await?;
    assert!(link_playlist(&state, "ABC234", "P2", "https://m.example/p2", None, None).await?);

    // A reconciliation that was fetched for the previously linked playlist
    // must be discarded, not committed as canonical.
    let stale = vec![Track {
        id: "i1".into(),
        external_id: "P1-A".into(),
        title: "old".into(),
        artist: "a".into(),
        album: String::new(),
        duration_secs: 60,
        album_art: String::new(),
    }];
    let committed = apply_synced_tracks(&state, "ABC234", "P1", stale, None, None).await?;
    assert!(!committed);

    let session = state
        .sessions
        .get("ABC234")
        .await?
        .ok_or_else(|| anyhow::anyhow!("session gone"))?;
    assert_eq!(session.external_playlist_ref.as_deref(), Some("P2"));
    assert!(session.tracks.is_empty(), "stale tracks must not land: {:?}", session.tracks);
    Ok(())
}

#[tokio::test]
async fn credential_expiry_reaches_every_backed_session() -> anyhow::Result<()> {
    let state = test_state();
    seed_session(&state, "ABC234").await?;
    seed_session(&state, "XYZ789").await?;
    seed_session(&state, "QQQ222").await?;
    state.credentials.put("cred-1", &record("user-1")).await?;

    let (mut rx_a, _) = join(&state, "a", "ABC234", "Ann", true, Some("cred-1")).await;
    let (mut rx_b, _) = join(&state, "b", "XYZ789", "Ann", true, Some("cred-1")).await;
    let (mut rx_c, _) = join(&state, "c", "QQQ222", "Ben", true, None).await;

    broadcast_credential_expired(&state, "cred-1").await;

    assert!(drain(&mut rx_a).iter().any(|e| e["event"] == "credential_expired"));
    assert!(drain(&mut rx_b).iter().any(|e| e["event"] == "credential_expired"));
    assert!(
        drain(&mut rx_c).iter().all(|e| e["event"] != "credential_expired"),
        "unrelated session must not be notified"
    );
    Ok(())
}
