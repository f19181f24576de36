// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::session::Track;

fn store() -> MemoryStore {
    MemoryStore::new(
        Duration::from_secs(3600),
        Duration::from_secs(3600),
        Duration::from_secs(600),
    )
}

fn short_lived() -> MemoryStore {
    MemoryStore::new(
        Duration::from_millis(20),
        Duration::from_millis(20),
        Duration::from_millis(20),
    )
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

#[tokio::test]
async fn session_round_trip_preserves_tracks() -> anyhow::Result<()> {
    let store = store();
    let mut session = Session::new("ABC234".into(), "test".into());
    session.tracks = vec![Track {
        id: "i1".into(),
        external_id: "t1".into(),
        title: "one".into(),
        artist: "a".into(),
        album: String::new(),
        duration_secs: 60,
        album_art: String::new(),
    }];
    SessionStore::put(&store, &session).await?;

    SessionStore::touch(&store, "ABC234").await?;
    let back = SessionStore::get(&store, "ABC234").await?.ok_or_else(|| anyhow::anyhow!("gone"))?;
    assert_eq!(back.tracks, session.tracks);
    assert_eq!(back.name, "test");
    Ok(())
}

#[tokio::test]
async fn expired_sessions_are_absent() -> anyhow::Result<()> {
    let store = short_lived();
    let session = Session::new("ABC234".into(), "test".into());
    SessionStore::put(&store, &session).await?;
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(SessionStore::get(&store, "ABC234").await?.is_none());
    assert!(SessionStore::list(&store).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn touch_extends_the_deadline() -> anyhow::Result<()> {
    let store = MemoryStore::new(
        Duration::from_millis(60),
        Duration::from_secs(1),
        Duration::from_secs(1),
    );
    let session = Session::new("ABC234".into(), "test".into());
    SessionStore::put(&store, &session).await?;

    tokio::time::sleep(Duration::from_millis(40)).await;
    SessionStore::touch(&store, "ABC234").await?;
    tokio::time::sleep(Duration::from_millis(40)).await;

    // 80ms since put, but only 40ms since touch: still live.
    assert!(SessionStore::get(&store, "ABC234").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn alias_resolves_to_canonical() -> anyhow::Result<()> {
    let store = store();
    CredentialStore::put(&store, "tok-canon", &record("user-1")).await?;
    store.alias("tok-new", "tok-canon").await?;

    assert_eq!(store.resolve("tok-new").await?, "tok-canon");
    assert_eq!(store.resolve("tok-canon").await?, "tok-canon");
    assert_eq!(store.resolve("unknown").await?, "unknown");

    assert_eq!(store.find_by_user("user-1").await?.as_deref(), Some("tok-canon"));
    Ok(())
}

#[tokio::test]
async fn delete_clears_user_index() -> anyhow::Result<()> {
    let store = store();
    CredentialStore::put(&store, "tok-1", &record("user-1")).await?;
    CredentialStore::delete(&store, "tok-1").await?;
    assert!(CredentialStore::get(&store, "tok-1").await?.is_none());
    assert!(store.find_by_user("user-1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn pending_auth_is_single_use_and_expires() -> anyhow::Result<()> {
    let store = store();
    let pending = PendingAuth {
        code_verifier: "v".into(),
        session_code: "ABC234".into(),
        credential_token: "tok-1".into(),
    };
    store.put_pending("state-1", &pending).await?;

    assert!(store.pending_for_session("ABC234").await?);
    assert!(!store.pending_for_session("ZZZZZ2").await?);

    let taken = store.take_pending("state-1").await?;
    assert_eq!(taken.map(|p| p.session_code), Some("ABC234".to_owned()));
    assert!(store.take_pending("state-1").await?.is_none(), "single use");
    assert!(!store.pending_for_session("ABC234").await?);

    let store = short_lived();
    store.put_pending("state-2", &pending).await?;
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(store.take_pending("state-2").await?.is_none(), "expired");
    Ok(())
}
