// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint for the session coordination protocol.
//!
//! Each connection gets an unbounded outbound queue drained by a single
//! writer task, so every broadcast reaches one connection in the order the
//! server committed its mutations.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::events::{ClientEvent, ServerEvent};
use crate::rooms;
use crate::state::AppState;
use crate::sync;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // The session this connection has joined, if any.
    let mut joined: Option<String> = None;

    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(conn = %conn_id, error = %e, "unparseable client event");
                let _ = tx.send(
                    ServerEvent::Error { message: "unrecognized event".to_owned() }.to_json(),
                );
                continue;
            }
        };

        match event {
            ClientEvent::JoinSession { session_code, display_name, as_host, credential_token } => {
                if joined.is_some() {
                    let _ = tx.send(
                        ServerEvent::Error { message: "already joined a session".to_owned() }
                            .to_json(),
                    );
                    continue;
                }
                let ok = rooms::join_session(
                    &state,
                    &conn_id,
                    tx.clone(),
                    &session_code,
                    &display_name,
                    as_host,
                    credential_token.as_deref(),
                )
                .await;
                if ok {
                    joined = Some(session_code);
                }
            }
            ClientEvent::SetPlaylist { external_playlist_ref, external_playlist_url, name } => {
                let Some(code) = joined.clone() else {
                    let _ = tx.send(
                        ServerEvent::Error { message: "join a session first".to_owned() }.to_json(),
                    );
                    continue;
                };
                let applied = rooms::handle_set_playlist(
                    &state,
                    &code,
                    &conn_id,
                    &external_playlist_ref,
                    &external_playlist_url,
                    name.as_deref(),
                )
                .await;
                if applied {
                    // Reconcile off the read loop; the result reaches the
                    // room as a broadcast either way.
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(e) = sync::sync_playlist(&state, &code).await {
                            sync::handle_sync_failure(&state, &code, &e).await;
                        }
                    });
                }
            }
        }
    }

    if let Some(code) = joined {
        rooms::handle_disconnect(&state, &code, &conn_id).await;
    }
    writer.abort();
}
