// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and track model, share codes, host election.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::state::epoch_secs;

/// Alphabet for share codes: uppercase alphanumeric minus the visually
/// ambiguous characters (0/O, 1/I/L).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of a share code.
pub const CODE_LEN: usize = 6;

/// Maximum display-name length after sanitizing.
const MAX_NAME_LEN: usize = 32;

/// One collaborative session, keyed by its share code.
///
/// `tracks` mirrors the external playlist and is only ever replaced
/// wholesale once a playlist is linked — reconciliation re-establishes
/// ground truth, it never patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub code: String,
    /// Connection id of the current host; empty when no host is connected.
    #[serde(default)]
    pub host_connection_id: String,
    /// Canonical credential token of the host, shared across their devices.
    #[serde(default)]
    pub host_credential_ref: String,
    /// Display name of the host, resolved once from the credential record.
    #[serde(default)]
    pub host_display_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_playlist_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_playlist_url: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub tracks: Vec<Track>,
    pub created_at: u64,
    /// Free text supplied by the host, used to reconstruct the external
    /// playlist description together with contributor credits.
    #[serde(default)]
    pub user_description: String,
    /// Guest names credited in the external playlist description.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<String>,
}

impl Session {
    pub fn new(code: String, name: String) -> Self {
        Self {
            code,
            host_connection_id: String::new(),
            host_credential_ref: String::new(),
            host_display_name: String::new(),
            name,
            external_playlist_ref: None,
            external_playlist_url: None,
            is_public: false,
            tracks: Vec::new(),
            created_at: epoch_secs(),
            user_description: String::new(),
            contributors: Vec::new(),
        }
    }

    /// Whether a host connection is currently recognized.
    pub fn has_host(&self) -> bool {
        !self.host_connection_id.is_empty()
    }

    /// The description pushed to the external playlist: the host's text
    /// plus contributor credits.
    pub fn external_description(&self) -> String {
        if self.contributors.is_empty() {
            return self.user_description.clone();
        }
        let credits = self.contributors.join(", ");
        if self.user_description.is_empty() {
            format!("With tracks from {credits}")
        } else {
            format!("{}\n\nWith tracks from {credits}", self.user_description)
        }
    }
}

/// One track in the cached session view.
///
/// `id` is freshly minted on every reconciliation because the same external
/// track can appear at several playlist positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub external_id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    pub duration_secs: u64,
    #[serde(default)]
    pub album_art: String,
}

/// Generate a random share code.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Whether `code` has the shape of a share code. Checked before any store
/// lookup so malformed input never touches the backend.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

/// Decide whether a connection presenting `credential_ref` may take host
/// authority over `session`.
///
/// Used identically on first join and on reconnection: authority is granted
/// when no host is connected, or when the caller's canonical credential
/// matches the session's — the same real person reclaiming host status from
/// another device does not displace anyone.
pub fn elect_host(session: &Session, credential_ref: Option<&str>) -> bool {
    if !session.has_host() {
        return true;
    }
    match credential_ref {
        Some(cred) => !session.host_credential_ref.is_empty() && cred == session.host_credential_ref,
        None => false,
    }
}

/// Sanitize a participant display name: trim, drop control and zero-width
/// characters, cap the length, fall back to "Guest" when nothing is left.
pub fn sanitize_display_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control() && !is_zero_width(*c))
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim().to_owned();
    if cleaned.is_empty() {
        "Guest".to_owned()
    } else {
        cleaned
    }
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}')
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
