// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External music catalog: service trait, metadata projection helpers.

pub mod client;

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::credential::AccessContext;
use crate::session::Track;

/// Minimum album-art width considered displayable.
const MIN_ART_WIDTH: u32 = 160;

/// Why a catalog call failed.
#[derive(Debug)]
pub enum MusicError {
    /// The resource is gone or access to it was revoked (404/403). The
    /// caller should tell the room rather than retry.
    Gone(String),
    /// Rate limit, upstream 5xx or network failure; retryable.
    Unavailable(String),
}

impl fmt::Display for MusicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gone(msg) => write!(f, "resource gone: {msg}"),
            Self::Unavailable(msg) => write!(f, "music service unavailable: {msg}"),
        }
    }
}

impl std::error::Error for MusicError {}

/// Playlist header as the external service reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageMeta {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
}

/// Track metadata as the external service reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackMeta {
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: String,
    /// ISO-8601 duration, e.g. `PT3M20S`.
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub images: Vec<ImageMeta>,
}

/// Operations against the external music catalog.
#[async_trait]
pub trait MusicService: Send + Sync {
    async fn playlist(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
    ) -> Result<PlaylistInfo, MusicError>;

    /// Ordered external track ids of a playlist, capped at `max` items.
    async fn playlist_item_ids(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
        max: usize,
    ) -> Result<Vec<String>, MusicError>;

    /// Metadata for a set of external ids. Unknown ids are simply absent
    /// from the result; the response order is not meaningful.
    async fn tracks_meta(
        &self,
        access: &AccessContext,
        ids: &[String],
    ) -> Result<Vec<TrackMeta>, MusicError>;

    async fn add_item(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
        external_id: &str,
    ) -> Result<(), MusicError>;

    async fn remove_item(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
        external_id: &str,
    ) -> Result<(), MusicError>;

    /// Push name/description/visibility back to the external playlist.
    async fn update_playlist(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
        name: Option<&str>,
        description: &str,
    ) -> Result<(), MusicError>;
}

/// Parse an ISO-8601 duration of the `PT#H#M#S` family into seconds.
/// Malformed input yields 0 rather than an error; a missing duration is
/// not worth failing a whole reconciliation over.
pub fn parse_duration_secs(iso: &str) -> u64 {
    let Some(rest) = iso.strip_prefix("PT") else {
        return 0;
    };
    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().unwrap_or(0);
        digits.clear();
        match c {
            'H' => total = total.saturating_add(value.saturating_mul(3600)),
            'M' => total = total.saturating_add(value.saturating_mul(60)),
            'S' => total = total.saturating_add(value),
            _ => return 0,
        }
    }
    total
}

/// Pick album art: the narrowest image at least [`MIN_ART_WIDTH`] wide,
/// otherwise the first image, otherwise empty.
pub fn pick_album_art(images: &[ImageMeta]) -> String {
    images
        .iter()
        .filter(|i| i.width.is_some_and(|w| w >= MIN_ART_WIDTH))
        .min_by_key(|i| i.width.unwrap_or(u32::MAX))
        .or_else(|| images.first())
        .map(|i| i.url.clone())
        .unwrap_or_default()
}

/// Project external metadata into the session's track shape. The internal
/// id is freshly minted because one external track can occupy several
/// playlist positions.
pub fn into_track(meta: &TrackMeta) -> Track {
    let artist = if meta.artists.is_empty() {
        "Unknown Artist".to_owned()
    } else {
        meta.artists.join(", ")
    };
    Track {
        id: uuid::Uuid::new_v4().to_string(),
        external_id: meta.external_id.clone(),
        title: meta.title.clone(),
        artist,
        album: meta.album.clone(),
        duration_secs: parse_duration_secs(&meta.duration),
        album_art: pick_album_art(&meta.images),
    }
}

#[cfg(test)]
#[path = "meta_tests.rs"]
mod tests;
