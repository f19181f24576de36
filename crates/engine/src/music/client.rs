// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP implementation of [`MusicService`] against the external catalog API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::credential::AccessContext;
use crate::music::{MusicError, MusicService, PlaylistInfo, TrackMeta};

/// Max ids per metadata request; the catalog rejects larger batches.
const META_BATCH: usize = 50;

/// Page size for playlist item listing.
const PAGE_LIMIT: usize = 100;

pub struct HttpMusicService {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ItemEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    items: Vec<ItemEntry>,
}

#[derive(Debug, Deserialize)]
struct TracksResponse {
    tracks: Vec<TrackMeta>,
}

impl HttpMusicService {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, MusicError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            Err(MusicError::Gone(format!("{status}: {text}")))
        } else {
            Err(MusicError::Unavailable(format!("{status}: {text}")))
        }
    }
}

fn transport(e: reqwest::Error) -> MusicError {
    MusicError::Unavailable(e.to_string())
}

fn decode(e: reqwest::Error) -> MusicError {
    MusicError::Unavailable(format!("undecodable response: {e}"))
}

#[async_trait]
impl MusicService for HttpMusicService {
    async fn playlist(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
    ) -> Result<PlaylistInfo, MusicError> {
        let resp = self
            .http
            .get(format!("{}/v1/playlists/{playlist_ref}", self.base_url))
            .bearer_auth(&access.token)
            .send()
            .await
            .map_err(transport)?;
        Self::check(resp).await?.json().await.map_err(decode)
    }

    async fn playlist_item_ids(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
        max: usize,
    ) -> Result<Vec<String>, MusicError> {
        let mut ids = Vec::new();
        let mut offset = 0usize;
        while ids.len() < max {
            let limit = PAGE_LIMIT.min(max - ids.len());
            let resp = self
                .http
                .get(format!("{}/v1/playlists/{playlist_ref}/items", self.base_url))
                .query(&[("offset", offset.to_string()), ("limit", limit.to_string())])
                .bearer_auth(&access.token)
                .send()
                .await
                .map_err(transport)?;
            let page: ItemsPage = Self::check(resp).await?.json().await.map_err(decode)?;
            let count = page.items.len();
            ids.extend(page.items.into_iter().map(|i| i.id));
            if count < limit {
                break;
            }
            offset += count;
        }
        Ok(ids)
    }

    async fn tracks_meta(
        &self,
        access: &AccessContext,
        ids: &[String],
    ) -> Result<Vec<TrackMeta>, MusicError> {
        let mut out = Vec::with_capacity(ids.len());
        for batch in ids.chunks(META_BATCH) {
            let mut query = vec![("ids", batch.join(","))];
            if !access.country_code.is_empty() {
                query.push(("market", access.country_code.clone()));
            }
            let resp = self
                .http
                .get(format!("{}/v1/tracks", self.base_url))
                .query(&query)
                .bearer_auth(&access.token)
                .send()
                .await
                .map_err(transport)?;
            let body: TracksResponse = Self::check(resp).await?.json().await.map_err(decode)?;
            out.extend(body.tracks);
        }
        Ok(out)
    }

    async fn add_item(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
        external_id: &str,
    ) -> Result<(), MusicError> {
        let resp = self
            .http
            .post(format!("{}/v1/playlists/{playlist_ref}/items", self.base_url))
            .bearer_auth(&access.token)
            .json(&serde_json::json!({ "id": external_id }))
            .send()
            .await
            .map_err(transport)?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn remove_item(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
        external_id: &str,
    ) -> Result<(), MusicError> {
        let resp = self
            .http
            .delete(format!(
                "{}/v1/playlists/{playlist_ref}/items/{external_id}",
                self.base_url
            ))
            .bearer_auth(&access.token)
            .send()
            .await
            .map_err(transport)?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn update_playlist(
        &self,
        access: &AccessContext,
        playlist_ref: &str,
        name: Option<&str>,
        description: &str,
    ) -> Result<(), MusicError> {
        let mut body = serde_json::json!({ "description": description });
        if let Some(name) = name {
            body["name"] = serde_json::Value::String(name.to_owned());
        }
        let resp = self
            .http
            .put(format!("{}/v1/playlists/{playlist_ref}", self.base_url))
            .bearer_auth(&access.token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        Self::check(resp).await?;
        Ok(())
    }
}
