//! Spotify client for albums (CDs and vinyl) and tracks
//!
//! Bearer tokens come from the shared [`CredentialCache`]. A 401 from
//! the search endpoint forces one refresh and one retry; a second 401
//! surfaces as an auth error.

use crate::core::error::{LendError, Result};
use crate::providers::credentials::{CredentialCache, PROVIDER_SPOTIFY};
use crate::providers::{truncate_results, MediaKind, MediaRecord, ProviderClient, RESULT_LIMIT};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

const SEARCH_URL: &str = "https://api.spotify.com/v1/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    albums: Option<ItemPage<Album>>,
    tracks: Option<ItemPage<Track>>,
}

#[derive(Debug, Deserialize)]
struct ItemPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Album {
    id: String,
    name: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    images: Vec<Image>,
    release_date: Option<String>,
    #[serde(default)]
    external_ids: ExternalIds,
}

#[derive(Debug, Deserialize)]
struct Track {
    id: String,
    name: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
    album: Option<TrackAlbum>,
    duration_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TrackAlbum {
    #[serde(default)]
    images: Vec<Image>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize, Default)]
struct ExternalIds {
    upc: Option<String>,
}

fn join_artists(artists: &[Artist]) -> Option<String> {
    if artists.is_empty() {
        None
    } else {
        Some(
            artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: Arc<CredentialCache>,
    enabled: bool,
    search_url: String,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, credentials: Arc<CredentialCache>, enabled: bool) -> Self {
        Self {
            http,
            credentials,
            enabled,
            search_url: SEARCH_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_search_url(mut self, url: String) -> Self {
        self.search_url = url;
        self
    }

    async fn fetch_search(&self, query: &str, search_type: &str) -> Result<SearchResponse> {
        let mut token = self.credentials.get_token(PROVIDER_SPOTIFY).await?;

        for attempt in 0..2 {
            let response = self
                .http
                .get(&self.search_url)
                .bearer_auth(&token)
                .query(&[
                    ("q", query),
                    ("type", search_type),
                    ("limit", &RESULT_LIMIT.to_string()),
                ])
                .send()
                .await
                .map_err(|e| LendError::ProviderUnavailable(format!("spotify: {}", e)))?;

            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                if attempt == 0 {
                    warn!("spotify rejected token, refreshing once");
                    token = self.credentials.force_refresh(PROVIDER_SPOTIFY).await?;
                    continue;
                }
                return Err(LendError::AuthError(
                    "spotify rejected a freshly exchanged token".to_string(),
                ));
            }

            if !response.status().is_success() {
                return Err(LendError::ProviderError(format!(
                    "spotify returned status {}",
                    response.status()
                )));
            }

            return response
                .json::<SearchResponse>()
                .await
                .map_err(|e| LendError::ProviderError(format!("spotify payload: {}", e)));
        }

        unreachable!("search loop returns on every branch")
    }

    fn record_from_album(kind: MediaKind, album: Album) -> MediaRecord {
        let mut record = MediaRecord::new(
            kind,
            album.id.clone(),
            album.name.unwrap_or_else(|| "Unknown Title".to_string()),
        );
        record.artists = join_artists(&album.artists);
        record.cover_url = album.images.into_iter().next().map(|i| i.url);
        record.release_date = album.release_date.filter(|s| !s.is_empty());
        record.upc = album.external_ids.upc.filter(|s| !s.is_empty());
        record
    }

    fn record_from_track(track: Track) -> MediaRecord {
        let mut record = MediaRecord::new(
            MediaKind::Song,
            track.id.clone(),
            track.name.unwrap_or_else(|| "Unknown Title".to_string()),
        );
        record.artists = join_artists(&track.artists);
        if let Some(album) = track.album {
            record.cover_url = album.images.into_iter().next().map(|i| i.url);
            record.release_date = album.release_date.filter(|s| !s.is_empty());
        }
        // Spotify reports milliseconds
        record.duration_secs = track.duration_ms.map(|ms| ms / 1000);
        record
    }
}

#[async_trait]
impl ProviderClient for SpotifyClient {
    fn name(&self) -> &'static str {
        "spotify"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>> {
        match kind {
            MediaKind::MusicCd | MediaKind::Vinyl => {
                let response = self.fetch_search(query, "album").await?;
                let albums = response.albums.map(|p| p.items).unwrap_or_default();
                Ok(truncate_results(
                    albums
                        .into_iter()
                        .map(|album| Self::record_from_album(kind, album))
                        .collect(),
                ))
            }
            MediaKind::Song => {
                let response = self.fetch_search(query, "track").await?;
                let tracks = response.tracks.map(|p| p.items).unwrap_or_default();
                Ok(truncate_results(
                    tracks.into_iter().map(Self::record_from_track).collect(),
                ))
            }
            other => Err(LendError::ProviderError(format!(
                "spotify does not serve kind {}",
                other
            ))),
        }
    }
}
