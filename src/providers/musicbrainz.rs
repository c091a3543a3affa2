//! MusicBrainz client, the keyless fallback for physical music
//!
//! Release search plus a best-effort Cover Art Archive lookup per
//! release. MusicBrainz asks clients to identify themselves, so every
//! request carries a static User-Agent.

use crate::core::error::{LendError, Result};
use crate::providers::{truncate_results, MediaKind, MediaRecord, ProviderClient, RESULT_LIMIT};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const RELEASE_URL: &str = "https://musicbrainz.org/ws/2/release";
const COVER_ART_URL: &str = "https://coverartarchive.org/release";
const USER_AGENT: &str = concat!("lendkeeper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct Release {
    id: String,
    title: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    date: Option<String>,
    packaging: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoverArtResponse {
    #[serde(default)]
    images: Vec<CoverImage>,
}

#[derive(Debug, Deserialize)]
struct CoverImage {
    image: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize, Default)]
struct Thumbnails {
    small: Option<String>,
}

/// A release counts as vinyl when its packaging names the format
fn is_vinyl_packaging(packaging: Option<&str>) -> bool {
    packaging.is_some_and(|p| p.contains("Vinyl"))
}

pub struct MusicBrainzClient {
    http: reqwest::Client,
}

impl MusicBrainzClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch_releases(&self, query: &str) -> Result<Vec<Release>> {
        let response = self
            .http
            .get(RELEASE_URL)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .query(&[
                ("query", query),
                ("fmt", "json"),
                ("limit", &RESULT_LIMIT.to_string()),
            ])
            .send()
            .await
            .map_err(|e| LendError::ProviderUnavailable(format!("musicbrainz: {}", e)))?;

        if !response.status().is_success() {
            return Err(LendError::ProviderError(format!(
                "musicbrainz returned status {}",
                response.status()
            )));
        }

        let payload = response
            .json::<ReleaseResponse>()
            .await
            .map_err(|e| LendError::ProviderError(format!("musicbrainz payload: {}", e)))?;
        Ok(payload.releases)
    }

    /// Cover art is hosted separately and misses for most releases;
    /// any failure here degrades to "no cover".
    async fn fetch_cover(&self, release_id: &str) -> Option<String> {
        let response = self
            .http
            .get(format!("{}/{}", COVER_ART_URL, release_id))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(release_id = release_id, "no cover art for release");
            return None;
        }

        let payload = response.json::<CoverArtResponse>().await.ok()?;
        let first = payload.images.into_iter().next()?;
        first.thumbnails.small.or(first.image)
    }

    /// Packaging decides the kind: a release pressed on vinyl is
    /// vinyl no matter which kind the search asked for.
    fn record_from_release(release: &Release) -> MediaRecord {
        let kind = if is_vinyl_packaging(release.packaging.as_deref()) {
            MediaKind::Vinyl
        } else {
            MediaKind::MusicCd
        };
        let mut record = MediaRecord::new(
            kind,
            release.id.clone(),
            release
                .title
                .clone()
                .unwrap_or_else(|| "Unknown Title".to_string()),
        );

        let artists: Vec<&str> = release
            .artist_credit
            .iter()
            .filter_map(|c| c.name.as_deref())
            .collect();
        if !artists.is_empty() {
            record.artists = Some(artists.join(", "));
        }
        record.release_date = release.date.clone().filter(|s| !s.is_empty());
        record
    }
}

#[async_trait]
impl ProviderClient for MusicBrainzClient {
    fn name(&self) -> &'static str {
        "musicbrainz"
    }

    fn enabled(&self) -> bool {
        // Public API, no secrets
        true
    }

    async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>> {
        if !matches!(kind, MediaKind::Vinyl | MediaKind::MusicCd) {
            return Err(LendError::ProviderError(format!(
                "musicbrainz does not serve kind {}",
                kind
            )));
        }

        let releases = self.fetch_releases(query).await?;

        // For vinyl, prefer releases whose packaging says so; fall
        // back to the unfiltered list when none match.
        let selected: Vec<&Release> = if kind == MediaKind::Vinyl {
            let vinyl: Vec<&Release> = releases
                .iter()
                .filter(|r| is_vinyl_packaging(r.packaging.as_deref()))
                .collect();
            if vinyl.is_empty() {
                releases.iter().collect()
            } else {
                vinyl
            }
        } else {
            releases.iter().collect()
        };

        let mut records = Vec::with_capacity(selected.len());
        for release in selected {
            let mut record = Self::record_from_release(release);
            record.cover_url = self.fetch_cover(&release.id).await;
            records.push(record);
        }
        Ok(truncate_results(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vinyl_packaging_detection() {
        assert!(is_vinyl_packaging(Some("Gatefold Vinyl Sleeve")));
        assert!(is_vinyl_packaging(Some("Vinyl")));
        assert!(!is_vinyl_packaging(Some("Jewel Case")));
        assert!(!is_vinyl_packaging(None));
    }

    #[test]
    fn test_release_maps_to_record() {
        let release: Release = serde_json::from_value(serde_json::json!({
            "id": "f5093c06-23e3-404f-aeaa-40f72885ee3a",
            "title": "The Dark Side of the Moon",
            "artist-credit": [{"name": "Pink Floyd"}],
            "date": "1973-03-01",
            "packaging": "Gatefold Vinyl Sleeve"
        }))
        .unwrap();

        let record = MusicBrainzClient::record_from_release(&release);
        assert_eq!(record.kind, MediaKind::Vinyl);
        assert_eq!(record.title, "The Dark Side of the Moon");
        assert_eq!(record.artists.as_deref(), Some("Pink Floyd"));
        assert_eq!(record.release_date.as_deref(), Some("1973-03-01"));
    }

    #[test]
    fn test_artist_credit_entries_without_names_are_skipped() {
        let release: Release = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "title": "Split Single",
            "artist-credit": [{"name": "Band A"}, {"joinphrase": " / "}, {"name": "Band B"}]
        }))
        .unwrap();

        let record = MusicBrainzClient::record_from_release(&release);
        assert_eq!(record.artists.as_deref(), Some("Band A, Band B"));
    }

    #[test]
    fn test_packaging_reclassifies_kind() {
        let vinyl: Release = serde_json::from_value(serde_json::json!({
            "id": "a",
            "title": "Pressing",
            "packaging": "Vinyl"
        }))
        .unwrap();
        let cd: Release = serde_json::from_value(serde_json::json!({
            "id": "b",
            "title": "Pressing",
            "packaging": "Jewel Case"
        }))
        .unwrap();

        assert_eq!(
            MusicBrainzClient::record_from_release(&vinyl).kind,
            MediaKind::Vinyl
        );
        assert_eq!(
            MusicBrainzClient::record_from_release(&cd).kind,
            MediaKind::MusicCd
        );
    }

    #[test]
    fn test_cover_payload_prefers_small_thumbnail() {
        let payload: CoverArtResponse = serde_json::from_value(serde_json::json!({
            "images": [{
                "image": "https://archive.org/full.jpg",
                "thumbnails": {"small": "https://archive.org/small.jpg"}
            }]
        }))
        .unwrap();

        let first = payload.images.into_iter().next().unwrap();
        assert_eq!(
            first.thumbnails.small.or(first.image).as_deref(),
            Some("https://archive.org/small.jpg")
        );
    }
}
