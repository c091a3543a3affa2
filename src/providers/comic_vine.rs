//! Comic Vine client, searching volume resources

use crate::core::error::{LendError, Result};
use crate::providers::{truncate_results, MediaKind, MediaRecord, ProviderClient, RESULT_LIMIT};
use async_trait::async_trait;
use serde::Deserialize;

const SEARCH_URL: &str = "https://comicvine.gamespot.com/api/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: i64,
    name: Option<String>,
    description: Option<String>,
    image: Option<VolumeImage>,
    start_year: Option<String>,
    publisher: Option<Publisher>,
}

#[derive(Debug, Deserialize)]
struct VolumeImage {
    medium_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    name: Option<String>,
}

pub struct ComicVineClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl ComicVineClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    fn record_from_volume(volume: Volume) -> MediaRecord {
        let mut record = MediaRecord::new(
            MediaKind::Comic,
            volume.id.to_string(),
            volume.name.unwrap_or_else(|| "Unknown Title".to_string()),
        );
        record.description = volume.description.filter(|s| !s.is_empty());
        record.cover_url = volume.image.and_then(|i| i.medium_url);
        record.release_date = volume.start_year.filter(|s| !s.is_empty());
        record.publisher = volume.publisher.and_then(|p| p.name);
        record
    }
}

#[async_trait]
impl ProviderClient for ComicVineClient {
    fn name(&self) -> &'static str {
        "comic_vine"
    }

    fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>> {
        if kind != MediaKind::Comic {
            return Err(LendError::ProviderError(format!(
                "comic_vine does not serve kind {}",
                kind
            )));
        }

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LendError::CredentialError("comic_vine api key not configured".to_string())
        })?;

        let response = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("api_key", api_key),
                ("format", "json"),
                ("query", query),
                ("resources", "volume"),
                ("limit", &RESULT_LIMIT.to_string()),
            ])
            .send()
            .await
            .map_err(|e| LendError::ProviderUnavailable(format!("comic_vine: {}", e)))?;

        if !response.status().is_success() {
            return Err(LendError::ProviderError(format!(
                "comic_vine returned status {}",
                response.status()
            )));
        }

        let payload = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| LendError::ProviderError(format!("comic_vine payload: {}", e)))?;

        Ok(truncate_results(
            payload
                .results
                .into_iter()
                .map(Self::record_from_volume)
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_maps_to_record() {
        let volume: Volume = serde_json::from_value(serde_json::json!({
            "id": 18058,
            "name": "Watchmen",
            "description": "Twelve-issue series.",
            "image": {"medium_url": "https://comicvine.gamespot.com/a/watchmen.jpg"},
            "start_year": "1986",
            "publisher": {"name": "DC Comics"}
        }))
        .unwrap();

        let record = ComicVineClient::record_from_volume(volume);
        assert_eq!(record.external_id, "18058");
        assert_eq!(record.title, "Watchmen");
        assert_eq!(record.release_date.as_deref(), Some("1986"));
        assert_eq!(record.publisher.as_deref(), Some("DC Comics"));
    }

    #[test]
    fn test_bare_volume_maps_to_record() {
        let volume: Volume = serde_json::from_value(serde_json::json!({"id": 1})).unwrap();
        let record = ComicVineClient::record_from_volume(volume);
        assert_eq!(record.title, "Unknown Title");
        assert!(record.cover_url.is_none());
        assert!(record.publisher.is_none());
    }

    #[test]
    fn test_enabled_requires_key() {
        assert!(ComicVineClient::new(reqwest::Client::new(), Some("k".into())).enabled());
        assert!(!ComicVineClient::new(reqwest::Client::new(), None).enabled());
    }
}
