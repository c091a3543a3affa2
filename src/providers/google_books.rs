//! Google Books client
//!
//! Serves two kinds: books looked up by ISBN (at most one record) and
//! magazines found by free-text search scoped with `subject:magazine`.
//! An API key is optional; without one the volumes endpoint still
//! answers at a lower quota.

use crate::core::error::{LendError, Result};
use crate::providers::{truncate_results, MediaKind, MediaRecord, ProviderClient};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const VOLUMES_URL: &str = "https://www.googleapis.com/books/v1/volumes";

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(default)]
    id: String,
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    description: Option<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    image_links: Option<ImageLinks>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    identifier: Option<String>,
}

pub struct GoogleBooksClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    async fn fetch_volumes(&self, query: &str) -> Result<VolumesResponse> {
        let mut params = vec![("q", query.to_string()), ("maxResults", "5".to_string())];
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }

        let response = self
            .http
            .get(VOLUMES_URL)
            .query(&params)
            .send()
            .await
            .map_err(|e| LendError::ProviderUnavailable(format!("google_books: {}", e)))?;

        if !response.status().is_success() {
            return Err(LendError::ProviderError(format!(
                "google_books returned status {}",
                response.status()
            )));
        }

        response
            .json::<VolumesResponse>()
            .await
            .map_err(|e| LendError::ProviderError(format!("google_books payload: {}", e)))
    }

    fn record_from_volume(kind: MediaKind, external_id: String, volume: Volume) -> MediaRecord {
        let info = volume.volume_info;
        let mut record = MediaRecord::new(
            kind,
            external_id,
            info.title.unwrap_or_else(|| "Unknown Title".to_string()),
        );
        record.subtitle = info.subtitle.filter(|s| !s.is_empty());
        if !info.authors.is_empty() {
            record.authors = Some(info.authors.join(", "));
        }
        record.description = info.description.filter(|s| !s.is_empty());
        record.publisher = info.publisher.filter(|s| !s.is_empty());
        record.release_date = info.published_date.filter(|s| !s.is_empty());
        record.cover_url = info.image_links.and_then(|l| l.thumbnail);
        record.isbn = info
            .industry_identifiers
            .into_iter()
            .find_map(|id| id.identifier)
            .filter(|s| !s.is_empty());
        record
    }

    /// Look up a single book by its normalized ISBN. The ISBN is the
    /// external id regardless of any identifier in the payload.
    async fn fetch_by_isbn(&self, isbn: &str) -> Result<Vec<MediaRecord>> {
        let response = self.fetch_volumes(&format!("isbn:{}", isbn)).await?;
        let Some(volume) = response.items.into_iter().next() else {
            debug!(isbn = isbn, "no volume found for isbn");
            return Ok(Vec::new());
        };

        let mut record = Self::record_from_volume(MediaKind::Book, isbn.to_string(), volume);
        record.isbn = Some(isbn.to_string());
        Ok(vec![record])
    }

    async fn search_magazines(&self, query: &str) -> Result<Vec<MediaRecord>> {
        let response = self
            .fetch_volumes(&format!("{} subject:magazine", query))
            .await?;

        let records = response
            .items
            .into_iter()
            .map(|volume| {
                let id = volume.id.clone();
                Self::record_from_volume(MediaKind::Magazine, id, volume)
            })
            .collect();
        Ok(truncate_results(records))
    }
}

#[async_trait]
impl ProviderClient for GoogleBooksClient {
    fn name(&self) -> &'static str {
        "google_books"
    }

    fn enabled(&self) -> bool {
        // Works unkeyed, only at reduced quota
        true
    }

    async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>> {
        match kind {
            MediaKind::Book => self.fetch_by_isbn(query).await,
            MediaKind::Magazine => self.search_magazines(query).await,
            other => Err(LendError::ProviderError(format!(
                "google_books does not serve kind {}",
                other
            ))),
        }
    }
}
