//! TMDB client for movies and TV shows
//!
//! Search payloads carry numeric genre ids; the full id→name table is
//! fetched once on first use and cached for the life of the client.

use crate::core::error::{LendError, Result};
use crate::providers::{truncate_results, MediaKind, MediaRecord, ProviderClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const BASE_URL: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// One row from /search/movie or /search/tv; movies use
/// `title`/`release_date`, shows use `name`/`first_air_date`.
#[derive(Debug, Deserialize)]
struct SearchResult {
    id: i64,
    title: Option<String>,
    name: Option<String>,
    original_title: Option<String>,
    original_name: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f64>,
    #[serde(default)]
    genre_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct GenreListResponse {
    #[serde(default)]
    genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    id: i64,
    name: String,
}

pub struct TmdbClient {
    http: reqwest::Client,
    api_key: Option<String>,
    genre_cache: Mutex<Option<HashMap<i64, String>>>,
}

impl TmdbClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            genre_cache: Mutex::new(None),
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LendError::CredentialError("tmdb api key not configured".to_string()))
    }

    async fn fetch_search(&self, path: &str, query: &str) -> Result<SearchResponse> {
        let response = self
            .http
            .get(format!("{}{}", BASE_URL, path))
            .query(&[
                ("api_key", self.api_key()?),
                ("query", query),
                ("include_adult", "false"),
            ])
            .send()
            .await
            .map_err(|e| LendError::ProviderUnavailable(format!("tmdb: {}", e)))?;

        if !response.status().is_success() {
            return Err(LendError::ProviderError(format!(
                "tmdb returned status {}",
                response.status()
            )));
        }

        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| LendError::ProviderError(format!("tmdb payload: {}", e)))
    }

    /// Resolve genre ids to names through the cached table. The table
    /// is loaded lazily; a load failure maps the ids to nothing rather
    /// than failing the search, and the next call retries the load.
    async fn genre_names(&self, ids: &[i64]) -> Vec<String> {
        let mut cache = self.genre_cache.lock().await;
        if cache.is_none() {
            match self.load_genres().await {
                Ok(table) => *cache = Some(table),
                Err(e) => {
                    warn!(error = %e, "tmdb genre table load failed");
                    return Vec::new();
                }
            }
        }

        let table = cache.as_ref().unwrap();
        ids.iter()
            .filter_map(|id| table.get(id).cloned())
            .collect()
    }

    async fn load_genres(&self) -> Result<HashMap<i64, String>> {
        let response = self
            .http
            .get(format!("{}/genre/movie/list", BASE_URL))
            .query(&[("api_key", self.api_key()?)])
            .send()
            .await
            .map_err(|e| LendError::ProviderUnavailable(format!("tmdb: {}", e)))?;

        if !response.status().is_success() {
            return Err(LendError::ProviderError(format!(
                "tmdb genre list returned status {}",
                response.status()
            )));
        }

        let list = response
            .json::<GenreListResponse>()
            .await
            .map_err(|e| LendError::ProviderError(format!("tmdb payload: {}", e)))?;

        debug!(genres = list.genres.len(), "loaded tmdb genre table");
        Ok(list.genres.into_iter().map(|g| (g.id, g.name)).collect())
    }

    async fn record_from_result(&self, kind: MediaKind, result: SearchResult) -> MediaRecord {
        let (title, subtitle, release_date) = match kind {
            MediaKind::Movie => (result.title, result.original_title, result.release_date),
            _ => (result.name, result.original_name, result.first_air_date),
        };

        let mut record = MediaRecord::new(
            kind,
            result.id.to_string(),
            title.unwrap_or_else(|| "Unknown Title".to_string()),
        );
        record.subtitle = subtitle.filter(|s| !s.is_empty() && *s != record.title);
        record.description = result.overview.filter(|s| !s.is_empty());
        record.cover_url = result
            .poster_path
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}{}", IMAGE_BASE_URL, p));
        record.release_date = release_date.filter(|s| !s.is_empty());
        record.rating = result.vote_average;

        let genres = self.genre_names(&result.genre_ids).await;
        if !genres.is_empty() {
            record.genres = Some(genres.join(", "));
        }
        record
    }
}

#[async_trait]
impl ProviderClient for TmdbClient {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>> {
        let path = match kind {
            MediaKind::Movie => "/search/movie",
            MediaKind::TvShow => "/search/tv",
            other => {
                return Err(LendError::ProviderError(format!(
                    "tmdb does not serve kind {}",
                    other
                )));
            }
        };

        let response = self.fetch_search(path, query).await?;
        let mut records = Vec::with_capacity(response.results.len().min(crate::providers::RESULT_LIMIT));
        for result in response.results {
            records.push(self.record_from_result(kind, result).await);
        }
        Ok(truncate_results(records))
    }
}
