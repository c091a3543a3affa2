//! IGDB client for video games
//!
//! IGDB takes a POST body in its own query DSL and authenticates with
//! a Twitch client id header plus a bearer token from the shared
//! credential cache. Like Spotify, a 401 forces one refresh and retry.

use crate::core::error::{LendError, Result};
use crate::providers::credentials::{CredentialCache, PROVIDER_IGDB};
use crate::providers::{truncate_results, MediaKind, MediaRecord, ProviderClient, RESULT_LIMIT};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

const GAMES_URL: &str = "https://api.igdb.com/v4/games";

#[derive(Debug, Deserialize)]
struct Game {
    id: i64,
    name: Option<String>,
    summary: Option<String>,
    cover: Option<Cover>,
    first_release_date: Option<i64>,
    rating: Option<f64>,
    #[serde(default)]
    genres: Vec<Named>,
    #[serde(default)]
    platforms: Vec<Named>,
    #[serde(default)]
    involved_companies: Vec<InvolvedCompany>,
}

#[derive(Debug, Deserialize)]
struct Cover {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct InvolvedCompany {
    #[serde(default)]
    developer: bool,
    company: Option<Named>,
}

fn join_names(items: &[Named]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(
            items
                .iter()
                .map(|n| n.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

/// Cover URLs arrive protocol-relative with a thumbnail size token
fn full_cover_url(url: &str) -> String {
    let sized = url.replace("t_thumb", "t_cover_big");
    if sized.starts_with("//") {
        format!("https:{}", sized)
    } else {
        sized
    }
}

/// Release dates are unix timestamps; only the year is kept
fn year_from_timestamp(ts: i64) -> Option<String> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.format("%Y").to_string())
}

pub struct IgdbClient {
    http: reqwest::Client,
    credentials: Arc<CredentialCache>,
    client_id: Option<String>,
    games_url: String,
}

impl IgdbClient {
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<CredentialCache>,
        client_id: Option<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            client_id,
            games_url: GAMES_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_games_url(mut self, url: String) -> Self {
        self.games_url = url;
        self
    }

    fn build_query(query: &str) -> String {
        // Quotes inside the search term would break out of the DSL string
        let escaped = query.replace('"', "");
        format!(
            "fields name, cover.url, first_release_date, summary, genres.name, \
             platforms.name, rating, involved_companies.company.name, \
             involved_companies.developer; \
             search \"{}\"; limit {}; where category = 0;",
            escaped, RESULT_LIMIT
        )
    }

    async fn fetch_games(&self, query: &str) -> Result<Vec<Game>> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| LendError::CredentialError("igdb client id not configured".to_string()))?;
        let body = Self::build_query(query);
        let mut token = self.credentials.get_token(PROVIDER_IGDB).await?;

        for attempt in 0..2 {
            let response = self
                .http
                .post(&self.games_url)
                .header("Client-ID", client_id)
                .bearer_auth(&token)
                .body(body.clone())
                .send()
                .await
                .map_err(|e| LendError::ProviderUnavailable(format!("igdb: {}", e)))?;

            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                if attempt == 0 {
                    warn!("igdb rejected token, refreshing once");
                    token = self.credentials.force_refresh(PROVIDER_IGDB).await?;
                    continue;
                }
                return Err(LendError::AuthError(
                    "igdb rejected a freshly exchanged token".to_string(),
                ));
            }

            if !response.status().is_success() {
                return Err(LendError::ProviderError(format!(
                    "igdb returned status {}",
                    response.status()
                )));
            }

            return response
                .json::<Vec<Game>>()
                .await
                .map_err(|e| LendError::ProviderError(format!("igdb payload: {}", e)));
        }

        unreachable!("fetch loop returns on every branch")
    }

    fn record_from_game(game: Game) -> MediaRecord {
        let mut record = MediaRecord::new(
            MediaKind::VideoGame,
            game.id.to_string(),
            game.name.unwrap_or_else(|| "Unknown Title".to_string()),
        );
        record.description = game.summary.filter(|s| !s.is_empty());
        record.cover_url = game
            .cover
            .and_then(|c| c.url)
            .map(|url| full_cover_url(&url));
        record.release_date = game.first_release_date.and_then(year_from_timestamp);
        record.rating = game.rating.map(|r| (r * 10.0).round() / 10.0);
        record.genres = join_names(&game.genres);
        record.platforms = join_names(&game.platforms);

        let developers: Vec<Named> = game
            .involved_companies
            .into_iter()
            .filter(|c| c.developer)
            .filter_map(|c| c.company)
            .collect();
        record.publisher = join_names(&developers);
        record
    }
}

#[async_trait]
impl ProviderClient for IgdbClient {
    fn name(&self) -> &'static str {
        "igdb"
    }

    fn enabled(&self) -> bool {
        self.client_id.is_some()
    }

    async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>> {
        if kind != MediaKind::VideoGame {
            return Err(LendError::ProviderError(format!(
                "igdb does not serve kind {}",
                kind
            )));
        }

        let games = self.fetch_games(query).await?;
        Ok(truncate_results(
            games.into_iter().map(Self::record_from_game).collect(),
        ))
    }
}
