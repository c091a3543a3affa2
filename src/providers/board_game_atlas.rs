//! Board Game Atlas client

use crate::core::error::{LendError, Result};
use crate::providers::{truncate_results, MediaKind, MediaRecord, ProviderClient, RESULT_LIMIT};
use async_trait::async_trait;
use serde::Deserialize;

const SEARCH_URL: &str = "https://api.boardgameatlas.com/api/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    games: Vec<Game>,
}

#[derive(Debug, Deserialize)]
struct Game {
    id: String,
    name: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    year_published: Option<i64>,
    average_user_rating: Option<f64>,
    min_players: Option<i64>,
    max_players: Option<i64>,
    min_playtime: Option<i64>,
    primary_publisher: Option<Publisher>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    name: Option<String>,
}

/// Player count rendered as a "min-max" range, with `?` for missing ends
fn players_range(min: Option<i64>, max: Option<i64>) -> Option<String> {
    if min.is_none() && max.is_none() {
        return None;
    }
    let fmt = |n: Option<i64>| n.map_or("?".to_string(), |n| n.to_string());
    Some(format!("{}-{}", fmt(min), fmt(max)))
}

pub struct BoardGameAtlasClient {
    http: reqwest::Client,
    client_id: Option<String>,
}

impl BoardGameAtlasClient {
    pub fn new(http: reqwest::Client, client_id: Option<String>) -> Self {
        Self { http, client_id }
    }

    fn record_from_game(game: Game) -> MediaRecord {
        let mut record = MediaRecord::new(
            MediaKind::BoardGame,
            game.id.clone(),
            game.name.unwrap_or_else(|| "Unknown Title".to_string()),
        );
        record.description = game.description.filter(|s| !s.is_empty());
        record.cover_url = game.image_url.filter(|s| !s.is_empty());
        record.release_date = game.year_published.map(|y| y.to_string());
        record.rating = game
            .average_user_rating
            .map(|r| (r * 10.0).round() / 10.0);
        record.players = players_range(game.min_players, game.max_players);
        // Playtime arrives in minutes
        record.duration_secs = game.min_playtime.map(|m| m * 60);
        record.publisher = game.primary_publisher.and_then(|p| p.name);
        record
    }
}

#[async_trait]
impl ProviderClient for BoardGameAtlasClient {
    fn name(&self) -> &'static str {
        "board_game_atlas"
    }

    fn enabled(&self) -> bool {
        self.client_id.is_some()
    }

    async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>> {
        if kind != MediaKind::BoardGame {
            return Err(LendError::ProviderError(format!(
                "board_game_atlas does not serve kind {}",
                kind
            )));
        }

        let client_id = self.client_id.as_deref().ok_or_else(|| {
            LendError::CredentialError("board_game_atlas client id not configured".to_string())
        })?;

        let response = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("name", query),
                ("client_id", client_id),
                ("limit", &RESULT_LIMIT.to_string()),
            ])
            .send()
            .await
            .map_err(|e| LendError::ProviderUnavailable(format!("board_game_atlas: {}", e)))?;

        if !response.status().is_success() {
            return Err(LendError::ProviderError(format!(
                "board_game_atlas returned status {}",
                response.status()
            )));
        }

        let payload = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| LendError::ProviderError(format!("board_game_atlas payload: {}", e)))?;

        Ok(truncate_results(
            payload
                .games
                .into_iter()
                .map(Self::record_from_game)
                .collect(),
        ))
    }
}
