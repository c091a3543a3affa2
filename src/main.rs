//! Lendkeeper - community media lending service
//!
//! Loan ledger, external catalog resolution, reminder scheduler, and
//! a read-only HTTP status surface.

use lendkeeper::{api, core, db, providers, reminder, resolver};

use anyhow::Result;
use providers::credentials::{ClientCredentials, PROVIDER_IGDB, PROVIDER_SPOTIFY};
use providers::{
    BoardGameAtlasClient, ComicVineClient, CredentialCache, GoogleBooksClient, HttpTokenExchange,
    IgdbClient, MediaKind, MusicBrainzClient, SpotifyClient, TmdbClient,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Initialize logging system based on configuration
    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting Lendkeeper v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Server configuration"
    );
    info!(path = ?config.database.path, "Database configuration");

    // Initialize database
    let db = Arc::new(db::DatabaseManager::new(
        &config.database.path,
        config.database.connection_pool_size as u32,
        std::time::Duration::from_millis(config.database.busy_timeout),
    )?);
    info!("Database initialized");

    // Shared outbound HTTP client with the configured timeout
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.providers.http_timeout))
        .build()?;

    let resolver = Arc::new(build_resolver(&config.providers, http.clone()));
    info!(
        kinds = ?resolver
            .available_kinds()
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>(),
        "Resolver ready"
    );

    let repository = Arc::new(db::LoanRepository::new(db.clone()));
    let lending = Arc::new(core::LendingService::new(
        repository.clone(),
        resolver.clone(),
        config.lending.clone(),
    ));

    // Reminder delivery: webhook when configured, log-only otherwise
    let notifier: Arc<dyn reminder::Notifier> = match &config.notifications.webhook_url {
        Some(url) => {
            info!(url = %url, "Reminder delivery via webhook");
            Arc::new(reminder::WebhookNotifier::new(http.clone(), url.clone()))
        }
        None => {
            info!("No webhook configured, reminders go to the log");
            Arc::new(reminder::LogNotifier)
        }
    };

    let scheduler = Arc::new(reminder::ReminderScheduler::new(
        repository,
        notifier,
        &config.lending,
        &config.notifications,
    ));
    tokio::spawn(scheduler.run());

    // Start serving (blocks until shutdown signal)
    let state = api::AppState {
        lending,
        resolver,
        started_at: chrono::Utc::now(),
    };
    let server = api::ApiServer::new(config.server.clone(), state);
    server.serve().await?;

    Ok(())
}

/// Wire every configured provider into the kind dispatch table
fn build_resolver(
    providers_config: &core::config::ProvidersConfig,
    http: reqwest::Client,
) -> resolver::Resolver {
    let mut credentials = HashMap::new();
    if let (Some(id), Some(secret)) = (
        &providers_config.spotify_client_id,
        &providers_config.spotify_client_secret,
    ) {
        credentials.insert(
            PROVIDER_SPOTIFY.to_string(),
            ClientCredentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            },
        );
    }
    if let (Some(id), Some(secret)) = (
        &providers_config.igdb_client_id,
        &providers_config.igdb_client_secret,
    ) {
        credentials.insert(
            PROVIDER_IGDB.to_string(),
            ClientCredentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            },
        );
    }

    let spotify_enabled = credentials.contains_key(PROVIDER_SPOTIFY);
    let credential_cache = Arc::new(CredentialCache::new(Arc::new(HttpTokenExchange::new(
        http.clone(),
        credentials,
    ))));

    let google_books = Arc::new(GoogleBooksClient::new(
        http.clone(),
        providers_config.google_books_api_key.clone(),
    ));
    let tmdb = Arc::new(TmdbClient::new(
        http.clone(),
        providers_config.tmdb_api_key.clone(),
    ));
    let spotify = Arc::new(SpotifyClient::new(
        http.clone(),
        credential_cache.clone(),
        spotify_enabled,
    ));
    let musicbrainz = Arc::new(MusicBrainzClient::new(http.clone()));
    let igdb = Arc::new(IgdbClient::new(
        http.clone(),
        credential_cache,
        providers_config.igdb_client_id.clone(),
    ));
    let board_game_atlas = Arc::new(BoardGameAtlasClient::new(
        http.clone(),
        providers_config.board_game_atlas_client_id.clone(),
    ));
    let comic_vine = Arc::new(ComicVineClient::new(
        http,
        providers_config.comic_vine_api_key.clone(),
    ));

    resolver::Resolver::builder()
        .route(MediaKind::Book, google_books.clone())
        .route(MediaKind::Magazine, google_books)
        .route(MediaKind::Movie, tmdb.clone())
        .route(MediaKind::TvShow, tmdb)
        .route_with_fallback(MediaKind::MusicCd, spotify.clone(), musicbrainz.clone())
        .route_with_fallback(MediaKind::Vinyl, spotify.clone(), musicbrainz)
        .route(MediaKind::Song, spotify)
        .route(MediaKind::VideoGame, igdb)
        .route(MediaKind::BoardGame, board_game_atlas)
        .route(MediaKind::Comic, comic_vine)
        .build()
}
