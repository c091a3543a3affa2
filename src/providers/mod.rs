//! External catalog provider clients
//!
//! One stateless HTTP wrapper per external catalog, all normalizing
//! their payloads into [`MediaRecord`]. Clients truncate result lists
//! to [`RESULT_LIMIT`] and perform unit normalization (seconds, not
//! milliseconds; 4-digit years where a provider returns full dates)
//! before anything reaches the resolver.

pub mod board_game_atlas;
pub mod comic_vine;
pub mod credentials;
pub mod google_books;
pub mod igdb;
pub mod musicbrainz;
pub mod spotify;
pub mod tmdb;

pub use board_game_atlas::BoardGameAtlasClient;
pub use comic_vine::ComicVineClient;
pub use credentials::{CredentialCache, HttpTokenExchange, TokenExchange, TokenResponse};
pub use google_books::GoogleBooksClient;
pub use igdb::IgdbClient;
pub use musicbrainz::MusicBrainzClient;
pub use spotify::SpotifyClient;
pub use tmdb::TmdbClient;

use crate::core::error::{LendError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum candidates a provider may return, bounding downstream
/// selection cost
pub const RESULT_LIMIT: usize = 5;

/// Media category of a loanable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Book,
    Movie,
    TvShow,
    MusicCd,
    Vinyl,
    Song,
    VideoGame,
    BoardGame,
    Comic,
    Magazine,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Book => "book",
            MediaKind::Movie => "movie",
            MediaKind::TvShow => "tv_show",
            MediaKind::MusicCd => "music_cd",
            MediaKind::Vinyl => "vinyl",
            MediaKind::Song => "song",
            MediaKind::VideoGame => "video_game",
            MediaKind::BoardGame => "board_game",
            MediaKind::Comic => "comic",
            MediaKind::Magazine => "magazine",
        }
    }

    /// All known kinds, in dispatch-table order
    pub fn all() -> &'static [MediaKind] {
        &[
            MediaKind::Book,
            MediaKind::Movie,
            MediaKind::TvShow,
            MediaKind::MusicCd,
            MediaKind::Vinyl,
            MediaKind::Song,
            MediaKind::VideoGame,
            MediaKind::BoardGame,
            MediaKind::Comic,
            MediaKind::Magazine,
        ]
    }

    /// Kinds resolved by an identifier (checksum-validated before any
    /// network call) rather than a free-text query
    pub fn is_identifier_based(&self) -> bool {
        matches!(self, MediaKind::Book)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = LendError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "book" => Ok(MediaKind::Book),
            "movie" => Ok(MediaKind::Movie),
            "tv_show" => Ok(MediaKind::TvShow),
            "music_cd" => Ok(MediaKind::MusicCd),
            "vinyl" => Ok(MediaKind::Vinyl),
            "song" => Ok(MediaKind::Song),
            "video_game" => Ok(MediaKind::VideoGame),
            "board_game" => Ok(MediaKind::BoardGame),
            "comic" => Ok(MediaKind::Comic),
            "magazine" => Ok(MediaKind::Magazine),
            other => Err(LendError::InvalidRequest(format!(
                "Unknown media kind: {}",
                other
            ))),
        }
    }
}

/// Canonical media record, the normalized result of one provider call.
///
/// Immutable once returned; never persisted as-is (its fields are
/// denormalized into a loan row on borrow).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub kind: MediaKind,
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub artists: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    /// Always seconds
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub genres: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub platforms: Option<String>,
    #[serde(default)]
    pub players: Option<String>,
}

impl MediaRecord {
    /// A record with only the identity fields set
    pub fn new(kind: MediaKind, external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            external_id: external_id.into(),
            title: title.into(),
            subtitle: None,
            authors: None,
            artists: None,
            description: None,
            cover_url: None,
            release_date: None,
            duration_secs: None,
            genres: None,
            publisher: None,
            isbn: None,
            upc: None,
            rating: None,
            platforms: None,
            players: None,
        }
    }
}

/// Common interface for all catalog clients.
///
/// Each `search` call is a fresh HTTP round trip; the returned
/// sequence is finite, ordered by provider relevance, and capped at
/// [`RESULT_LIMIT`]. Non-2xx responses and decode failures surface as
/// `ProviderError`, which the resolver maps to "no candidates".
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Short provider name for logs and the credential cache
    fn name(&self) -> &'static str;

    /// Whether the required secrets for this provider are configured.
    /// A disabled provider is skipped by the resolver without failing
    /// the process.
    fn enabled(&self) -> bool;

    /// Search the catalog for the given kind and query
    async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>>;
}

/// Truncate a provider result list to the shared candidate cap
pub(crate) fn truncate_results(mut records: Vec<MediaRecord>) -> Vec<MediaRecord> {
    records.truncate(RESULT_LIMIT);
    records
}
