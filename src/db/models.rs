//! Database models
//!
//! Data structures representing ledger tables

use crate::providers::{MediaKind, MediaRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Active loan row, keyed by `(user_id, kind, external_id)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub kind: MediaKind,
    pub external_id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Option<String>,
    pub artists: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub release_date: Option<String>,
    pub duration_secs: Option<i64>,
    pub genres: Option<String>,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
    pub upc: Option<String>,
    pub rating: Option<f64>,
    pub platforms: Option<String>,
    pub players: Option<String>,
    pub due_date: NaiveDate,
    pub reminded: bool,
    pub created_at: String,
}

impl Loan {
    /// Days until the due date, negative when overdue
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        (self.due_date - today).num_days()
    }

    /// Rebuild the canonical record from the denormalized loan fields
    pub fn to_record(&self) -> MediaRecord {
        MediaRecord {
            kind: self.kind,
            external_id: self.external_id.clone(),
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            authors: self.authors.clone(),
            artists: self.artists.clone(),
            description: self.description.clone(),
            cover_url: self.cover_url.clone(),
            release_date: self.release_date.clone(),
            duration_secs: self.duration_secs,
            genres: self.genres.clone(),
            publisher: self.publisher.clone(),
            isbn: self.isbn.clone(),
            upc: self.upc.clone(),
            rating: self.rating,
            platforms: self.platforms.clone(),
            players: self.players.clone(),
        }
    }
}

/// Return audit log row, written atomically with the loan delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLogEntry {
    pub id: i64,
    pub actor_id: i64,
    pub user_id: i64,
    pub kind: MediaKind,
    pub external_id: String,
    pub title: String,
    pub timestamp: String,
}

/// Aggregate ledger counts for the status surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_loans: usize,
    pub overdue_count: usize,
    pub kind_counts: Vec<(String, usize)>,
}
