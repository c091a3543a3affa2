//! Repository pattern implementation for the lending ledger
//!
//! The `LoanRepository` is the only component that mutates loan and
//! return-log rows. The uniqueness constraint on
//! `(user_id, kind, external_id)` is the concurrency guard for
//! competing borrow attempts on the same key.

use crate::core::error::{LendError, Result};
use crate::db::manager::DatabaseManager;
use crate::db::models::{LedgerStats, Loan, ReturnLogEntry};
use crate::providers::{MediaKind, MediaRecord};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

const LOAN_COLUMNS: &str = "id, user_id, username, kind, external_id, title, subtitle, \
     authors, artists, description, cover_url, release_date, duration, genres, \
     publisher, isbn, upc, rating, platforms, players, due_date, reminded, created_at";

const DATE_FMT: &str = "%Y-%m-%d";

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    let kind_str: String = row.get(3)?;
    let kind = kind_str.parse::<MediaKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let due_str: String = row.get(20)?;
    let due_date = NaiveDate::parse_from_str(&due_str, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(20, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let reminded: i64 = row.get(21)?;

    Ok(Loan {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        kind,
        external_id: row.get(4)?,
        title: row.get(5)?,
        subtitle: row.get(6)?,
        authors: row.get(7)?,
        artists: row.get(8)?,
        description: row.get(9)?,
        cover_url: row.get(10)?,
        release_date: row.get(11)?,
        duration_secs: row.get(12)?,
        genres: row.get(13)?,
        publisher: row.get(14)?,
        isbn: row.get(15)?,
        upc: row.get(16)?,
        rating: row.get(17)?,
        platforms: row.get(18)?,
        players: row.get(19)?,
        due_date,
        reminded: reminded != 0,
        created_at: row.get(22)?,
    })
}

/// Repository for loan rows and the return audit log
pub struct LoanRepository {
    db: Arc<DatabaseManager>,
}

impl LoanRepository {
    /// Create a new LoanRepository
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Get a reference to the database manager
    pub fn db(&self) -> &Arc<DatabaseManager> {
        &self.db
    }

    /// Upsert a loan keyed by `(user_id, kind, external_id)`.
    ///
    /// On conflict the denormalized display fields and due date are
    /// refreshed and `reminded` is reset, so re-borrowing extends the
    /// existing loan instead of failing. Repeating the same call is a
    /// no-op beyond refreshing metadata.
    pub async fn borrow(
        &self,
        user_id: i64,
        username: &str,
        record: &MediaRecord,
        due_date: NaiveDate,
    ) -> Result<()> {
        let username = username.to_string();
        let record = record.clone();
        let due = due_date.format(DATE_FMT).to_string();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO media_items (
                        user_id, username, kind, external_id, title, subtitle,
                        authors, artists, description, cover_url, release_date,
                        duration, genres, publisher, isbn, upc, rating, platforms,
                        players, due_date, reminded
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, 0)
                    ON CONFLICT (user_id, kind, external_id) DO UPDATE SET
                        username = excluded.username,
                        title = excluded.title,
                        subtitle = excluded.subtitle,
                        authors = excluded.authors,
                        artists = excluded.artists,
                        description = excluded.description,
                        cover_url = excluded.cover_url,
                        release_date = excluded.release_date,
                        duration = excluded.duration,
                        genres = excluded.genres,
                        publisher = excluded.publisher,
                        isbn = excluded.isbn,
                        upc = excluded.upc,
                        rating = excluded.rating,
                        platforms = excluded.platforms,
                        players = excluded.players,
                        due_date = excluded.due_date,
                        reminded = 0",
                    params![
                        user_id,
                        username,
                        record.kind.as_str(),
                        record.external_id,
                        record.title,
                        record.subtitle,
                        record.authors,
                        record.artists,
                        record.description,
                        record.cover_url,
                        record.release_date,
                        record.duration_secs,
                        record.genres,
                        record.publisher,
                        record.isbn,
                        record.upc,
                        record.rating,
                        record.platforms,
                        record.players,
                        due,
                    ],
                )
                .map_err(LendError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    /// Find a loan by its identity key
    pub async fn find(
        &self,
        user_id: i64,
        kind: MediaKind,
        external_id: &str,
    ) -> Result<Option<Loan>> {
        let external_id = external_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {} FROM media_items \
                         WHERE user_id = ?1 AND kind = ?2 AND external_id = ?3",
                        LOAN_COLUMNS
                    ),
                    params![user_id, kind.as_str(), external_id],
                    loan_from_row,
                )
                .optional()
                .map_err(LendError::DatabaseError)
            })
            .await
    }

    /// Return a loan: delete the row and append a return-log entry in
    /// one transaction, yielding the pre-delete snapshot.
    ///
    /// `None` means the user does not hold the item; nothing is
    /// written in that case.
    pub async fn return_loan(
        &self,
        actor_id: i64,
        user_id: i64,
        kind: MediaKind,
        external_id: &str,
    ) -> Result<Option<Loan>> {
        let external_id = external_id.to_string();
        self.db
            .transaction(move |tx| {
                let loan = tx
                    .query_row(
                        &format!(
                            "SELECT {} FROM media_items \
                             WHERE user_id = ?1 AND kind = ?2 AND external_id = ?3",
                            LOAN_COLUMNS
                        ),
                        params![user_id, kind.as_str(), external_id],
                        loan_from_row,
                    )
                    .optional()
                    .map_err(LendError::DatabaseError)?;

                let Some(loan) = loan else {
                    return Ok(None);
                };

                tx.execute(
                    "DELETE FROM media_items \
                     WHERE user_id = ?1 AND kind = ?2 AND external_id = ?3",
                    params![user_id, kind.as_str(), external_id],
                )
                .map_err(LendError::DatabaseError)?;

                tx.execute(
                    "INSERT INTO return_log (actor_id, user_id, kind, external_id, title) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![actor_id, user_id, kind.as_str(), external_id, loan.title],
                )
                .map_err(LendError::DatabaseError)?;

                Ok(Some(loan))
            })
            .await
    }

    /// All loans for a user, optionally filtered by kind, due date ascending
    pub async fn list_for_user(
        &self,
        user_id: i64,
        kind: Option<MediaKind>,
    ) -> Result<Vec<Loan>> {
        self.db
            .execute(move |conn| {
                let (sql, params): (String, Vec<Box<dyn rusqlite::ToSql>>) = match kind {
                    Some(kind) => (
                        format!(
                            "SELECT {} FROM media_items \
                             WHERE user_id = ?1 AND kind = ?2 ORDER BY due_date ASC",
                            LOAN_COLUMNS
                        ),
                        vec![Box::new(user_id), Box::new(kind.as_str())],
                    ),
                    None => (
                        format!(
                            "SELECT {} FROM media_items \
                             WHERE user_id = ?1 ORDER BY due_date ASC",
                            LOAN_COLUMNS
                        ),
                        vec![Box::new(user_id)],
                    ),
                };

                let mut stmt = conn.prepare(&sql).map_err(LendError::DatabaseError)?;
                let loans = stmt
                    .query_map(
                        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                        loan_from_row,
                    )
                    .map_err(LendError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LendError::DatabaseError)?;

                Ok(loans)
            })
            .await
    }

    /// All active loans, due date ascending
    pub async fn list_all(&self) -> Result<Vec<Loan>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM media_items ORDER BY due_date ASC",
                        LOAN_COLUMNS
                    ))
                    .map_err(LendError::DatabaseError)?;
                let loans = stmt
                    .query_map([], loan_from_row)
                    .map_err(LendError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LendError::DatabaseError)?;
                Ok(loans)
            })
            .await
    }

    /// Number of active loans held by a user
    pub async fn count_for_user(&self, user_id: i64) -> Result<usize> {
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM media_items WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get::<_, i64>(0),
                )
                .map(|n| n as usize)
                .map_err(LendError::DatabaseError)
            })
            .await
    }

    /// Loans whose due date lies strictly in the past
    pub async fn list_overdue(&self, today: NaiveDate) -> Result<Vec<Loan>> {
        let today = today.format(DATE_FMT).to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM media_items \
                         WHERE due_date < ?1 ORDER BY due_date ASC",
                        LOAN_COLUMNS
                    ))
                    .map_err(LendError::DatabaseError)?;
                let loans = stmt
                    .query_map(params![today], loan_from_row)
                    .map_err(LendError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LendError::DatabaseError)?;
                Ok(loans)
            })
            .await
    }

    /// Loans eligible for a reminder: not yet reminded and due on or
    /// before the cutoff. The inclusive predicate keeps already
    /// overdue loans eligible until their one reminder succeeds.
    pub async fn due_for_reminder(&self, cutoff: NaiveDate) -> Result<Vec<Loan>> {
        let cutoff = cutoff.format(DATE_FMT).to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM media_items \
                         WHERE reminded = 0 AND due_date <= ?1 ORDER BY due_date ASC",
                        LOAN_COLUMNS
                    ))
                    .map_err(LendError::DatabaseError)?;
                let loans = stmt
                    .query_map(params![cutoff], loan_from_row)
                    .map_err(LendError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LendError::DatabaseError)?;
                Ok(loans)
            })
            .await
    }

    /// Mark one loan as reminded, keyed by the exact loan identity.
    /// Returns whether a row was updated.
    pub async fn mark_reminded(
        &self,
        user_id: i64,
        kind: MediaKind,
        external_id: &str,
    ) -> Result<bool> {
        let external_id = external_id.to_string();
        self.db
            .execute(move |conn| {
                let updated = conn
                    .execute(
                        "UPDATE media_items SET reminded = 1 \
                         WHERE user_id = ?1 AND kind = ?2 AND external_id = ?3",
                        params![user_id, kind.as_str(), external_id],
                    )
                    .map_err(LendError::DatabaseError)?;
                Ok(updated > 0)
            })
            .await
    }

    /// Aggregate counts for the status surface
    pub async fn stats(&self, today: NaiveDate) -> Result<LedgerStats> {
        let today = today.format(DATE_FMT).to_string();
        self.db
            .execute(move |conn| {
                let total_loans: i64 = conn
                    .query_row("SELECT COUNT(*) FROM media_items", [], |row| row.get(0))
                    .map_err(LendError::DatabaseError)?;

                let overdue_count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM media_items WHERE due_date < ?1",
                        params![today],
                        |row| row.get(0),
                    )
                    .map_err(LendError::DatabaseError)?;

                let mut stmt = conn
                    .prepare(
                        "SELECT kind, COUNT(*) FROM media_items \
                         GROUP BY kind ORDER BY kind",
                    )
                    .map_err(LendError::DatabaseError)?;
                let kind_counts = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                    })
                    .map_err(LendError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LendError::DatabaseError)?;

                Ok(LedgerStats {
                    total_loans: total_loans as usize,
                    overdue_count: overdue_count as usize,
                    kind_counts,
                })
            })
            .await
    }

    /// Most recent return-log entries, newest first
    pub async fn recent_returns(&self, limit: usize) -> Result<Vec<ReturnLogEntry>> {
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, actor_id, user_id, kind, external_id, title, timestamp \
                         FROM return_log ORDER BY id DESC LIMIT ?1",
                    )
                    .map_err(LendError::DatabaseError)?;
                let entries = stmt
                    .query_map(params![limit as i64], |row| {
                        let kind_str: String = row.get(3)?;
                        let kind = kind_str.parse::<MediaKind>().map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                3,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?;
                        Ok(ReturnLogEntry {
                            id: row.get(0)?,
                            actor_id: row.get(1)?,
                            user_id: row.get(2)?,
                            kind,
                            external_id: row.get(4)?,
                            title: row.get(5)?,
                            timestamp: row.get(6)?,
                        })
                    })
                    .map_err(LendError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LendError::DatabaseError)?;
                Ok(entries)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> LoanRepository {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        LoanRepository::new(db)
    }

    fn book(external_id: &str) -> MediaRecord {
        let mut record = MediaRecord::new(MediaKind::Book, external_id, "Gravitation");
        record.authors = Some("Misner, Thorne, Wheeler".to_string());
        record.isbn = Some(external_id.to_string());
        record
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_borrow_creates_unreminded_loan() {
        let repo = repo();
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 9, 13))
            .await
            .unwrap();

        let loan = repo
            .find(1, MediaKind::Book, "9780306406157")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loan.title, "Gravitation");
        assert_eq!(loan.due_date, day(2026, 9, 13));
        assert!(!loan.reminded);
    }

    #[tokio::test]
    async fn test_reborrow_upserts_and_resets_reminded() {
        let repo = repo();
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 9, 13))
            .await
            .unwrap();
        assert!(repo
            .mark_reminded(1, MediaKind::Book, "9780306406157")
            .await
            .unwrap());

        // Re-borrow with a later due date: same row, reminded cleared
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 9, 20))
            .await
            .unwrap();

        let loans = repo.list_for_user(1, None).await.unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].due_date, day(2026, 9, 20));
        assert!(!loans[0].reminded);
    }

    #[tokio::test]
    async fn test_return_deletes_and_logs_atomically() {
        let repo = repo();
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 9, 13))
            .await
            .unwrap();

        let snapshot = repo
            .return_loan(1, 1, MediaKind::Book, "9780306406157")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.title, "Gravitation");

        assert!(repo
            .find(1, MediaKind::Book, "9780306406157")
            .await
            .unwrap()
            .is_none());

        let log = repo.recent_returns(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].external_id, "9780306406157");
        assert_eq!(log[0].title, "Gravitation");
    }

    #[tokio::test]
    async fn test_return_of_unheld_item_writes_nothing() {
        let repo = repo();
        let result = repo
            .return_loan(1, 1, MediaKind::Book, "9780306406157")
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(repo.recent_returns(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_for_user_ordered_by_due_date() {
        let repo = repo();
        repo.borrow(1, "reader", &book("1111111111116"), day(2026, 9, 20))
            .await
            .unwrap();
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 9, 13))
            .await
            .unwrap();
        repo.borrow(
            1,
            "reader",
            &MediaRecord::new(MediaKind::Movie, "603", "The Matrix"),
            day(2026, 9, 6),
        )
        .await
        .unwrap();

        let loans = repo.list_for_user(1, None).await.unwrap();
        assert_eq!(loans.len(), 3);
        assert_eq!(loans[0].title, "The Matrix");
        assert_eq!(loans[1].external_id, "9780306406157");

        let books = repo.list_for_user(1, Some(MediaKind::Book)).await.unwrap();
        assert_eq!(books.len(), 2);
    }

    #[tokio::test]
    async fn test_count_is_per_user() {
        let repo = repo();
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 9, 13))
            .await
            .unwrap();
        repo.borrow(2, "other", &book("9780306406157"), day(2026, 9, 13))
            .await
            .unwrap();

        assert_eq!(repo.count_for_user(1).await.unwrap(), 1);
        assert_eq!(repo.count_for_user(2).await.unwrap(), 1);
        assert_eq!(repo.count_for_user(3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overdue_is_strictly_past() {
        let repo = repo();
        let today = day(2026, 8, 30);
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 8, 29))
            .await
            .unwrap();
        repo.borrow(1, "reader", &book("1111111111116"), today)
            .await
            .unwrap();

        let overdue = repo.list_overdue(today).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].external_id, "9780306406157");
    }

    #[tokio::test]
    async fn test_due_for_reminder_is_inclusive() {
        let repo = repo();
        let cutoff = day(2026, 8, 31);
        // Overdue, due at cutoff, and beyond cutoff
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 8, 20))
            .await
            .unwrap();
        repo.borrow(1, "reader", &book("1111111111116"), cutoff)
            .await
            .unwrap();
        repo.borrow(1, "reader", &book("9780141439600"), day(2026, 9, 20))
            .await
            .unwrap();

        let due = repo.due_for_reminder(cutoff).await.unwrap();
        assert_eq!(due.len(), 2);

        // Marked loans drop out of the selection
        assert!(repo
            .mark_reminded(1, MediaKind::Book, "9780306406157")
            .await
            .unwrap());
        let due = repo.due_for_reminder(cutoff).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].external_id, "1111111111116");
    }

    #[tokio::test]
    async fn test_mark_reminded_misses_unknown_key() {
        let repo = repo();
        assert!(!repo
            .mark_reminded(1, MediaKind::Book, "missing")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stats() {
        let repo = repo();
        let today = day(2026, 8, 30);
        repo.borrow(1, "reader", &book("9780306406157"), day(2026, 8, 20))
            .await
            .unwrap();
        repo.borrow(
            2,
            "other",
            &MediaRecord::new(MediaKind::Movie, "603", "The Matrix"),
            day(2026, 9, 10),
        )
        .await
        .unwrap();

        let stats = repo.stats(today).await.unwrap();
        assert_eq!(stats.total_loans, 2);
        assert_eq!(stats.overdue_count, 1);
        assert_eq!(
            stats.kind_counts,
            vec![("book".to_string(), 1), ("movie".to_string(), 1)]
        );
    }
}
