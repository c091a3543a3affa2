//! Database migrations
//!
//! Versioned schema migrations tracked in a `schema_migrations` table.

use crate::core::error::{LendError, Result};
use rusqlite::Connection;
use tracing::info;

/// Migration version tracking table
const MIGRATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Initial schema migration (version 1)
const MIGRATION_V1: &str = r#"
-- Active loans, one row per (user, kind, external id)
CREATE TABLE IF NOT EXISTS media_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    username TEXT,
    kind TEXT NOT NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    subtitle TEXT,
    authors TEXT,
    artists TEXT,
    description TEXT,
    cover_url TEXT,
    release_date TEXT,
    duration INTEGER,
    genres TEXT,
    publisher TEXT,
    isbn TEXT,
    upc TEXT,
    rating REAL,
    platforms TEXT,
    players TEXT,
    due_date TEXT NOT NULL,
    reminded INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (user_id, kind, external_id)
);

CREATE INDEX IF NOT EXISTS idx_media_items_user_id ON media_items (user_id);
CREATE INDEX IF NOT EXISTS idx_media_items_kind ON media_items (kind);
CREATE INDEX IF NOT EXISTS idx_media_items_due_date ON media_items (due_date);

-- Return audit log, append-only
CREATE TABLE IF NOT EXISTS return_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_return_log_user_id ON return_log (user_id);
CREATE INDEX IF NOT EXISTS idx_return_log_timestamp ON return_log (timestamp);
"#;

/// Ordered list of all migrations
const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1)];

/// Apply any migrations the database has not seen yet
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_TABLE)
        .map_err(LendError::DatabaseError)?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(LendError::DatabaseError)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        info!(version, "Applying database migration");

        let tx = conn.transaction().map_err(LendError::DatabaseError)?;
        tx.execute_batch(sql).map_err(LendError::DatabaseError)?;
        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?)",
            [version],
        )
        .map_err(LendError::DatabaseError)?;
        tx.commit().map_err(LendError::DatabaseError)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations_create_tables() {
        let mut conn = open_memory();
        run_migrations(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"media_items".to_string()));
        assert!(tables.contains(&"return_log".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = open_memory();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();

        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_loan_identity_is_unique() {
        let mut conn = open_memory();
        run_migrations(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO media_items (user_id, kind, external_id, title, due_date) \
             VALUES (1, 'book', '9780306406157', 'GR', '2026-09-13')",
            [],
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO media_items (user_id, kind, external_id, title, due_date) \
             VALUES (1, 'book', '9780306406157', 'GR', '2026-09-20')",
            [],
        );

        assert!(duplicate.is_err());
    }
}
