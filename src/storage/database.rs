//! SQLite database management with migrations
//!
//! Provides durable storage for cached embeddings, session records and the
//! suggestion history consulted by the novelty filter.

use crate::error::{GeistError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file and bring the schema up to date
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GeistError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);

        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| GeistError::Store(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| GeistError::Store(format!("Failed to get connection: {}", e)))?;

            // WAL lets concurrent sessions read while another writes
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| GeistError::Store(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Record a materialised session; re-running a date replaces its row
    pub fn record_session(
        &self,
        session_id: &str,
        session_date: &str,
        seed: u64,
        note_count: usize,
    ) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO sessions (session_date, session_id, seed, note_count, created_at)
             VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))",
            params![session_date, session_id, seed as i64, note_count as i64],
        )?;
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let embedding_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;

        let session_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

        let suggestion_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM suggestion_history", [], |row| {
                row.get(0)
            })?;

        Ok(DbStats {
            embedding_count: embedding_count as usize,
            session_count: session_count as usize,
            suggestion_count: suggestion_count as usize,
        })
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub embedding_count: usize,
    pub session_count: usize,
    pub suggestion_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Cached semantic sub-vectors, one per note
    CREATE TABLE embeddings (
        note_path TEXT PRIMARY KEY,
        vector BLOB NOT NULL,
        version_tag TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        model TEXT NOT NULL,
        computed_at INTEGER NOT NULL
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model);

    -- One row per session date
    CREATE TABLE sessions (
        session_date TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        seed INTEGER NOT NULL,
        note_count INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );

    -- Suggestions emitted by past sessions
    CREATE TABLE suggestion_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_date TEXT NOT NULL,
        geist_id TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX idx_history_date ON suggestion_history(session_date);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let _db = Database::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).unwrap();

        let conn = db.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        drop(Database::new(&db_path).unwrap());
        let db = Database::new(&db_path).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.embedding_count, 0);
    }

    #[test]
    fn test_schema_exists() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).unwrap();
        let conn = db.get_conn().unwrap();

        for table in ["embeddings", "sessions", "suggestion_history"] {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();

            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_record_session_replaces_same_date() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        db.record_session("first", "2024-03-01", 20240301, 10).unwrap();
        db.record_session("second", "2024-03-01", 20240301, 12).unwrap();
        db.record_session("third", "2024-03-02", 20240302, 12).unwrap();

        assert_eq!(db.stats().unwrap().session_count, 2);
    }
}
