//! # Refile Database
//!
//! Single SQLite database for the catalog, patterns and change requests,
//! stored at `.refile/refile.db` unless configured otherwise.

use crate::error::{RefileError, Result};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Shared database handle
#[derive(Clone)]
pub struct RefileDb {
    conn: Arc<Mutex<Connection>>,
}

impl RefileDb {
    /// Open database at a specific path, creating parent directories
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a shared connection for use by the managers
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(RefileError::lock)
    }

    /// Run schema migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [1],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1 - complete schema
    fn migrate_v1(conn: &Connection) -> Result<()> {
        // File catalog
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                extension TEXT NOT NULL DEFAULT '',
                directory TEXT NOT NULL,
                full_path TEXT NOT NULL UNIQUE,
                size INTEGER NOT NULL DEFAULT 0,
                extraction_failed INTEGER NOT NULL DEFAULT 0,
                extraction_failure_reason TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS exclusion_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                pattern TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Patterns with lifecycle stage, optimistic version and last test outcome
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS file_change_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                regex_pattern TEXT NOT NULL,
                replacement_format TEXT NOT NULL DEFAULT '{}',
                stage TEXT NOT NULL DEFAULT 'draft',
                version INTEGER NOT NULL DEFAULT 1,
                test_passed INTEGER,
                test_matched INTEGER,
                test_failed INTEGER,
                tested_regex TEXT,
                tested_format TEXT,
                tested_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS extracted_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL UNIQUE REFERENCES files(id) ON DELETE CASCADE,
                pattern_id INTEGER NOT NULL REFERENCES file_change_patterns(id) ON DELETE CASCADE,
                extracted_values TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Change requests keep no foreign key to patterns: the audit trail
        // outlives the pattern that produced it.
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS file_change_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_change_pattern_id INTEGER NOT NULL,
                rename_pattern_string TEXT NOT NULL,
                destination_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                success_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                details TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS change_targets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id INTEGER NOT NULL REFERENCES file_change_requests(id) ON DELETE CASCADE,
                original_file_id INTEGER NOT NULL,
                new_filename TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT,
                failure_kind TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_files_directory ON files(directory)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_extracted_pattern ON extracted_data(pattern_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_targets_request ON change_targets(request_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_requests_created ON file_change_requests(created_at)",
            [],
        )?;

        tracing::info!(
            "RefileDb initialized with schema version {}",
            SCHEMA_VERSION
        );

        Ok(())
    }
}

/// True when an insert/update hit a UNIQUE constraint
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Parse an RFC 3339 column, falling back to now for unreadable values
pub(crate) fn parse_timestamp(raw: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let db = RefileDb::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "files",
            "exclusion_patterns",
            "file_change_patterns",
            "extracted_data",
            "file_change_requests",
            "change_targets",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_schema_version_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refile.db");

        // Open twice - should not fail on second open
        drop(RefileDb::open_at(&path).unwrap());
        let db = RefileDb::open_at(&path).unwrap();
        let conn = db.lock().unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
