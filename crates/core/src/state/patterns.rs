//! # File Change Patterns
//!
//! Stored patterns with their lifecycle stage, optimistic version counter and
//! the outcome of the last test run. Transition rules live in
//! `workflow::lifecycle`; this module only persists.

use super::db::{is_unique_violation, parse_timestamp, RefileDb};
use super::paging::{ListQuery, Page};
use crate::error::{RefileError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const PATTERN_COLUMNS: &str = "id, name, regex_pattern, replacement_format, stage, version, \
     test_passed, test_matched, test_failed, tested_regex, tested_format, tested_at, \
     created_at, updated_at";

const SORTABLE: &[&str] = &["id", "name", "stage", "created_at", "updated_at"];

/// Lifecycle stage of a pattern
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternStage {
    /// Editable, not yet validated against files
    #[default]
    Draft,
    /// Last test passed for the current definition
    Tested,
    /// Frozen and usable for batch changes
    Confirmed,
}

impl PatternStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Tested => "tested",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "tested" => Self::Tested,
            "confirmed" => Self::Confirmed,
            _ => Self::Draft,
        }
    }
}

/// Outcome of the most recent test, bound to the definition that was tested
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestRecord {
    pub passed: bool,
    pub matched: usize,
    pub failed: usize,
    pub tested_at: DateTime<Utc>,
    pub regex_pattern: String,
    pub replacement_format: String,
}

impl TestRecord {
    /// True if this record was produced for exactly this definition
    pub fn covers(&self, regex_pattern: &str, replacement_format: &str) -> bool {
        self.regex_pattern == regex_pattern && self.replacement_format == replacement_format
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileChangePattern {
    pub id: i64,
    pub name: String,
    pub regex_pattern: String,
    /// JSON object of output field -> directive text
    pub replacement_format: String,
    pub stage: PatternStage,
    pub is_confirmed: bool,
    pub version: i64,
    #[serde(default)]
    pub last_test: Option<TestRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileChangePattern {
    pub fn defines(&self, regex_pattern: &str, replacement_format: &str) -> bool {
        self.regex_pattern == regex_pattern && self.replacement_format == replacement_format
    }

    /// A passing test exists for the current definition
    pub fn has_passing_test(&self) -> bool {
        self.last_test
            .as_ref()
            .is_some_and(|t| t.passed && t.covers(&self.regex_pattern, &self.replacement_format))
    }
}

pub struct PatternManager {
    conn: Arc<Mutex<Connection>>,
}

impl PatternManager {
    pub fn new(db: &RefileDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Insert a new Draft pattern
    pub fn create(
        &self,
        name: &str,
        regex_pattern: &str,
        replacement_format: &str,
    ) -> Result<FileChangePattern> {
        let now = Utc::now();
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        conn.execute(
            r#"
            INSERT INTO file_change_patterns
            (name, regex_pattern, replacement_format, stage, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
            "#,
            params![
                name,
                regex_pattern,
                replacement_format,
                PatternStage::Draft.as_str(),
                now.to_rfc3339()
            ],
        )
        .map_err(|e| duplicate_name(e, name))?;

        Ok(FileChangePattern {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            regex_pattern: regex_pattern.to_string(),
            replacement_format: replacement_format.to_string(),
            stage: PatternStage::Draft,
            is_confirmed: false,
            version: 1,
            last_test: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, id: i64) -> Result<FileChangePattern> {
        self.find(id)?
            .ok_or_else(|| RefileError::not_found("file change pattern", id))
    }

    pub fn find(&self, id: i64) -> Result<Option<FileChangePattern>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let pattern = conn
            .query_row(
                &format!("SELECT {} FROM file_change_patterns WHERE id = ?1", PATTERN_COLUMNS),
                params![id],
                Self::row_to_pattern,
            )
            .optional()?;
        Ok(pattern)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<FileChangePattern>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let pattern = conn
            .query_row(
                &format!("SELECT {} FROM file_change_patterns WHERE name = ?1", PATTERN_COLUMNS),
                params![name],
                Self::row_to_pattern,
            )
            .optional()?;
        Ok(pattern)
    }

    pub fn list(&self, query: &ListQuery) -> Result<Page<FileChangePattern>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM file_change_patterns", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file_change_patterns {}",
            PATTERN_COLUMNS,
            query.sql_suffix(SORTABLE)
        ))?;
        let items = stmt
            .query_map([], Self::row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            start: query.start,
            total: total as usize,
        })
    }

    /// All confirmed patterns in id order
    pub fn list_confirmed(&self) -> Result<Vec<FileChangePattern>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file_change_patterns WHERE stage = ?1 ORDER BY id",
            PATTERN_COLUMNS
        ))?;
        let patterns = stmt
            .query_map(params![PatternStage::Confirmed.as_str()], Self::row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    /// Write every mutable column if the stored version still equals
    /// `expected_version`; the stored version becomes `expected_version + 1`.
    pub fn compare_and_swap(
        &self,
        pattern: &FileChangePattern,
        expected_version: i64,
    ) -> Result<FileChangePattern> {
        let now = Utc::now();
        let conn = self.conn.lock().map_err(RefileError::lock)?;
        let test = pattern.last_test.as_ref();

        let affected = conn
            .execute(
                r#"
                UPDATE file_change_patterns
                SET name = ?1, regex_pattern = ?2, replacement_format = ?3, stage = ?4,
                    version = version + 1,
                    test_passed = ?5, test_matched = ?6, test_failed = ?7,
                    tested_regex = ?8, tested_format = ?9, tested_at = ?10,
                    updated_at = ?11
                WHERE id = ?12 AND version = ?13
                "#,
                params![
                    pattern.name,
                    pattern.regex_pattern,
                    pattern.replacement_format,
                    pattern.stage.as_str(),
                    test.map(|t| t.passed),
                    test.map(|t| t.matched as i64),
                    test.map(|t| t.failed as i64),
                    test.map(|t| t.regex_pattern.as_str()),
                    test.map(|t| t.replacement_format.as_str()),
                    test.map(|t| t.tested_at.to_rfc3339()),
                    now.to_rfc3339(),
                    pattern.id,
                    expected_version,
                ],
            )
            .map_err(|e| duplicate_name(e, &pattern.name))?;

        if affected == 0 {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT version FROM file_change_patterns WHERE id = ?1",
                    params![pattern.id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match found {
                None => RefileError::not_found("file change pattern", pattern.id),
                Some(found) => RefileError::Conflict {
                    entity: "file change pattern",
                    id: pattern.id,
                    expected: expected_version,
                    found,
                },
            });
        }

        let mut saved = pattern.clone();
        saved.version = expected_version + 1;
        saved.is_confirmed = saved.stage == PatternStage::Confirmed;
        saved.updated_at = now;
        Ok(saved)
    }

    /// Delete a pattern and, by cascade, its extracted data
    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let affected =
            conn.execute("DELETE FROM file_change_patterns WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RefileError::not_found("file change pattern", id));
        }
        Ok(())
    }

    fn row_to_pattern(row: &rusqlite::Row) -> rusqlite::Result<FileChangePattern> {
        let stage = PatternStage::from_str(&row.get::<_, String>(4)?);
        let test_passed: Option<bool> = row.get(6)?;
        let created_at: String = row.get(12)?;
        let updated_at: String = row.get(13)?;

        let last_test = match test_passed {
            Some(passed) => {
                let matched: Option<i64> = row.get(7)?;
                let failed: Option<i64> = row.get(8)?;
                let tested_at: Option<String> = row.get(11)?;
                Some(TestRecord {
                    passed,
                    matched: matched.unwrap_or(0).max(0) as usize,
                    failed: failed.unwrap_or(0).max(0) as usize,
                    tested_at: tested_at
                        .as_deref()
                        .map(parse_timestamp)
                        .unwrap_or_else(Utc::now),
                    regex_pattern: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                    replacement_format: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                })
            }
            None => None,
        };

        Ok(FileChangePattern {
            id: row.get(0)?,
            name: row.get(1)?,
            regex_pattern: row.get(2)?,
            replacement_format: row.get(3)?,
            stage,
            is_confirmed: stage == PatternStage::Confirmed,
            version: row.get(5)?,
            last_test,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

fn duplicate_name(err: rusqlite::Error, name: &str) -> RefileError {
    if is_unique_violation(&err) {
        RefileError::AlreadyExists {
            entity: "file change pattern",
            name: name.to_string(),
        }
    } else {
        err.into()
    }
}
