//! # Exclusion Patterns
//!
//! Paths matching an active exclusion pattern never enter the catalog.

use super::db::{is_unique_violation, RefileDb};
use super::paging::{ListQuery, Page};
use crate::error::{RefileError, Result};
use crate::tools::exclusion;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const SORTABLE: &[&str] = &["id", "name", "pattern", "is_active"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExclusionPattern {
    pub id: i64,
    pub name: String,
    /// Regex, or glob with a `glob:` prefix
    pub pattern: String,
    pub is_active: bool,
}

/// Fields accepted on update; `None` keeps the stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExclusionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

pub struct ExclusionManager {
    conn: Arc<Mutex<Connection>>,
}

impl ExclusionManager {
    pub fn new(db: &RefileDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Create a pattern after validating its syntax
    pub fn create(&self, name: &str, pattern: &str, is_active: bool) -> Result<ExclusionPattern> {
        validate_name(name)?;
        exclusion::validate(pattern)?;

        let conn = self.conn.lock().map_err(RefileError::lock)?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO exclusion_patterns (name, pattern, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
            params![name, pattern, is_active, now],
        )
        .map_err(|e| duplicate_name(e, name))?;

        Ok(ExclusionPattern {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            pattern: pattern.to_string(),
            is_active,
        })
    }

    pub fn get(&self, id: i64) -> Result<ExclusionPattern> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        conn.query_row(
            "SELECT id, name, pattern, is_active FROM exclusion_patterns WHERE id = ?1",
            params![id],
            Self::row_to_pattern,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => RefileError::not_found("exclusion pattern", id),
            other => other.into(),
        })
    }

    pub fn list(&self, query: &ListQuery) -> Result<Page<ExclusionPattern>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM exclusion_patterns", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, pattern, is_active FROM exclusion_patterns {}",
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

    /// Active patterns only, in id order
    pub fn list_active(&self) -> Result<Vec<ExclusionPattern>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, name, pattern, is_active FROM exclusion_patterns WHERE is_active = 1 ORDER BY id",
        )?;
        let patterns = stmt
            .query_map([], Self::row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    pub fn update(&self, id: i64, update: &ExclusionUpdate) -> Result<ExclusionPattern> {
        let mut current = self.get(id)?;

        if let Some(name) = &update.name {
            validate_name(name)?;
            current.name = name.clone();
        }
        if let Some(pattern) = &update.pattern {
            exclusion::validate(pattern)?;
            current.pattern = pattern.clone();
        }
        if let Some(is_active) = update.is_active {
            current.is_active = is_active;
        }

        let conn = self.conn.lock().map_err(RefileError::lock)?;
        let affected = conn
            .execute(
                r#"
                UPDATE exclusion_patterns
                SET name = ?1, pattern = ?2, is_active = ?3, updated_at = ?4
                WHERE id = ?5
                "#,
                params![
                    current.name,
                    current.pattern,
                    current.is_active,
                    Utc::now().to_rfc3339(),
                    id
                ],
            )
            .map_err(|e| duplicate_name(e, &current.name))?;

        if affected == 0 {
            return Err(RefileError::not_found("exclusion pattern", id));
        }
        Ok(current)
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let affected = conn.execute("DELETE FROM exclusion_patterns WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RefileError::not_found("exclusion pattern", id));
        }
        Ok(())
    }

    fn row_to_pattern(row: &rusqlite::Row) -> rusqlite::Result<ExclusionPattern> {
        Ok(ExclusionPattern {
            id: row.get(0)?,
            name: row.get(1)?,
            pattern: row.get(2)?,
            is_active: row.get(3)?,
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RefileError::Validation("name must not be empty".to_string()));
    }
    Ok(())
}

fn duplicate_name(err: rusqlite::Error, name: &str) -> RefileError {
    if is_unique_violation(&err) {
        RefileError::AlreadyExists {
            entity: "exclusion pattern",
            name: name.to_string(),
        }
    } else {
        err.into()
    }
}
