//! Fields extracted from a file by the pattern that classified it. One row per file.

use super::db::{parse_timestamp, RefileDb};
use crate::error::{RefileError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedData {
    pub id: i64,
    pub file_id: i64,
    pub pattern_id: i64,
    pub extracted_values: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct ExtractedDataManager {
    conn: Arc<Mutex<Connection>>,
}

impl ExtractedDataManager {
    pub fn new(db: &RefileDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Replace whatever was extracted for the file before
    pub fn upsert(
        &self,
        file_id: i64,
        pattern_id: i64,
        values: &serde_json::Value,
    ) -> Result<ExtractedData> {
        let now = Utc::now();
        let json = serde_json::to_string(values)?;
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let id: i64 = conn.query_row(
            r#"
            INSERT INTO extracted_data (file_id, pattern_id, extracted_values, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(file_id) DO UPDATE SET
                pattern_id = excluded.pattern_id,
                extracted_values = excluded.extracted_values,
                created_at = excluded.created_at
            RETURNING id
            "#,
            params![file_id, pattern_id, json, now.to_rfc3339()],
            |row| row.get(0),
        )?;

        Ok(ExtractedData {
            id,
            file_id,
            pattern_id,
            extracted_values: values.clone(),
            created_at: now,
        })
    }

    pub fn for_file(&self, file_id: i64) -> Result<Option<ExtractedData>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let row = conn
            .query_row(
                "SELECT id, file_id, pattern_id, extracted_values, created_at FROM extracted_data WHERE file_id = ?1",
                params![file_id],
                Self::row_to_data,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_by_pattern(&self, pattern_id: i64) -> Result<Vec<ExtractedData>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, file_id, pattern_id, extracted_values, created_at
            FROM extracted_data
            WHERE pattern_id = ?1
            ORDER BY file_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![pattern_id], Self::row_to_data)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn delete_for_file(&self, file_id: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;
        conn.execute("DELETE FROM extracted_data WHERE file_id = ?1", params![file_id])?;
        Ok(())
    }

    fn row_to_data(row: &rusqlite::Row) -> rusqlite::Result<ExtractedData> {
        let values: String = row.get(3)?;
        let created_at: String = row.get(4)?;

        Ok(ExtractedData {
            id: row.get(0)?,
            file_id: row.get(1)?,
            pattern_id: row.get(2)?,
            extracted_values: serde_json::from_str(&values).unwrap_or_default(),
            created_at: parse_timestamp(&created_at),
        })
    }
}
