//! # File Catalog
//!
//! Catalog entries produced by the indexer. Rows are immutable apart from the
//! extraction-failure fields set by the classifier.

use super::db::{parse_timestamp, RefileDb};
use super::paging::{ListQuery, Page};
use crate::error::{RefileError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

const FILE_COLUMNS: &str = "id, filename, extension, directory, full_path, size, \
     extraction_failed, extraction_failure_reason, created_at";

const SORTABLE: &[&str] = &[
    "id",
    "filename",
    "extension",
    "directory",
    "full_path",
    "size",
    "created_at",
];

/// A file known to the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedFile {
    pub id: i64,
    /// Final path component including the extension
    pub filename: String,
    /// Suffix without the dot; empty when absent
    pub extension: String,
    pub directory: String,
    pub full_path: String,
    pub size: u64,
    pub extraction_failed: bool,
    #[serde(default)]
    pub extraction_failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A discovered file not yet in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub filename: String,
    pub extension: String,
    pub directory: String,
    pub full_path: String,
    pub size: u64,
}

impl NewFile {
    pub fn from_path(path: &Path, size: u64) -> Option<Self> {
        let filename = path.file_name()?.to_string_lossy().to_string();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        Some(Self {
            filename,
            extension,
            directory,
            full_path: path.to_string_lossy().to_string(),
            size,
        })
    }
}

/// Narrows an "all files" selection; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFilter {
    /// Only files whose directory starts with this prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Only files with this extension (no dot, case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Only files whose filename contains this text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_contains: Option<String>,
}

impl CatalogFilter {
    fn where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if let Some(dir) = self.directory.as_deref().filter(|d| !d.is_empty()) {
            clauses.push("substr(directory, 1, length(?)) = ?".to_string());
            args.push(dir.to_string());
            args.push(dir.to_string());
        }
        if let Some(ext) = self.extension.as_deref().filter(|e| !e.is_empty()) {
            clauses.push("lower(extension) = lower(?)".to_string());
            args.push(ext.trim_start_matches('.').to_string());
        }
        if let Some(text) = self.filename_contains.as_deref().filter(|t| !t.is_empty()) {
            clauses.push("instr(filename, ?) > 0".to_string());
            args.push(text.to_string());
        }

        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), args)
        }
    }
}

/// Manager for the `files` table
pub struct CatalogManager {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogManager {
    pub fn new(db: &RefileDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Insert files, skipping paths already cataloged. Returns only new rows.
    pub fn insert_new(&self, files: &[NewFile]) -> Result<Vec<IndexedFile>> {
        let mut conn = self.conn.lock().map_err(RefileError::lock)?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let mut inserted = Vec::new();

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO files
                (filename, extension, directory, full_path, size, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;

            for file in files {
                let changed = stmt.execute(params![
                    file.filename,
                    file.extension,
                    file.directory,
                    file.full_path,
                    file.size as i64,
                    now.to_rfc3339(),
                ])?;
                if changed == 0 {
                    continue;
                }
                inserted.push(IndexedFile {
                    id: tx.last_insert_rowid(),
                    filename: file.filename.clone(),
                    extension: file.extension.clone(),
                    directory: file.directory.clone(),
                    full_path: file.full_path.clone(),
                    size: file.size,
                    extraction_failed: false,
                    extraction_failure_reason: None,
                    created_at: now,
                });
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Load a file by ID
    pub fn get(&self, id: i64) -> Result<IndexedFile> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        conn.query_row(
            &format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS),
            params![id],
            Self::row_to_file,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => RefileError::not_found("file", id),
            other => other.into(),
        })
    }

    /// Look up many ids at once; missing ids are simply absent from the map
    pub fn find_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, IndexedFile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.conn.lock().map_err(RefileError::lock)?;
        let mut found = HashMap::with_capacity(ids.len());

        // Stay under SQLite's bound-parameter limit
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM files WHERE id IN ({})",
                FILE_COLUMNS, placeholders
            ))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), Self::row_to_file)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            found.extend(rows.into_iter().map(|f| (f.id, f)));
        }

        Ok(found)
    }

    /// Paged listing, optionally narrowed by a filename substring
    pub fn list(&self, query: &ListQuery, filter: &CatalogFilter) -> Result<Page<IndexedFile>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;
        let (where_sql, args) = filter.where_clause();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM files {}", where_sql),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files {} {}",
            FILE_COLUMNS,
            where_sql,
            query.sql_suffix(SORTABLE)
        ))?;
        let items = stmt
            .query_map(params_from_iter(args.iter()), Self::row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            start: query.start,
            total: total as usize,
        })
    }

    /// Every file matching the filter, in id order, as of this call
    pub fn snapshot(&self, filter: &CatalogFilter) -> Result<Vec<IndexedFile>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;
        let (where_sql, args) = filter.where_clause();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files {} ORDER BY id ASC",
            FILE_COLUMNS, where_sql
        ))?;
        let files = stmt
            .query_map(params_from_iter(args.iter()), Self::row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(files)
    }

    /// `(id, full_path)` of every entry at or below a directory
    pub fn paths_under(&self, directory: &str) -> Result<Vec<(i64, String)>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;
        let nested = format!("{}{}", directory.trim_end_matches(['/', '\\']), std::path::MAIN_SEPARATOR);

        let mut stmt = conn.prepare(
            r#"
            SELECT id, full_path FROM files
            WHERE directory = ?1 OR substr(directory, 1, length(?2)) = ?2
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![directory, nested], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Delete a file entry
    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let affected = conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RefileError::not_found("file", id));
        }
        Ok(())
    }

    /// Delete many entries; returns the number removed
    pub fn delete_many(&self, ids: &[i64]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(RefileError::lock)?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM files WHERE id = ?1")?;
            for id in ids {
                removed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Record (or clear, with `None`) an extraction failure
    pub fn set_extraction_failure(&self, id: i64, reason: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let affected = conn.execute(
            "UPDATE files SET extraction_failed = ?1, extraction_failure_reason = ?2 WHERE id = ?3",
            params![reason.is_some(), reason, id],
        )?;
        if affected == 0 {
            return Err(RefileError::not_found("file", id));
        }
        Ok(())
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<IndexedFile> {
        let size: i64 = row.get(5)?;
        let created_at: String = row.get(8)?;

        Ok(IndexedFile {
            id: row.get(0)?,
            filename: row.get(1)?,
            extension: row.get(2)?,
            directory: row.get(3)?,
            full_path: row.get(4)?,
            size: size.max(0) as u64,
            extraction_failed: row.get(6)?,
            extraction_failure_reason: row.get(7)?,
            created_at: parse_timestamp(&created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn new_file(path: &str) -> NewFile {
        NewFile::from_path(&PathBuf::from(path), 10).unwrap()
    }

    fn catalog() -> CatalogManager {
        CatalogManager::new(&RefileDb::open_in_memory().unwrap())
    }

    #[test]
    fn test_new_file_from_path() {
        let f = new_file("/media/tv/Show_S01E02.mkv");
        assert_eq!(f.filename, "Show_S01E02.mkv");
        assert_eq!(f.extension, "mkv");
        assert_eq!(f.directory, "/media/tv");

        let bare = new_file("/media/README");
        assert_eq!(bare.extension, "");
    }

    #[test]
    fn test_insert_new_skips_known_paths() {
        let catalog = catalog();
        let first = catalog
            .insert_new(&[new_file("/a/one.mkv"), new_file("/a/two.mkv")])
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = catalog
            .insert_new(&[new_file("/a/two.mkv"), new_file("/a/three.mkv")])
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].filename, "three.mkv");
        assert_eq!(catalog.get(second[0].id).unwrap().full_path, "/a/three.mkv");
    }

    #[test]
    fn test_find_by_ids_ignores_missing() {
        let catalog = catalog();
        let files = catalog.insert_new(&[new_file("/a/one.mkv")]).unwrap();
        let found = catalog.find_by_ids(&[files[0].id, 999]).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&files[0].id));
    }

    #[test]
    fn test_list_paging_and_filter() {
        let catalog = catalog();
        catalog
            .insert_new(&[
                new_file("/a/b.mkv"),
                new_file("/a/a.mkv"),
                new_file("/a/c.txt"),
            ])
            .unwrap();

        let mut query = ListQuery::range(0, 2);
        query.sort = Some("filename".into());
        let page = catalog.list(&query, &CatalogFilter::default()).unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<_> = page.items.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mkv", "b.mkv"]);

        let filter = CatalogFilter {
            extension: Some("MKV".into()),
            ..Default::default()
        };
        assert_eq!(catalog.snapshot(&filter).unwrap().len(), 2);
    }

    #[test]
    fn test_paths_under_includes_nested_only() {
        let catalog = catalog();
        catalog
            .insert_new(&[
                new_file("/data/a.mkv"),
                new_file("/data/sub/b.mkv"),
                new_file("/database/c.mkv"),
            ])
            .unwrap();

        let paths: Vec<String> = catalog
            .paths_under("/data")
            .unwrap()
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        assert_eq!(paths, vec!["/data/a.mkv", "/data/sub/b.mkv"]);
    }

    #[test]
    fn test_extraction_failure_roundtrip() {
        let catalog = catalog();
        let id = catalog.insert_new(&[new_file("/a/x.mkv")]).unwrap()[0].id;

        catalog.set_extraction_failure(id, Some("no pattern matched")).unwrap();
        let file = catalog.get(id).unwrap();
        assert!(file.extraction_failed);
        assert_eq!(file.extraction_failure_reason.as_deref(), Some("no pattern matched"));

        catalog.set_extraction_failure(id, None).unwrap();
        assert!(!catalog.get(id).unwrap().extraction_failed);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let catalog = catalog();
        let err = catalog.delete(42).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
