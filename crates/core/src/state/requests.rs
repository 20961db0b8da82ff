//! # Change Requests
//!
//! One `FileChangeRequest` per batch apply, with one append-only
//! `ChangeTarget` per file it considered.

use super::db::{parse_timestamp, RefileDb};
use super::paging::{ListQuery, Page};
use crate::error::{RefileError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const REQUEST_COLUMNS: &str = "id, file_change_pattern_id, rename_pattern_string, destination_path, \
     status, success_count, failed_count, details, created_at, updated_at";

const SORTABLE: &[&str] = &[
    "id",
    "file_change_pattern_id",
    "status",
    "success_count",
    "failed_count",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Running,
    /// Every file produced a target, whatever its outcome
    Completed,
    /// Processing could not begin at all
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Success,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            _ => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileChangeRequest {
    pub id: i64,
    pub file_change_pattern_id: i64,
    pub rename_pattern_string: String,
    pub destination_path: String,
    pub status: RequestStatus,
    pub success_count: usize,
    pub failed_count: usize,
    pub details: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeTarget {
    pub id: i64,
    pub request_id: i64,
    pub original_file_id: i64,
    pub new_filename: String,
    pub status: TargetStatus,
    #[serde(default)]
    pub message: Option<String>,
    /// Machine-readable error kind; absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A target outcome not yet written
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeTarget {
    pub original_file_id: i64,
    pub new_filename: String,
    pub status: TargetStatus,
    pub message: Option<String>,
    pub failure_kind: Option<String>,
}

/// Request with all of its targets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileChangeRequestDetail {
    #[serde(flatten)]
    pub request: FileChangeRequest,
    pub targets: Vec<ChangeTarget>,
}

pub struct RequestManager {
    conn: Arc<Mutex<Connection>>,
}

impl RequestManager {
    pub fn new(db: &RefileDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Open a new request in `pending`
    pub fn create(
        &self,
        pattern_id: i64,
        rename_pattern_string: &str,
        destination_path: &str,
    ) -> Result<FileChangeRequest> {
        let now = Utc::now();
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        conn.execute(
            r#"
            INSERT INTO file_change_requests
            (file_change_pattern_id, rename_pattern_string, destination_path, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![
                pattern_id,
                rename_pattern_string,
                destination_path,
                RequestStatus::Pending.as_str(),
                now.to_rfc3339()
            ],
        )?;

        Ok(FileChangeRequest {
            id: conn.last_insert_rowid(),
            file_change_pattern_id: pattern_id,
            rename_pattern_string: rename_pattern_string.to_string(),
            destination_path: destination_path.to_string(),
            status: RequestStatus::Pending,
            success_count: 0,
            failed_count: 0,
            details: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn set_status(&self, id: i64, status: RequestStatus) -> Result<()> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let affected = conn.execute(
            "UPDATE file_change_requests SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if affected == 0 {
            return Err(RefileError::not_found("file change request", id));
        }
        Ok(())
    }

    /// Write all targets and the terminal counters in one transaction.
    /// Counters are derived from the targets so they always agree.
    pub fn finish(
        &self,
        id: i64,
        status: RequestStatus,
        details: &str,
        targets: &[NewChangeTarget],
    ) -> Result<FileChangeRequest> {
        let now = Utc::now().to_rfc3339();
        let success_count = targets
            .iter()
            .filter(|t| t.status == TargetStatus::Success)
            .count();
        let failed_count = targets.len() - success_count;

        let mut conn = self.conn.lock().map_err(RefileError::lock)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO change_targets
                (request_id, original_file_id, new_filename, status, message, failure_kind, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for target in targets {
                stmt.execute(params![
                    id,
                    target.original_file_id,
                    target.new_filename,
                    target.status.as_str(),
                    target.message,
                    target.failure_kind,
                    now,
                ])?;
            }
        }

        let affected = tx.execute(
            r#"
            UPDATE file_change_requests
            SET status = ?1, success_count = ?2, failed_count = ?3, details = ?4, updated_at = ?5
            WHERE id = ?6
            "#,
            params![
                status.as_str(),
                success_count as i64,
                failed_count as i64,
                details,
                now,
                id
            ],
        )?;
        if affected == 0 {
            return Err(RefileError::not_found("file change request", id));
        }
        tx.commit()?;
        drop(conn);

        self.get(id)
    }

    pub fn get(&self, id: i64) -> Result<FileChangeRequest> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        conn.query_row(
            &format!("SELECT {} FROM file_change_requests WHERE id = ?1", REQUEST_COLUMNS),
            params![id],
            Self::row_to_request,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                RefileError::not_found("file change request", id)
            }
            other => other.into(),
        })
    }

    pub fn get_detail(&self, id: i64) -> Result<FileChangeRequestDetail> {
        let request = self.get(id)?;
        let targets = self.targets(id)?;
        Ok(FileChangeRequestDetail { request, targets })
    }

    /// Targets of a request in the order they were recorded
    pub fn targets(&self, request_id: i64) -> Result<Vec<ChangeTarget>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, request_id, original_file_id, new_filename, status, message, failure_kind, created_at
            FROM change_targets
            WHERE request_id = ?1
            ORDER BY id
            "#,
        )?;
        let targets = stmt
            .query_map(params![request_id], Self::row_to_target)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(targets)
    }

    pub fn list(&self, query: &ListQuery) -> Result<Page<FileChangeRequest>> {
        let conn = self.conn.lock().map_err(RefileError::lock)?;

        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM file_change_requests", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file_change_requests {}",
            REQUEST_COLUMNS,
            query.sql_suffix(SORTABLE)
        ))?;
        let items = stmt
            .query_map([], Self::row_to_request)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            start: query.start,
            total: total as usize,
        })
    }

    fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<FileChangeRequest> {
        let status: String = row.get(4)?;
        let success_count: i64 = row.get(5)?;
        let failed_count: i64 = row.get(6)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(FileChangeRequest {
            id: row.get(0)?,
            file_change_pattern_id: row.get(1)?,
            rename_pattern_string: row.get(2)?,
            destination_path: row.get(3)?,
            status: RequestStatus::from_str(&status),
            success_count: success_count.max(0) as usize,
            failed_count: failed_count.max(0) as usize,
            details: row.get(7)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn row_to_target(row: &rusqlite::Row) -> rusqlite::Result<ChangeTarget> {
        let status: String = row.get(4)?;
        let created_at: String = row.get(7)?;

        Ok(ChangeTarget {
            id: row.get(0)?,
            request_id: row.get(1)?,
            original_file_id: row.get(2)?,
            new_filename: row.get(3)?,
            status: TargetStatus::from_str(&status),
            message: row.get(5)?,
            failure_kind: row.get(6)?,
            created_at: parse_timestamp(&created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(file_id: i64, status: TargetStatus) -> NewChangeTarget {
        NewChangeTarget {
            original_file_id: file_id,
            new_filename: format!("f{}.mkv", file_id),
            status,
            message: None,
            failure_kind: match status {
                TargetStatus::Success => None,
                TargetStatus::Failed => Some("destination_exists".into()),
            },
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Running,
            RequestStatus::Completed,
            RequestStatus::Failed,
        ] {
            assert_eq!(RequestStatus::from_str(status.as_str()), status);
        }
        assert!(RequestStatus::Failed.is_terminal());
        assert!(!RequestStatus::Running.is_terminal());
    }

    #[test]
    fn test_finish_writes_targets_and_counts() {
        let m = RequestManager::new(&RefileDb::open_in_memory().unwrap());
        let request = m.create(1, "{name}", "/out").unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        m.set_status(request.id, RequestStatus::Running).unwrap();
        let finished = m
            .finish(
                request.id,
                RequestStatus::Completed,
                "2 succeeded, 1 failed",
                &[
                    target(1, TargetStatus::Success),
                    target(2, TargetStatus::Failed),
                    target(3, TargetStatus::Success),
                ],
            )
            .unwrap();

        assert_eq!(finished.status, RequestStatus::Completed);
        assert_eq!(finished.success_count, 2);
        assert_eq!(finished.failed_count, 1);

        let detail = m.get_detail(request.id).unwrap();
        assert_eq!(detail.targets.len(), 3);
        assert_eq!(detail.targets[1].failure_kind.as_deref(), Some("destination_exists"));
        let ids: Vec<i64> = detail.targets.iter().map(|t| t.original_file_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_batch_counts_zero() {
        let m = RequestManager::new(&RefileDb::open_in_memory().unwrap());
        let request = m.create(1, "{name}", "/out").unwrap();
        let finished = m.finish(request.id, RequestStatus::Completed, "", &[]).unwrap();
        assert_eq!(finished.success_count + finished.failed_count, 0);
    }

    #[test]
    fn test_detail_serializes_flat() {
        let m = RequestManager::new(&RefileDb::open_in_memory().unwrap());
        let request = m.create(7, "{name}", "/out").unwrap();
        let json = serde_json::to_value(m.get_detail(request.id).unwrap()).unwrap();
        assert_eq!(json["file_change_pattern_id"], 7);
        assert!(json["targets"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_missing_request() {
        let m = RequestManager::new(&RefileDb::open_in_memory().unwrap());
        assert_eq!(m.get(5).unwrap_err().kind(), "not_found");
        assert_eq!(
            m.set_status(5, RequestStatus::Running).unwrap_err().kind(),
            "not_found"
        );
    }
}
