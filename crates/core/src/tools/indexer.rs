//! # Indexer
//!
//! Walks a directory tree into the file catalog. Hidden files are included and
//! ignore files are not honoured: the catalog reflects what is on disk, minus
//! the active exclusion patterns.

use crate::error::{RefileError, Result};
use crate::state::{CatalogManager, ExclusionManager, IndexedFile, NewFile, RefileDb};
use crate::tools::exclusion::ExclusionFilter;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Outcome of indexing one directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    /// Entries inserted by this run only
    pub indexed_files: Vec<IndexedFile>,
    /// Entries removed because their file vanished or is now excluded
    pub pruned: usize,
}

/// Index a directory with the currently active exclusion patterns
pub async fn index(db: &RefileDb, directory: &Path, batch_size: usize) -> Result<IndexReport> {
    let db = db.clone();
    let root = directory.to_path_buf();

    // Directory walk and SQLite writes both block
    tokio::task::spawn_blocking(move || {
        let patterns = ExclusionManager::new(&db).list_active()?;
        let filter = ExclusionFilter::new(&patterns);
        index_with_filter(&CatalogManager::new(&db), &root, &filter, batch_size)
    })
    .await
    .map_err(|e| RefileError::Internal(format!("indexer task failed: {}", e)))?
}

/// Synchronous indexing against an explicit filter
pub fn index_with_filter(
    catalog: &CatalogManager,
    directory: &Path,
    filter: &ExclusionFilter,
    batch_size: usize,
) -> Result<IndexReport> {
    let root = resolve_root(directory)?;
    let batch_size = batch_size.max(1);

    let walker = ignore::WalkBuilder::new(&root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .build();

    let mut report = IndexReport::default();
    let mut batch: Vec<NewFile> = Vec::with_capacity(batch_size);
    let mut skipped = 0usize;
    let mut excluded = 0usize;

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                skipped += 1;
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let path_str = path.to_string_lossy();
        if let Some(name) = filter.matched_by(&path_str) {
            tracing::debug!(path = %path_str, pattern = name, "Excluded");
            excluded += 1;
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::debug!(path = %path_str, "Skipping file without metadata: {}", e);
                skipped += 1;
                continue;
            }
        };

        if let Some(file) = NewFile::from_path(path, size) {
            batch.push(file);
        }

        if batch.len() >= batch_size {
            report.indexed_files.extend(catalog.insert_new(&batch)?);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        report.indexed_files.extend(catalog.insert_new(&batch)?);
    }

    report.pruned = prune(catalog, &root, filter)?;

    tracing::info!(
        directory = %root.display(),
        "Indexed {} new files ({} pruned, {} excluded, {} unreadable)",
        report.indexed_files.len(),
        report.pruned,
        excluded,
        skipped
    );

    Ok(report)
}

fn resolve_root(directory: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| RefileError::InvalidDirectory {
        path: directory.display().to_string(),
        reason,
    };

    let root = std::fs::canonicalize(directory).map_err(|e| invalid(e.to_string()))?;
    if !root.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    Ok(root)
}

/// Remove entries under `root` whose file is gone or now excluded
fn prune(catalog: &CatalogManager, root: &Path, filter: &ExclusionFilter) -> Result<usize> {
    let stale: Vec<i64> = catalog
        .paths_under(&root.to_string_lossy())?
        .into_iter()
        .filter(|(_, path)| !Path::new(path).is_file() || filter.matches(path))
        .map(|(id, _)| id)
        .collect();

    if stale.is_empty() {
        return Ok(0);
    }
    catalog.delete_many(&stale)
}
