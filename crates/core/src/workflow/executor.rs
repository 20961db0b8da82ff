//! # Change Request Executor
//!
//! Applies a confirmed pattern to a file selection and copies each file under
//! a destination directory with a rendered name. One file's failure never
//! stops the batch: every file in the resolved selection yields exactly one
//! `ChangeTarget`.
//!
//! ## Phases
//!
//! 1. Validate the pattern (top-level errors, nothing written)
//! 2. Snapshot the selection, open the request
//! 3. Pre-flight: rename template, destination directory (created if missing)
//! 4. Plan names sequentially in selection order
//! 5. Copy in parallel, gated by a semaphore
//! 6. Write targets and counters in one transaction
//!
//! Once the request row exists it always reaches a terminal status: a run
//! that errors or unwinds after step 2 leaves it `failed`.

use crate::config::RefileConfig;
use crate::error::{RefileError, Result};
use crate::state::{
    CatalogManager, FileChangeRequest, NewChangeTarget, PatternManager, RefileDb,
    RequestManager, RequestStatus, TargetStatus,
};
use crate::tools::copier;
use crate::tools::pattern::{self, CompiledPattern};
use crate::tools::rename::RenameTemplate;
use crate::workflow::selection::{FileSelection, SelectedFile};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Failure kind recorded when a filename does not match the pattern
const NO_MATCH_KIND: &str = "no_match";

/// Input of one batch apply
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub pattern_id: i64,
    pub selection: FileSelection,
    pub destination_path: String,
    pub rename_pattern_string: String,
}

/// Concurrency limits for the copy phase
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_concurrent_copies: usize,
    pub copy_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&RefileConfig::default())
    }
}

impl From<&RefileConfig> for ExecutorConfig {
    fn from(config: &RefileConfig) -> Self {
        Self {
            max_concurrent_copies: config.max_concurrent_copies.max(1),
            copy_timeout: match config.copy_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Per-file outcomes of one request, kept in selection order
#[derive(Debug)]
pub struct BatchAccumulator {
    slots: Vec<Option<NewChangeTarget>>,
}

impl BatchAccumulator {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn record_success(&mut self, index: usize, file_id: i64, new_filename: &str) {
        self.slots[index] = Some(NewChangeTarget {
            original_file_id: file_id,
            new_filename: new_filename.to_string(),
            status: TargetStatus::Success,
            message: None,
            failure_kind: None,
        });
    }

    pub fn record_failure(
        &mut self,
        index: usize,
        file_id: i64,
        new_filename: &str,
        kind: &str,
        message: String,
    ) {
        tracing::warn!(file_id, kind, "File failed: {}", message);
        self.slots[index] = Some(NewChangeTarget {
            original_file_id: file_id,
            new_filename: new_filename.to_string(),
            status: TargetStatus::Failed,
            message: Some(message),
            failure_kind: Some(kind.to_string()),
        });
    }

    pub fn record_error(&mut self, index: usize, file_id: i64, new_filename: &str, err: &RefileError) {
        self.record_failure(index, file_id, new_filename, err.kind(), err.to_string());
    }

    pub fn is_recorded(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Option::is_some)
    }

    pub fn success_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|t| t.status == TargetStatus::Success)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|t| t.status == TargetStatus::Failed)
            .count()
    }

    /// Summary line followed by one line per failed file, in selection order
    pub fn details(&self, headline: &str) -> String {
        let mut details = format!(
            "{}: {} succeeded, {} failed",
            headline,
            self.success_count(),
            self.failed_count()
        );
        for target in self.slots.iter().flatten() {
            if let Some(message) = target.message.as_deref() {
                details.push_str(&format!("\nfile {}: {}", target.original_file_id, message));
            }
        }
        details
    }

    /// Targets in selection order; unrecorded slots are a bug upstream
    pub fn into_targets(self) -> Vec<NewChangeTarget> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Ties a written request row to the run that owns it. A run that ends
/// without `complete` (error, panic, or a dropped future) marks the request
/// failed with one failed target per selected file.
struct OpenRequest {
    requests: RequestManager,
    id: i64,
    file_ids: Vec<i64>,
    headline: String,
    settled: bool,
}

impl OpenRequest {
    fn new(requests: RequestManager, id: i64, selected: &[SelectedFile], headline: String) -> Self {
        Self {
            requests,
            id,
            file_ids: selected.iter().map(SelectedFile::file_id).collect(),
            headline,
            settled: false,
        }
    }

    fn complete(&mut self) {
        self.settled = true;
    }

    /// Best effort: a failing write here is logged, never raised
    fn abandon(&mut self, kind: &str, message: &str) {
        if self.settled {
            return;
        }
        self.settled = true;

        let mut acc = BatchAccumulator::new(self.file_ids.len());
        for (index, file_id) in self.file_ids.iter().enumerate() {
            acc.record_failure(index, *file_id, "", kind, message.to_string());
        }
        let details = format!("{}: request aborted: {}", self.headline, message);

        match self
            .requests
            .finish(self.id, RequestStatus::Failed, &details, &acc.into_targets())
        {
            Ok(_) => tracing::warn!(request_id = self.id, "Change request aborted: {}", message),
            Err(e) => {
                tracing::error!(request_id = self.id, "Could not record aborted request: {}", e);
                if let Err(e) = self.requests.set_status(self.id, RequestStatus::Failed) {
                    tracing::error!(request_id = self.id, "Could not mark request failed: {}", e);
                }
            }
        }
    }
}

impl Drop for OpenRequest {
    fn drop(&mut self) {
        if !self.settled {
            let message = if std::thread::panicking() {
                "processing panicked"
            } else {
                "processing stopped before completion"
            };
            self.abandon("internal", message);
        }
    }
}

/// A copy that passed planning
struct PlannedCopy {
    index: usize,
    file_id: i64,
    source: PathBuf,
    new_filename: String,
}

pub struct ChangeRequestExecutor {
    db: RefileDb,
    config: ExecutorConfig,
}

impl ChangeRequestExecutor {
    pub fn new(db: &RefileDb, config: ExecutorConfig) -> Self {
        Self {
            db: db.clone(),
            config,
        }
    }

    /// Run one batch apply and return the finished request
    #[tracing::instrument(skip(self, request), fields(pattern_id = request.pattern_id))]
    pub async fn apply_batch(&self, request: &BatchRequest) -> Result<FileChangeRequest> {
        let pattern = PatternManager::new(&self.db).get(request.pattern_id)?;
        if !pattern.is_confirmed {
            return Err(RefileError::PatternNotConfirmed(pattern.id));
        }
        let compiled =
            pattern::compile_with_template(&pattern.regex_pattern, &pattern.replacement_format)?;

        let selected = request.selection.resolve(&CatalogManager::new(&self.db))?;
        let record = RequestManager::new(&self.db).create(
            pattern.id,
            &request.rename_pattern_string,
            &request.destination_path,
        )?;
        let headline = format!("Applied pattern '{}'", pattern.name);

        tracing::info!(
            request_id = record.id,
            files = selected.len(),
            "Change request started"
        );

        let mut open = OpenRequest::new(
            RequestManager::new(&self.db),
            record.id,
            &selected,
            headline.clone(),
        );
        match self.run(record.id, request, &compiled, &selected, &headline).await {
            Ok(finished) => {
                open.complete();
                Ok(finished)
            }
            Err(e) => {
                open.abandon(e.kind(), &e.to_string());
                Err(e)
            }
        }
    }

    /// Everything after the request row exists
    async fn run(
        &self,
        request_id: i64,
        request: &BatchRequest,
        compiled: &CompiledPattern,
        selected: &[SelectedFile],
        headline: &str,
    ) -> Result<FileChangeRequest> {
        let requests = RequestManager::new(&self.db);

        // Pre-flight: nothing is copied if the request cannot start at all
        let preflight = match RenameTemplate::parse(&request.rename_pattern_string) {
            Ok(template) => check_destination(&request.destination_path)
                .await
                .map(|dir| (template, dir)),
            Err(e) => Err(e),
        };
        let (template, destination) = match preflight {
            Ok(ready) => ready,
            Err(e) => {
                let mut acc = BatchAccumulator::new(selected.len());
                for (index, file) in selected.iter().enumerate() {
                    acc.record_error(index, file.file_id(), "", &e);
                }
                let details = format!("{}: request failed before processing: {}", headline, e);
                tracing::warn!(request_id, "Pre-flight failed: {}", e);
                return requests.finish(
                    request_id,
                    RequestStatus::Failed,
                    &details,
                    &acc.into_targets(),
                );
            }
        };

        requests.set_status(request_id, RequestStatus::Running)?;

        let mut acc = BatchAccumulator::new(selected.len());
        let planned = plan(compiled, &template, selected, &mut acc);
        self.copy_all(planned, &destination, &mut acc).await;

        let details = acc.details(headline);
        let finished = requests.finish(
            request_id,
            RequestStatus::Completed,
            &details,
            &acc.into_targets(),
        )?;

        tracing::info!(
            request_id = finished.id,
            success = finished.success_count,
            failed = finished.failed_count,
            "Change request finished"
        );
        Ok(finished)
    }

    async fn copy_all(&self, planned: Vec<PlannedCopy>, destination: &Path, acc: &mut BatchAccumulator) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_copies));
        let timeout = self.config.copy_timeout;
        let mut join_set = JoinSet::new();
        let mut expected = Vec::with_capacity(planned.len());

        // SCATTER
        for copy in planned {
            expected.push((copy.index, copy.file_id, copy.new_filename.clone()));
            let semaphore = Arc::clone(&semaphore);
            let target = destination.join(&copy.new_filename);

            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => copier::copy_exclusive(&copy.source, &target, timeout).await,
                    Err(e) => Err(RefileError::Internal(format!("copy pool closed: {}", e))),
                };
                (copy, result)
            });
        }

        // GATHER
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((copy, Ok(bytes))) => {
                    tracing::debug!(file_id = copy.file_id, bytes, "Copied");
                    acc.record_success(copy.index, copy.file_id, &copy.new_filename);
                }
                Ok((copy, Err(e))) => {
                    acc.record_error(copy.index, copy.file_id, &copy.new_filename, &e);
                }
                Err(e) => tracing::error!("Copy task panicked: {}", e),
            }
        }

        // A panicked task leaves its slot empty
        for (index, file_id, new_filename) in expected {
            if !acc.is_recorded(index) {
                acc.record_error(
                    index,
                    file_id,
                    &new_filename,
                    &RefileError::CopyFailed("copy task aborted".to_string()),
                );
            }
        }
    }
}

/// Compute destination names in selection order. Failures are recorded
/// directly; the rest become copy jobs.
fn plan(
    compiled: &CompiledPattern,
    template: &RenameTemplate,
    selected: &[SelectedFile],
    acc: &mut BatchAccumulator,
) -> Vec<PlannedCopy> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut planned = Vec::new();

    for (index, entry) in selected.iter().enumerate() {
        let file = match entry {
            SelectedFile::Found(file) => file,
            SelectedFile::Missing(id) => {
                let err = RefileError::SourceMissing(format!("file {} is not in the catalog", id));
                acc.record_error(index, *id, "", &err);
                continue;
            }
        };

        let fields = match compiled.extract(&file.filename) {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                acc.record_failure(
                    index,
                    file.id,
                    "",
                    NO_MATCH_KIND,
                    format!("'{}' does not match the pattern", file.filename),
                );
                continue;
            }
            Err(e) => {
                acc.record_error(index, file.id, "", &e);
                continue;
            }
        };

        let new_filename = match template.render(&fields, &file.extension) {
            Ok(name) => name,
            Err(e) => {
                acc.record_error(index, file.id, "", &e);
                continue;
            }
        };

        if !taken.insert(new_filename.clone()) {
            let err = RefileError::DestinationExists(format!(
                "{} (already produced by an earlier file in this request)",
                new_filename
            ));
            acc.record_error(index, file.id, &new_filename, &err);
            continue;
        }

        planned.push(PlannedCopy {
            index,
            file_id: file.id,
            source: PathBuf::from(&file.full_path),
            new_filename,
        });
    }

    planned
}

/// The destination is created when missing and must end up a writable directory
async fn check_destination(path: &str) -> Result<PathBuf> {
    let invalid = |reason: String| RefileError::InvalidDestinationPath {
        path: path.to_string(),
        reason,
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty".to_string()));
    }

    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    if !meta.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    if meta.permissions().readonly() {
        return Err(invalid("directory is read-only".to_string()));
    }

    Ok(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NewFile;
    use crate::workflow::lifecycle::PatternLifecycle;
    use std::fs;

    const SHOW: &str = r"(?P<name>[A-Za-z]+)_S(?P<season>\d+)E(?P<ep>\d+)";
    const FORMAT: &str = r#"{"name": "$0:s$", "season": "$1:d$", "ep": "$2:d$"}"#;
    const RENAME: &str = "{name} - S{season:02}E{ep:02}";

    struct Fixture {
        db: RefileDb,
        source: tempfile::TempDir,
        dest: tempfile::TempDir,
        file_ids: Vec<i64>,
        pattern_id: i64,
    }

    fn fixture(names: &[&str]) -> Fixture {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let db = RefileDb::open_in_memory().unwrap();

        let files: Vec<NewFile> = names
            .iter()
            .map(|n| {
                let path = source.path().join(n);
                fs::write(&path, n.as_bytes()).unwrap();
                NewFile::from_path(&path, n.len() as u64).unwrap()
            })
            .collect();
        let file_ids: Vec<i64> = CatalogManager::new(&db)
            .insert_new(&files)
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();

        let lc = PatternLifecycle::new(&db);
        let p = lc.test_named("show", SHOW, FORMAT, &file_ids).unwrap().pattern;
        let pattern_id = lc.confirm(p.id, None).unwrap().id;

        Fixture {
            db,
            source,
            dest,
            file_ids,
            pattern_id,
        }
    }

    fn batch(f: &Fixture, selection: FileSelection) -> BatchRequest {
        BatchRequest {
            pattern_id: f.pattern_id,
            selection,
            destination_path: f.dest.path().to_string_lossy().to_string(),
            rename_pattern_string: RENAME.to_string(),
        }
    }

    fn executor(f: &Fixture) -> ChangeRequestExecutor {
        ChangeRequestExecutor::new(
            &f.db,
            ExecutorConfig {
                max_concurrent_copies: 2,
                copy_timeout: Some(Duration::from_secs(30)),
            },
        )
    }

    #[tokio::test]
    async fn test_partial_failure_scenario() {
        let f = fixture(&["Show_S01E02.mkv", "randomfile.txt", "Show_S01E03.mkv"]);
        let result = executor(&f)
            .apply_batch(&batch(&f, FileSelection::Explicit(f.file_ids.clone())))
            .await
            .unwrap();

        assert_eq!(result.status, RequestStatus::Completed);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed_count, 1);

        let targets = RequestManager::new(&f.db).targets(result.id).unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[1].status, TargetStatus::Failed);
        assert_eq!(targets[1].failure_kind.as_deref(), Some(NO_MATCH_KIND));
        assert_eq!(targets[0].new_filename, "Show - S01E02.mkv");

        let copied = fs::read_to_string(f.dest.path().join("Show - S01E02.mkv")).unwrap();
        assert_eq!(copied, "Show_S01E02.mkv");
        assert!(f.source.path().join("Show_S01E02.mkv").exists());
        assert!(result.details.contains("2 succeeded, 1 failed"));
    }

    #[tokio::test]
    async fn test_rerun_fails_with_destination_exists() {
        let f = fixture(&["Show_S01E02.mkv"]);
        let exec = executor(&f);
        let request = batch(&f, FileSelection::all());

        let first = exec.apply_batch(&request).await.unwrap();
        assert_eq!(first.success_count, 1);

        let second = exec.apply_batch(&request).await.unwrap();
        assert_eq!(second.status, RequestStatus::Completed);
        assert_eq!(second.failed_count, 1);
        let targets = RequestManager::new(&f.db).targets(second.id).unwrap();
        assert_eq!(targets[0].failure_kind.as_deref(), Some("destination_exists"));
        assert_eq!(targets[0].new_filename, "Show - S01E02.mkv");
    }

    #[tokio::test]
    async fn test_duplicate_names_within_batch() {
        let f = fixture(&["Show_S01E02.mkv", "Show_S01E03.mkv"]);
        let mut request = batch(&f, FileSelection::Explicit(f.file_ids.clone()));
        request.rename_pattern_string = "{name}".to_string();

        let result = executor(&f).apply_batch(&request).await.unwrap();
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed_count, 1);

        let targets = RequestManager::new(&f.db).targets(result.id).unwrap();
        assert_eq!(targets[0].status, TargetStatus::Success);
        assert_eq!(targets[0].new_filename, "Show.mkv");
        assert_eq!(targets[1].failure_kind.as_deref(), Some("destination_exists"));
    }

    #[tokio::test]
    async fn test_bad_destination_fails_request() {
        let f = fixture(&["Show_S01E02.mkv", "Show_S01E03.mkv"]);
        let blocker = f.dest.path().join("blocker");
        fs::write(&blocker, b"regular file").unwrap();
        let mut request = batch(&f, FileSelection::all());
        request.destination_path = blocker.join("sub").to_string_lossy().to_string();

        let result = executor(&f).apply_batch(&request).await.unwrap();
        assert_eq!(result.status, RequestStatus::Failed);
        assert_eq!(result.success_count, 0);
        assert_eq!(result.failed_count, 2);

        let targets = RequestManager::new(&f.db).targets(result.id).unwrap();
        assert_eq!(targets[0].message, targets[1].message);
        assert_eq!(
            targets[0].failure_kind.as_deref(),
            Some("invalid_destination_path")
        );
    }

    #[tokio::test]
    async fn test_missing_destination_is_created() {
        let f = fixture(&["Show_S01E02.mkv"]);
        let nested = f.dest.path().join("library").join("shows");
        let mut request = batch(&f, FileSelection::all());
        request.destination_path = nested.to_string_lossy().to_string();

        let result = executor(&f).apply_batch(&request).await.unwrap();
        assert_eq!(result.status, RequestStatus::Completed);
        assert_eq!(result.success_count, 1);
        assert!(nested.join("Show - S01E02.mkv").is_file());
    }

    #[tokio::test]
    async fn test_oversized_padding_fails_request() {
        let f = fixture(&["Show_S01E02.mkv"]);
        let mut request = batch(&f, FileSelection::all());
        request.rename_pattern_string = "{name} S{season:070000}".to_string();

        let result = executor(&f).apply_batch(&request).await.unwrap();
        assert_eq!(result.status, RequestStatus::Failed);
        assert_eq!(result.failed_count, 1);

        let targets = RequestManager::new(&f.db).targets(result.id).unwrap();
        assert_eq!(
            targets[0].failure_kind.as_deref(),
            Some("invalid_rename_template")
        );
    }

    #[tokio::test]
    async fn test_store_error_after_create_leaves_request_failed() {
        let f = fixture(&["Show_S01E02.mkv"]);
        f.db
            .connection()
            .lock()
            .unwrap()
            .execute("DROP TABLE change_targets", [])
            .unwrap();

        let err = executor(&f)
            .apply_batch(&batch(&f, FileSelection::all()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");

        let page = RequestManager::new(&f.db)
            .list(&crate::state::ListQuery::default())
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].status, RequestStatus::Failed);
    }

    #[test]
    fn test_dropped_run_marks_request_failed() {
        let f = fixture(&["Show_S01E02.mkv", "Show_S01E03.mkv"]);
        let requests = RequestManager::new(&f.db);
        let record = requests.create(f.pattern_id, RENAME, "/tmp").unwrap();
        let selected = vec![
            SelectedFile::Missing(f.file_ids[0]),
            SelectedFile::Missing(f.file_ids[1]),
        ];

        drop(OpenRequest::new(
            RequestManager::new(&f.db),
            record.id,
            &selected,
            "Applied pattern 'show'".to_string(),
        ));

        let detail = requests.get_detail(record.id).unwrap();
        assert_eq!(detail.request.status, RequestStatus::Failed);
        assert_eq!(detail.request.failed_count, 2);
        assert_eq!(detail.targets.len(), 2);
        assert_eq!(detail.targets[0].failure_kind.as_deref(), Some("internal"));
    }

    #[tokio::test]
    async fn test_bad_rename_template_fails_request() {
        let f = fixture(&["Show_S01E02.mkv"]);
        let mut request = batch(&f, FileSelection::all());
        request.rename_pattern_string = "{name".to_string();

        let result = executor(&f).apply_batch(&request).await.unwrap();
        assert_eq!(result.status, RequestStatus::Failed);
        assert_eq!(result.failed_count, 1);
    }

    #[tokio::test]
    async fn test_missing_ids_and_missing_fields() {
        let f = fixture(&["Show_S01E02.mkv"]);
        let mut request = batch(&f, FileSelection::Explicit(vec![f.file_ids[0], 4242]));
        request.rename_pattern_string = "{title}".to_string();

        let result = executor(&f).apply_batch(&request).await.unwrap();
        assert_eq!(result.success_count + result.failed_count, 2);

        let targets = RequestManager::new(&f.db).targets(result.id).unwrap();
        assert_eq!(targets[0].failure_kind.as_deref(), Some("missing_field"));
        assert_eq!(targets[1].original_file_id, 4242);
        assert_eq!(targets[1].failure_kind.as_deref(), Some("source_missing"));
    }

    #[tokio::test]
    async fn test_source_removed_after_indexing() {
        let f = fixture(&["Show_S01E02.mkv"]);
        fs::remove_file(f.source.path().join("Show_S01E02.mkv")).unwrap();

        let result = executor(&f)
            .apply_batch(&batch(&f, FileSelection::all()))
            .await
            .unwrap();
        let targets = RequestManager::new(&f.db).targets(result.id).unwrap();
        assert_eq!(targets[0].failure_kind.as_deref(), Some("source_missing"));
    }

    #[tokio::test]
    async fn test_empty_selection_completes() {
        let f = fixture(&["Show_S01E02.mkv"]);
        let result = executor(&f)
            .apply_batch(&batch(&f, FileSelection::Explicit(Vec::new())))
            .await
            .unwrap();
        assert_eq!(result.status, RequestStatus::Completed);
        assert_eq!(result.success_count + result.failed_count, 0);
    }

    #[tokio::test]
    async fn test_top_level_errors_write_no_request() {
        let f = fixture(&["Show_S01E02.mkv"]);
        let draft = PatternLifecycle::new(&f.db)
            .create("draft", r"(\w+)", "{}")
            .unwrap();

        let mut request = batch(&f, FileSelection::all());
        request.pattern_id = draft.id;
        let err = executor(&f).apply_batch(&request).await.unwrap_err();
        assert!(matches!(err, RefileError::PatternNotConfirmed(_)));

        request.pattern_id = 9999;
        let err = executor(&f).apply_batch(&request).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let page = RequestManager::new(&f.db)
            .list(&crate::state::ListQuery::default())
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_details_follow_selection_order() {
        let mut acc = BatchAccumulator::new(3);
        acc.record_failure(2, 30, "", "copy_failed", "late".to_string());
        acc.record_success(1, 20, "b");
        acc.record_failure(0, 10, "", "copy_failed", "early".to_string());

        assert_eq!(
            acc.details("Run"),
            "Run: 1 succeeded, 2 failed\nfile 10: early\nfile 30: late"
        );
    }

    #[test]
    fn test_accumulator_counts() {
        let mut acc = BatchAccumulator::new(3);
        acc.record_success(0, 1, "a");
        acc.record_error(2, 3, "c", &RefileError::Timeout(5));
        assert!(!acc.is_recorded(1));
        acc.record_success(1, 2, "b");

        assert_eq!(acc.success_count(), 2);
        assert_eq!(acc.failed_count(), 1);
        assert!(acc.details("Run").starts_with("Run: 2 succeeded, 1 failed\nfile 3:"));

        let targets = acc.into_targets();
        let ids: Vec<i64> = targets.iter().map(|t| t.original_file_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
