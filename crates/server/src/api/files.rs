//! # Files API
//!
//! Catalog listing, indexing, per-file classification, and the ad-hoc
//! rename-and-copy entry point.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use refile_core::state::{CatalogFilter, CatalogManager, IndexedFile};
use refile_core::tools::indexer;
use refile_core::workflow::{
    BatchRequest, ChangeRequestExecutor, ExecutorConfig, FileSelection, PatternClassifier,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::requests::RequestResponse;
use super::{paged, ApiResult, ListParams, SharedState};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_files))
        .route("/index", post(index_directory))
        .route("/rename-and-copy", post(rename_and_copy))
        .route("/:id", get(get_file).delete(delete_file))
        .route("/:id/apply-patterns", post(apply_patterns_to_file))
}

// === API Types ===

#[derive(Debug, Serialize, ToSchema)]
pub struct FileResponse {
    pub id: i64,
    pub filename: String,
    pub extension: String,
    pub directory: String,
    pub full_path: String,
    pub size: u64,
    pub extraction_failed: bool,
    pub extraction_failure_reason: Option<String>,
    pub created_at: String,
}

impl From<IndexedFile> for FileResponse {
    fn from(f: IndexedFile) -> Self {
        Self {
            id: f.id,
            filename: f.filename,
            extension: f.extension,
            directory: f.directory,
            full_path: f.full_path,
            size: f.size,
            extraction_failed: f.extraction_failed,
            extraction_failure_reason: f.extraction_failure_reason,
            created_at: f.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IndexRequest {
    pub directory_path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IndexResponse {
    /// Only the entries this run added
    pub indexed_files: Vec<FileResponse>,
    pub pruned: usize,
}

/// Paging plus catalog filters (`serde(flatten)` breaks numeric query parsing)
#[derive(Debug, Default, Deserialize)]
pub struct FileFilterParams {
    #[serde(rename = "_start")]
    pub start: Option<usize>,
    #[serde(rename = "_end")]
    pub end: Option<usize>,
    #[serde(rename = "_sort")]
    pub sort: Option<String>,
    #[serde(rename = "_order")]
    pub order: Option<String>,
    pub filename: Option<String>,
    pub directory: Option<String>,
    pub extension: Option<String>,
}

impl FileFilterParams {
    fn split(self) -> (ListParams, CatalogFilter) {
        (
            ListParams {
                start: self.start,
                end: self.end,
                sort: self.sort,
                order: self.order,
            },
            CatalogFilter {
                directory: self.directory,
                extension: self.extension,
                filename_contains: self.filename,
            },
        )
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameAndCopyRequest {
    pub file_change_pattern_id: i64,
    pub file_ids: Vec<i64>,
    pub destination_path: String,
    pub rename_pattern_string: String,
}

// === Handlers ===

/// Index a directory tree into the catalog
#[utoipa::path(
    post,
    path = "/api/v1/files/index",
    tag = "files",
    request_body = IndexRequest,
    responses(
        (status = 200, description = "Newly indexed files", body = IndexResponse),
        (status = 400, description = "Missing or non-directory path", body = super::ErrorBody)
    )
)]
pub async fn index_directory(
    State(state): State<SharedState>,
    Json(req): Json<IndexRequest>,
) -> ApiResult<Json<IndexResponse>> {
    let batch_size = state.config.read().await.index_batch_size;
    let report = indexer::index(
        &state.db,
        std::path::Path::new(&req.directory_path),
        batch_size,
    )
    .await?;

    Ok(Json(IndexResponse {
        indexed_files: report.indexed_files.into_iter().map(Into::into).collect(),
        pruned: report.pruned,
    }))
}

/// List cataloged files
#[utoipa::path(
    get,
    path = "/api/v1/files",
    tag = "files",
    params(
        ("_start" = Option<usize>, Query, description = "First row (inclusive)"),
        ("_end" = Option<usize>, Query, description = "Last row (exclusive)"),
        ("_sort" = Option<String>, Query, description = "Sort column"),
        ("_order" = Option<String>, Query, description = "ASC or DESC"),
        ("filename" = Option<String>, Query, description = "Filename substring"),
        ("directory" = Option<String>, Query, description = "Directory prefix"),
        ("extension" = Option<String>, Query, description = "Exact extension")
    ),
    responses(
        (status = 200, description = "Page of files", body = Vec<FileResponse>)
    )
)]
pub async fn list_files(
    State(state): State<SharedState>,
    Query(params): Query<FileFilterParams>,
) -> ApiResult<impl IntoResponse> {
    let (list, filter) = params.split();
    let page = CatalogManager::new(&state.db).list(&list.query(), &filter)?;
    Ok(paged::<_, FileResponse>("files", page))
}

/// Get one file
#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    tag = "files",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 200, description = "File", body = FileResponse),
        (status = 404, description = "Unknown file", body = super::ErrorBody)
    )
)]
pub async fn get_file(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<FileResponse>> {
    Ok(Json(CatalogManager::new(&state.db).get(id)?.into()))
}

/// Remove a file from the catalog (the file on disk is untouched)
#[utoipa::path(
    delete,
    path = "/api/v1/files/{id}",
    tag = "files",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown file", body = super::ErrorBody)
    )
)]
pub async fn delete_file(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    CatalogManager::new(&state.db).delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-run every confirmed pattern over one file
#[utoipa::path(
    post,
    path = "/api/v1/files/{id}/apply-patterns",
    tag = "files",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 200, description = "File with updated extraction state", body = FileResponse),
        (status = 404, description = "Unknown file", body = super::ErrorBody)
    )
)]
pub async fn apply_patterns_to_file(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<FileResponse>> {
    let file = PatternClassifier::new(&state.db).apply_to_file(id)?;
    Ok(Json(file.into()))
}

/// Apply a confirmed pattern to explicit files and copy them under new names
#[utoipa::path(
    post,
    path = "/api/v1/files/rename-and-copy",
    tag = "files",
    request_body = RenameAndCopyRequest,
    responses(
        (status = 200, description = "Finished request, including per-file failures", body = RequestResponse),
        (status = 404, description = "Unknown pattern", body = super::ErrorBody),
        (status = 409, description = "Pattern not confirmed", body = super::ErrorBody)
    )
)]
pub async fn rename_and_copy(
    State(state): State<SharedState>,
    Json(req): Json<RenameAndCopyRequest>,
) -> ApiResult<Json<RequestResponse>> {
    let config = ExecutorConfig::from(&*state.config.read().await);
    let request = ChangeRequestExecutor::new(&state.db, config)
        .apply_batch(&BatchRequest {
            pattern_id: req.file_change_pattern_id,
            selection: FileSelection::Explicit(req.file_ids),
            destination_path: req.destination_path,
            rename_pattern_string: req.rename_pattern_string,
        })
        .await?;
    Ok(Json(request.into()))
}
