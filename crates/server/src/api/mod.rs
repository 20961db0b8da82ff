//! # HTTP API
//!
//! Axum routes under `/api/v1`. Handlers are thin: they translate wire
//! shapes into core calls and core types into response DTOs.

pub mod config;
pub mod exclusions;
pub mod files;
pub mod patterns;
pub mod requests;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use refile_core::config::RefileConfig;
use refile_core::state::{CatalogFilter, ListQuery, Page, RefileDb, SortOrder};
use refile_core::workflow::FileSelection;
use refile_core::RefileError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::{OpenApi, ToSchema};

/// Application state
pub struct AppState {
    pub db: RefileDb,
    pub config: RwLock<RefileConfig>,
    /// Where `PATCH /config` persists
    pub config_path: PathBuf,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: RefileDb, config: RefileConfig, config_path: PathBuf) -> SharedState {
        Arc::new(Self {
            db,
            config: RwLock::new(config),
            config_path,
        })
    }
}

// === Errors ===

/// Error body: `{"detail": "...", "kind": "..."}`
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
    pub kind: String,
}

#[derive(Debug)]
pub struct ApiError(pub RefileError);

impl From<RefileError> for ApiError {
    fn from(err: RefileError) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn status_for(err: &RefileError) -> StatusCode {
    use RefileError::*;
    match err {
        InvalidRegex(_)
        | InvalidTemplate(_)
        | InvalidRenameTemplate(_)
        | InvalidDirectory { .. }
        | InvalidSelection(_)
        | Validation(_)
        | InvalidDestinationPath { .. } => StatusCode::BAD_REQUEST,
        NotFound { .. } => StatusCode::NOT_FOUND,
        AlreadyExists { .. }
        | Conflict { .. }
        | PatternConfirmed(_)
        | PatternNotTested(_)
        | PatternNotConfirmed(_) => StatusCode::CONFLICT,
        e if e.is_per_file() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), "Request failed: {}", self.0);
        }
        let body = ErrorBody {
            detail: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// === Paging ===

/// `_start`, `_end`, `_sort`, `_order` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "_start")]
    pub start: Option<usize>,
    #[serde(rename = "_end")]
    pub end: Option<usize>,
    #[serde(rename = "_sort")]
    pub sort: Option<String>,
    #[serde(rename = "_order")]
    pub order: Option<String>,
}

impl ListParams {
    pub fn query(&self) -> ListQuery {
        ListQuery {
            start: self.start.unwrap_or(0),
            end: self.end,
            sort: self.sort.clone(),
            order: self
                .order
                .as_deref()
                .map(SortOrder::from_str)
                .unwrap_or_default(),
        }
    }
}

/// JSON array plus `Content-Range` and `X-Total-Count`
pub fn paged<T, R>(resource: &str, page: Page<T>) -> impl IntoResponse
where
    R: Serialize + From<T>,
{
    let last = if page.items.is_empty() {
        page.start
    } else {
        page.last_index()
    };
    let range = format!("{} {}-{}/{}", resource, page.start, last, page.total);

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&range) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    headers.insert("x-total-count", HeaderValue::from(page.total as u64));
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Range, X-Total-Count"),
    );

    let items: Vec<R> = page.items.into_iter().map(R::from).collect();
    (headers, Json(items))
}

// === Selections ===

/// `file_ids` on the wire: a list of ids, or the literal `["all"]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireSelection {
    Ids(Vec<i64>),
    Tokens(Vec<String>),
}

impl WireSelection {
    pub fn into_selection(self, filter: CatalogFilter) -> Result<FileSelection, RefileError> {
        match self {
            Self::Ids(ids) => Ok(FileSelection::Explicit(ids)),
            Self::Tokens(tokens) if tokens.len() == 1 && tokens[0] == "all" => {
                Ok(FileSelection::AllMatching(filter))
            }
            Self::Tokens(tokens) => Err(RefileError::InvalidSelection(format!(
                "expected file ids or [\"all\"], got {:?}",
                tokens
            ))),
        }
    }
}

/// Absent selection means every cataloged file
pub fn selection_or_all(wire: Option<WireSelection>) -> Result<FileSelection, RefileError> {
    match wire {
        Some(wire) => wire.into_selection(CatalogFilter::default()),
        None => Ok(FileSelection::all()),
    }
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Refile API",
        version = "1.0.0",
        description = "Catalog files, extract fields with confirmed patterns, and copy them under rendered names"
    ),
    paths(
        files::index_directory,
        files::list_files,
        files::get_file,
        files::delete_file,
        files::apply_patterns_to_file,
        files::rename_and_copy,
        patterns::list_patterns,
        patterns::create_pattern,
        patterns::get_pattern,
        patterns::update_pattern,
        patterns::delete_pattern,
        patterns::test_named_pattern,
        patterns::confirm_pattern,
        patterns::confirm_pattern_by_id,
        patterns::reopen_pattern,
        patterns::apply_saved_pattern,
        patterns::regex_variables,
        patterns::replacement_keys,
        patterns::extracted_data,
        exclusions::list_exclusions,
        exclusions::create_exclusion,
        exclusions::get_exclusion,
        exclusions::update_exclusion,
        exclusions::delete_exclusion,
        requests::create_request,
        requests::list_requests,
        requests::get_request,
        config::get_config,
        config::update_config,
        test::test_pattern
    ),
    components(
        schemas(
            ErrorBody,
            files::FileResponse,
            files::IndexRequest,
            files::IndexResponse,
            files::RenameAndCopyRequest,
            patterns::PatternResponse,
            patterns::TestRecordResponse,
            patterns::CreatePatternRequest,
            patterns::UpdatePatternRequest,
            patterns::TestNamedRequest,
            patterns::TestNamedResponse,
            patterns::ConfirmRequest,
            patterns::ConfirmByIdRequest,
            patterns::ApplySavedRequest,
            patterns::ClassifyResponse,
            patterns::RegexVariablesRequest,
            patterns::ExtractedDataResponse,
            exclusions::ExclusionResponse,
            exclusions::CreateExclusionRequest,
            exclusions::UpdateExclusionRequest,
            requests::CreateRequestBody,
            requests::RequestResponse,
            requests::TargetResponse,
            requests::RequestDetailResponse,
            config::ConfigResponse,
            config::ConfigUpdate,
            test::TestPatternRequest
        )
    ),
    tags(
        (name = "files", description = "File catalog"),
        (name = "patterns", description = "File change patterns and their lifecycle"),
        (name = "exclusions", description = "Indexing exclusions"),
        (name = "requests", description = "Batch rename/copy requests"),
        (name = "config", description = "Runtime configuration"),
        (name = "test", description = "Ad-hoc pattern testing")
    )
)]
pub struct ApiDoc;

async fn serve_openapi() -> impl IntoResponse {
    match ApiDoc::openapi().to_json() {
        Ok(spec) => Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(spec))
            .unwrap_or_default(),
        Err(e) => ApiError(RefileError::Internal(e.to_string())).into_response(),
    }
}

pub fn router(state: SharedState) -> Router {
    let api = Router::new()
        .nest("/files", files::routes())
        .nest("/file-change-patterns", patterns::routes())
        .nest("/exclusion-patterns", exclusions::routes())
        .nest("/file-change-requests", requests::routes())
        .nest("/test", test::routes())
        .route("/config", get(config::get_config).patch(config::update_config))
        .route("/openapi.json", get(serve_openapi));

    Router::new().nest("/api/v1", api).with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Router fixtures shared by the handler tests

    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use refile_core::state::{CatalogManager, NewFile};
    use tower::ServiceExt;

    pub struct TestApp {
        pub state: SharedState,
        pub dir: tempfile::TempDir,
    }

    impl TestApp {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = RefileDb::open_in_memory().unwrap();
            let config = RefileConfig {
                database_path: dir.path().join("refile.db"),
                ..Default::default()
            };
            let state = AppState::new(db, config, dir.path().join("config.json"));
            Self { state, dir }
        }

        /// Catalog entries for files that exist on disk under the fixture dir
        pub fn seed_files(&self, names: &[&str]) -> Vec<i64> {
            let src = self.dir.path().join("src");
            std::fs::create_dir_all(&src).unwrap();
            let files: Vec<NewFile> = names
                .iter()
                .map(|n| {
                    let path = src.join(n);
                    std::fs::write(&path, n.as_bytes()).unwrap();
                    NewFile::from_path(&path, n.len() as u64).unwrap()
                })
                .collect();
            CatalogManager::new(&self.state.db)
                .insert_new(&files)
                .unwrap()
                .into_iter()
                .map(|f| f.id)
                .collect()
        }

        pub async fn call(
            &self,
            method: &str,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, HeaderMap, serde_json::Value) {
            let builder = Request::builder().method(method).uri(uri);
            let req = match body {
                Some(json) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = router(self.state.clone()).oneshot(req).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
            let json = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, headers, json)
        }
    }
}
