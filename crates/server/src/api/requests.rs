//! # File Change Requests API
//!
//! Creating a request runs the batch to completion before responding; the
//! response carries the counters and the per-file failure summary.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use refile_core::state::{ChangeTarget, FileChangeRequest, FileChangeRequestDetail, RequestManager};
use refile_core::workflow::{BatchRequest, ChangeRequestExecutor, ExecutorConfig};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{paged, selection_or_all, ApiResult, ListParams, SharedState, WireSelection};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/:id", get(get_request))
}

// === API Types ===

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRequestBody {
    pub file_change_pattern_id: i64,
    pub rename_pattern_string: String,
    pub destination_path: String,
    /// File ids or `["all"]`; absent means all
    #[schema(value_type = Object)]
    pub file_ids: Option<WireSelection>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestResponse {
    pub id: i64,
    pub file_change_pattern_id: i64,
    pub rename_pattern_string: String,
    pub destination_path: String,
    /// pending, running, completed or failed
    pub status: String,
    pub success_count: usize,
    pub failed_count: usize,
    pub details: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<FileChangeRequest> for RequestResponse {
    fn from(r: FileChangeRequest) -> Self {
        Self {
            id: r.id,
            file_change_pattern_id: r.file_change_pattern_id,
            rename_pattern_string: r.rename_pattern_string,
            destination_path: r.destination_path,
            status: r.status.as_str().to_string(),
            success_count: r.success_count,
            failed_count: r.failed_count,
            details: r.details,
            created_at: r.created_at.to_rfc3339(),
            updated_at: r.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TargetResponse {
    pub id: i64,
    pub original_file_id: i64,
    pub new_filename: String,
    /// success or failed
    pub status: String,
    pub message: Option<String>,
    pub failure_kind: Option<String>,
}

impl From<ChangeTarget> for TargetResponse {
    fn from(t: ChangeTarget) -> Self {
        Self {
            id: t.id,
            original_file_id: t.original_file_id,
            new_filename: t.new_filename,
            status: t.status.as_str().to_string(),
            message: t.message,
            failure_kind: t.failure_kind,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestDetailResponse {
    #[serde(flatten)]
    pub request: RequestResponse,
    pub targets: Vec<TargetResponse>,
}

impl From<FileChangeRequestDetail> for RequestDetailResponse {
    fn from(d: FileChangeRequestDetail) -> Self {
        Self {
            request: d.request.into(),
            targets: d.targets.into_iter().map(Into::into).collect(),
        }
    }
}

// === Handlers ===

/// Run a batch rename/copy with a confirmed pattern
#[utoipa::path(
    post,
    path = "/api/v1/file-change-requests",
    tag = "requests",
    request_body = CreateRequestBody,
    responses(
        (status = 200, description = "Finished request (status completed or failed)", body = RequestResponse),
        (status = 404, description = "Unknown pattern", body = super::ErrorBody),
        (status = 409, description = "Pattern not confirmed", body = super::ErrorBody)
    )
)]
pub async fn create_request(
    State(state): State<SharedState>,
    Json(body): Json<CreateRequestBody>,
) -> ApiResult<Json<RequestResponse>> {
    let selection = selection_or_all(body.file_ids)?;
    let config = ExecutorConfig::from(&*state.config.read().await);

    let request = ChangeRequestExecutor::new(&state.db, config)
        .apply_batch(&BatchRequest {
            pattern_id: body.file_change_pattern_id,
            selection,
            destination_path: body.destination_path,
            rename_pattern_string: body.rename_pattern_string,
        })
        .await?;
    Ok(Json(request.into()))
}

/// List requests
#[utoipa::path(
    get,
    path = "/api/v1/file-change-requests",
    tag = "requests",
    params(
        ("_start" = Option<usize>, Query, description = "First row (inclusive)"),
        ("_end" = Option<usize>, Query, description = "Last row (exclusive)"),
        ("_sort" = Option<String>, Query, description = "Sort column"),
        ("_order" = Option<String>, Query, description = "ASC or DESC")
    ),
    responses(
        (status = 200, description = "Page of requests", body = Vec<RequestResponse>)
    )
)]
pub async fn list_requests(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let page = RequestManager::new(&state.db).list(&params.query())?;
    Ok(paged::<_, RequestResponse>("file-change-requests", page))
}

/// Get a request with its per-file targets
#[utoipa::path(
    get,
    path = "/api/v1/file-change-requests/{id}",
    tag = "requests",
    params(("id" = i64, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request and targets", body = RequestDetailResponse),
        (status = 404, description = "Unknown request", body = super::ErrorBody)
    )
)]
pub async fn get_request(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<RequestDetailResponse>> {
    Ok(Json(RequestManager::new(&state.db).get_detail(id)?.into()))
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    const SHOW: &str = r"(?P<name>[A-Za-z]+)_S(?P<season>\d+)E(?P<ep>\d+)";
    const FORMAT: &str = r#"{"name": "$0:s$", "season": "$1:d$", "ep": "$2:d$"}"#;

    async fn confirmed_pattern(app: &TestApp, ids: &[i64]) -> i64 {
        app.call(
            "POST",
            "/api/v1/file-change-patterns/test",
            Some(json!({"name": "show", "regex_pattern": SHOW, "replacement_format": FORMAT, "file_ids": ids})),
        )
        .await;
        let (_, _, body) = app
            .call(
                "POST",
                "/api/v1/file-change-patterns/confirm",
                Some(json!({"name": "show", "regex_pattern": SHOW, "replacement_format": FORMAT})),
            )
            .await;
        body["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_batch_with_partial_failure() {
        let app = TestApp::new();
        let ids = app.seed_files(&["Show_S01E02.mkv", "randomfile.txt", "Show_S01E03.mkv"]);
        let pattern_id = confirmed_pattern(&app, &ids).await;
        let dest = app.dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();

        let (status, _, body) = app
            .call(
                "POST",
                "/api/v1/file-change-requests",
                Some(json!({
                    "file_change_pattern_id": pattern_id,
                    "rename_pattern_string": "{name} - S{season:02}E{ep:02}",
                    "destination_path": dest.to_string_lossy(),
                    "file_ids": ["all"]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["success_count"], 2);
        assert_eq!(body["failed_count"], 1);
        assert!(dest.join("Show - S01E03.mkv").exists());

        let (status, _, detail) = app
            .call("GET", &format!("/api/v1/file-change-requests/{}", body["id"]), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let targets = detail["targets"].as_array().unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[1]["status"], "failed");
        assert_eq!(detail["status"], "completed");

        let (_, headers, list) = app.call("GET", "/api/v1/file-change-requests", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(headers["content-range"], "file-change-requests 0-0/1");
    }

    #[tokio::test]
    async fn test_unusable_destination_is_a_failed_request() {
        let app = TestApp::new();
        let ids = app.seed_files(&["Show_S01E02.mkv"]);
        let pattern_id = confirmed_pattern(&app, &ids).await;
        let blocker = app.dir.path().join("blocker");
        std::fs::write(&blocker, b"regular file").unwrap();

        let (status, _, body) = app
            .call(
                "POST",
                "/api/v1/file-change-requests",
                Some(json!({
                    "file_change_pattern_id": pattern_id,
                    "rename_pattern_string": "{name}",
                    "destination_path": blocker.join("nope").to_string_lossy()
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["success_count"], 0);
        assert_eq!(body["failed_count"], 1);
    }

    #[tokio::test]
    async fn test_missing_destination_is_created() {
        let app = TestApp::new();
        let ids = app.seed_files(&["Show_S01E02.mkv"]);
        let pattern_id = confirmed_pattern(&app, &ids).await;
        let dest = app.dir.path().join("library").join("shows");

        let (status, _, body) = app
            .call(
                "POST",
                "/api/v1/file-change-requests",
                Some(json!({
                    "file_change_pattern_id": pattern_id,
                    "rename_pattern_string": "{name}",
                    "destination_path": dest.to_string_lossy()
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["success_count"], 1);
        assert!(dest.join("Show.mkv").is_file());
    }

    #[tokio::test]
    async fn test_unknown_pattern_is_not_found() {
        let app = TestApp::new();
        let (status, _, body) = app
            .call(
                "POST",
                "/api/v1/file-change-requests",
                Some(json!({
                    "file_change_pattern_id": 42,
                    "rename_pattern_string": "{name}",
                    "destination_path": "/tmp"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }
}
