//! # File Change Patterns API
//!
//! CRUD plus the Draft -> Tested -> Confirmed lifecycle, classification with
//! saved patterns, and pattern introspection.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use refile_core::state::{
    ExtractedData, ExtractedDataManager, FileChangePattern, PatternManager, RefileDb, TestRecord,
};
use refile_core::tools::pattern;
use refile_core::workflow::{ClassifyReport, PatternClassifier, PatternLifecycle, PatternUpdate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{paged, selection_or_all, ApiResult, ListParams, SharedState, WireSelection};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_patterns).post(create_pattern))
        .route("/test", post(test_named_pattern))
        .route("/confirm", post(confirm_pattern))
        .route("/apply-saved-pattern", post(apply_saved_pattern))
        .route("/regex-variables", post(regex_variables))
        .route(
            "/:id",
            get(get_pattern).put(update_pattern).delete(delete_pattern),
        )
        .route("/:id/confirm", post(confirm_pattern_by_id))
        .route("/:id/reopen", post(reopen_pattern))
        .route("/:id/replacement-keys", get(replacement_keys))
        .route("/:id/extracted-data", get(extracted_data))
}

// === API Types ===

#[derive(Debug, Serialize, ToSchema)]
pub struct TestRecordResponse {
    pub passed: bool,
    pub matched: usize,
    pub failed: usize,
    pub tested_at: String,
    pub regex_pattern: String,
    pub replacement_format: String,
}

impl From<TestRecord> for TestRecordResponse {
    fn from(t: TestRecord) -> Self {
        Self {
            passed: t.passed,
            matched: t.matched,
            failed: t.failed,
            tested_at: t.tested_at.to_rfc3339(),
            regex_pattern: t.regex_pattern,
            replacement_format: t.replacement_format,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PatternResponse {
    pub id: i64,
    pub name: String,
    pub regex_pattern: String,
    pub replacement_format: String,
    /// draft, tested or confirmed
    pub stage: String,
    pub is_confirmed: bool,
    /// Pass back as `expected_version` to guard writes
    pub version: i64,
    pub last_test: Option<TestRecordResponse>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<FileChangePattern> for PatternResponse {
    fn from(p: FileChangePattern) -> Self {
        Self {
            id: p.id,
            name: p.name,
            regex_pattern: p.regex_pattern,
            replacement_format: p.replacement_format,
            stage: p.stage.as_str().to_string(),
            is_confirmed: p.is_confirmed,
            version: p.version,
            last_test: p.last_test.map(Into::into),
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePatternRequest {
    pub name: String,
    pub regex_pattern: String,
    #[serde(default)]
    pub replacement_format: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePatternRequest {
    pub name: Option<String>,
    pub regex_pattern: Option<String>,
    pub replacement_format: Option<String>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TestNamedRequest {
    pub name: String,
    pub regex_pattern: String,
    #[serde(default)]
    pub replacement_format: String,
    pub file_ids: Vec<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestNamedResponse {
    pub pattern: PatternResponse,
    /// file id -> extracted fields, null, or `{"error", "kind"}`
    #[schema(value_type = Object)]
    pub results: serde_json::Value,
    pub passed: bool,
    pub matched: usize,
    pub failed: usize,
    /// False when the stored pattern is confirmed and was left untouched
    pub recorded: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmRequest {
    pub name: String,
    pub regex_pattern: String,
    #[serde(default)]
    pub replacement_format: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ConfirmByIdRequest {
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplySavedRequest {
    pub pattern_ids: Vec<i64>,
    /// File ids, or `["all"]`
    #[schema(value_type = Object)]
    pub file_ids: Option<WireSelection>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClassifyResponse {
    pub classified: usize,
    pub unmatched: usize,
}

impl From<ClassifyReport> for ClassifyResponse {
    fn from(r: ClassifyReport) -> Self {
        Self {
            classified: r.classified,
            unmatched: r.unmatched,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegexVariablesRequest {
    pub regex_pattern: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtractedDataResponse {
    pub id: i64,
    pub file_id: i64,
    pub pattern_id: i64,
    #[schema(value_type = Object)]
    pub extracted_values: serde_json::Value,
    pub created_at: String,
}

impl From<ExtractedData> for ExtractedDataResponse {
    fn from(d: ExtractedData) -> Self {
        Self {
            id: d.id,
            file_id: d.file_id,
            pattern_id: d.pattern_id,
            extracted_values: d.extracted_values,
            created_at: d.created_at.to_rfc3339(),
        }
    }
}

/// Confirming changes the pattern set, so stored extractions are rebuilt.
/// Failures are logged; the confirm itself stands.
async fn reapply_confirmed(db: &RefileDb) {
    let db = db.clone();
    let result =
        tokio::task::spawn_blocking(move || PatternClassifier::new(&db).reapply_all()).await;
    match result {
        Ok(Ok(report)) => tracing::info!(
            classified = report.classified,
            unmatched = report.unmatched,
            "Re-applied confirmed patterns"
        ),
        Ok(Err(e)) => tracing::warn!("Re-applying confirmed patterns failed: {}", e),
        Err(e) => tracing::error!("Re-apply task panicked: {}", e),
    }
}

// === Handlers ===

/// List patterns
#[utoipa::path(
    get,
    path = "/api/v1/file-change-patterns",
    tag = "patterns",
    params(
        ("_start" = Option<usize>, Query, description = "First row (inclusive)"),
        ("_end" = Option<usize>, Query, description = "Last row (exclusive)"),
        ("_sort" = Option<String>, Query, description = "Sort column"),
        ("_order" = Option<String>, Query, description = "ASC or DESC")
    ),
    responses(
        (status = 200, description = "Page of patterns", body = Vec<PatternResponse>)
    )
)]
pub async fn list_patterns(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let page = PatternManager::new(&state.db).list(&params.query())?;
    Ok(paged::<_, PatternResponse>("file-change-patterns", page))
}

/// Create a Draft pattern
#[utoipa::path(
    post,
    path = "/api/v1/file-change-patterns",
    tag = "patterns",
    request_body = CreatePatternRequest,
    responses(
        (status = 201, description = "Draft created", body = PatternResponse),
        (status = 400, description = "Invalid regex or format", body = super::ErrorBody),
        (status = 409, description = "Name already used", body = super::ErrorBody)
    )
)]
pub async fn create_pattern(
    State(state): State<SharedState>,
    Json(req): Json<CreatePatternRequest>,
) -> ApiResult<(StatusCode, Json<PatternResponse>)> {
    let pattern = PatternLifecycle::new(&state.db).create(
        &req.name,
        &req.regex_pattern,
        &req.replacement_format,
    )?;
    Ok((StatusCode::CREATED, Json(pattern.into())))
}

/// Get one pattern
#[utoipa::path(
    get,
    path = "/api/v1/file-change-patterns/{id}",
    tag = "patterns",
    params(("id" = i64, Path, description = "Pattern ID")),
    responses(
        (status = 200, description = "Pattern", body = PatternResponse),
        (status = 404, description = "Unknown pattern", body = super::ErrorBody)
    )
)]
pub async fn get_pattern(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PatternResponse>> {
    Ok(Json(PatternLifecycle::new(&state.db).get(id)?.into()))
}

/// Edit a pattern; definition changes send it back to Draft
#[utoipa::path(
    put,
    path = "/api/v1/file-change-patterns/{id}",
    tag = "patterns",
    params(("id" = i64, Path, description = "Pattern ID")),
    request_body = UpdatePatternRequest,
    responses(
        (status = 200, description = "Updated pattern", body = PatternResponse),
        (status = 409, description = "Confirmed, stale version, or name taken", body = super::ErrorBody)
    )
)]
pub async fn update_pattern(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePatternRequest>,
) -> ApiResult<Json<PatternResponse>> {
    let update = PatternUpdate {
        name: req.name,
        regex_pattern: req.regex_pattern,
        replacement_format: req.replacement_format,
        expected_version: req.expected_version,
    };
    Ok(Json(PatternLifecycle::new(&state.db).update(id, &update)?.into()))
}

/// Delete a pattern and its extracted data
#[utoipa::path(
    delete,
    path = "/api/v1/file-change-patterns/{id}",
    tag = "patterns",
    params(("id" = i64, Path, description = "Pattern ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown pattern", body = super::ErrorBody)
    )
)]
pub async fn delete_pattern(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    PatternLifecycle::new(&state.db).delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Test a definition under a name and record the outcome
#[utoipa::path(
    post,
    path = "/api/v1/file-change-patterns/test",
    tag = "patterns",
    request_body = TestNamedRequest,
    responses(
        (status = 200, description = "Per-file results and verdict", body = TestNamedResponse),
        (status = 400, description = "Invalid regex or format", body = super::ErrorBody)
    )
)]
pub async fn test_named_pattern(
    State(state): State<SharedState>,
    Json(req): Json<TestNamedRequest>,
) -> ApiResult<Json<TestNamedResponse>> {
    let outcome = PatternLifecycle::new(&state.db).test_named(
        &req.name,
        &req.regex_pattern,
        &req.replacement_format,
        &req.file_ids,
    )?;

    let results = serde_json::to_value(outcome.report.results_map())
        .map_err(refile_core::RefileError::from)?;
    Ok(Json(TestNamedResponse {
        passed: outcome.report.passed(),
        matched: outcome.report.matched,
        failed: outcome.report.failed,
        results,
        recorded: outcome.recorded,
        pattern: outcome.pattern.into(),
    }))
}

/// Confirm the named pattern if it was tested with exactly this definition
#[utoipa::path(
    post,
    path = "/api/v1/file-change-patterns/confirm",
    tag = "patterns",
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Confirmed pattern", body = PatternResponse),
        (status = 404, description = "Unknown name", body = super::ErrorBody),
        (status = 409, description = "Not tested with this definition", body = super::ErrorBody)
    )
)]
pub async fn confirm_pattern(
    State(state): State<SharedState>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<Json<PatternResponse>> {
    let pattern = PatternLifecycle::new(&state.db).confirm_by_definition(
        &req.name,
        &req.regex_pattern,
        &req.replacement_format,
    )?;
    reapply_confirmed(&state.db).await;
    Ok(Json(pattern.into()))
}

/// Confirm a Tested pattern by id
#[utoipa::path(
    post,
    path = "/api/v1/file-change-patterns/{id}/confirm",
    tag = "patterns",
    params(("id" = i64, Path, description = "Pattern ID")),
    request_body(content = ConfirmByIdRequest, description = "Optional; omit to skip the version check"),
    responses(
        (status = 200, description = "Confirmed pattern", body = PatternResponse),
        (status = 409, description = "Not tested, or stale version", body = super::ErrorBody)
    )
)]
pub async fn confirm_pattern_by_id(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    body: Option<Json<ConfirmByIdRequest>>,
) -> ApiResult<Json<PatternResponse>> {
    let expected = body.and_then(|Json(b)| b.expected_version);
    let pattern = PatternLifecycle::new(&state.db).confirm(id, expected)?;
    reapply_confirmed(&state.db).await;
    Ok(Json(pattern.into()))
}

/// Send a Confirmed pattern back to Draft
#[utoipa::path(
    post,
    path = "/api/v1/file-change-patterns/{id}/reopen",
    tag = "patterns",
    params(("id" = i64, Path, description = "Pattern ID")),
    responses(
        (status = 200, description = "Draft pattern", body = PatternResponse)
    )
)]
pub async fn reopen_pattern(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PatternResponse>> {
    Ok(Json(PatternLifecycle::new(&state.db).reopen(id)?.into()))
}

/// Classify files with saved (confirmed) patterns
#[utoipa::path(
    post,
    path = "/api/v1/file-change-patterns/apply-saved-pattern",
    tag = "patterns",
    request_body = ApplySavedRequest,
    responses(
        (status = 200, description = "Classification counts", body = ClassifyResponse),
        (status = 409, description = "A pattern is not confirmed", body = super::ErrorBody)
    )
)]
pub async fn apply_saved_pattern(
    State(state): State<SharedState>,
    Json(req): Json<ApplySavedRequest>,
) -> ApiResult<Json<ClassifyResponse>> {
    let selection = selection_or_all(req.file_ids)?;
    let db = state.db.clone();
    let report = tokio::task::spawn_blocking(move || {
        PatternClassifier::new(&db).apply_saved(&req.pattern_ids, &selection)
    })
    .await
    .map_err(|e| refile_core::RefileError::Internal(e.to_string()))??;
    Ok(Json(report.into()))
}

/// Capture group identifiers of a regex, in index order
#[utoipa::path(
    post,
    path = "/api/v1/file-change-patterns/regex-variables",
    tag = "patterns",
    request_body = RegexVariablesRequest,
    responses(
        (status = 200, description = "Identifiers (`group_N` for unnamed groups)", body = Vec<String>),
        (status = 400, description = "Invalid regex", body = super::ErrorBody)
    )
)]
pub async fn regex_variables(
    Json(req): Json<RegexVariablesRequest>,
) -> ApiResult<Json<Vec<String>>> {
    let variables = pattern::extract_variables(&req.regex_pattern)?;
    Ok(Json(variables.iter().map(|v| v.identifier()).collect()))
}

/// Keys the pattern produces for each matching file
#[utoipa::path(
    get,
    path = "/api/v1/file-change-patterns/{id}/replacement-keys",
    tag = "patterns",
    params(("id" = i64, Path, description = "Pattern ID")),
    responses(
        (status = 200, description = "Replacement keys", body = Vec<String>)
    )
)]
pub async fn replacement_keys(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<String>>> {
    let stored = PatternManager::new(&state.db).get(id)?;
    let compiled = pattern::compile_with_template(&stored.regex_pattern, &stored.replacement_format)?;
    let keys = match compiled.template() {
        Some(template) => template.keys(),
        // Raw-capture mode
        None => compiled.variables().iter().map(|v| v.identifier()).collect(),
    };
    Ok(Json(keys))
}

/// Stored extractions produced by a pattern
#[utoipa::path(
    get,
    path = "/api/v1/file-change-patterns/{id}/extracted-data",
    tag = "patterns",
    params(("id" = i64, Path, description = "Pattern ID")),
    responses(
        (status = 200, description = "Extracted rows", body = Vec<ExtractedDataResponse>),
        (status = 404, description = "Unknown pattern", body = super::ErrorBody)
    )
)]
pub async fn extracted_data(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ExtractedDataResponse>>> {
    PatternManager::new(&state.db).get(id)?;
    let rows = ExtractedDataManager::new(&state.db).list_by_pattern(id)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
