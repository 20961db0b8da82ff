//! Exclusion pattern CRUD.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use refile_core::state::{ExclusionManager, ExclusionPattern, ExclusionUpdate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{paged, ApiResult, ListParams, SharedState};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_exclusions).post(create_exclusion))
        .route(
            "/:id",
            get(get_exclusion)
                .put(update_exclusion)
                .delete(delete_exclusion),
        )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExclusionResponse {
    pub id: i64,
    pub name: String,
    /// Regex, or glob with a `glob:` prefix
    pub pattern: String,
    pub is_active: bool,
}

impl From<ExclusionPattern> for ExclusionResponse {
    fn from(p: ExclusionPattern) -> Self {
        Self {
            id: p.id,
            name: p.name,
            pattern: p.pattern,
            is_active: p.is_active,
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateExclusionRequest {
    pub name: String,
    pub pattern: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateExclusionRequest {
    pub name: Option<String>,
    pub pattern: Option<String>,
    pub is_active: Option<bool>,
}

/// List exclusion patterns
#[utoipa::path(
    get,
    path = "/api/v1/exclusion-patterns",
    tag = "exclusions",
    params(
        ("_start" = Option<usize>, Query, description = "First row (inclusive)"),
        ("_end" = Option<usize>, Query, description = "Last row (exclusive)"),
        ("_sort" = Option<String>, Query, description = "Sort column"),
        ("_order" = Option<String>, Query, description = "ASC or DESC")
    ),
    responses(
        (status = 200, description = "Page of exclusions", body = Vec<ExclusionResponse>)
    )
)]
pub async fn list_exclusions(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let page = ExclusionManager::new(&state.db).list(&params.query())?;
    Ok(paged::<_, ExclusionResponse>("exclusion-patterns", page))
}

/// Create an exclusion pattern
#[utoipa::path(
    post,
    path = "/api/v1/exclusion-patterns",
    tag = "exclusions",
    request_body = CreateExclusionRequest,
    responses(
        (status = 201, description = "Created", body = ExclusionResponse),
        (status = 400, description = "Invalid pattern", body = super::ErrorBody),
        (status = 409, description = "Name already used", body = super::ErrorBody)
    )
)]
pub async fn create_exclusion(
    State(state): State<SharedState>,
    Json(req): Json<CreateExclusionRequest>,
) -> ApiResult<(StatusCode, Json<ExclusionResponse>)> {
    let created = ExclusionManager::new(&state.db).create(&req.name, &req.pattern, req.is_active)?;
    tracing::info!(id = created.id, name = %created.name, "Exclusion created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/exclusion-patterns/{id}",
    tag = "exclusions",
    params(("id" = i64, Path, description = "Exclusion ID")),
    responses(
        (status = 200, description = "Exclusion", body = ExclusionResponse),
        (status = 404, description = "Unknown exclusion", body = super::ErrorBody)
    )
)]
pub async fn get_exclusion(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ExclusionResponse>> {
    Ok(Json(ExclusionManager::new(&state.db).get(id)?.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/exclusion-patterns/{id}",
    tag = "exclusions",
    params(("id" = i64, Path, description = "Exclusion ID")),
    request_body = UpdateExclusionRequest,
    responses(
        (status = 200, description = "Updated", body = ExclusionResponse)
    )
)]
pub async fn update_exclusion(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateExclusionRequest>,
) -> ApiResult<Json<ExclusionResponse>> {
    let update = ExclusionUpdate {
        name: req.name,
        pattern: req.pattern,
        is_active: req.is_active,
    };
    Ok(Json(ExclusionManager::new(&state.db).update(id, &update)?.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/exclusion-patterns/{id}",
    tag = "exclusions",
    params(("id" = i64, Path, description = "Exclusion ID")),
    responses(
        (status = 204, description = "Deleted")
    )
)]
pub async fn delete_exclusion(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    ExclusionManager::new(&state.db).delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}
