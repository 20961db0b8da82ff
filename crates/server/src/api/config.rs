//! Runtime configuration endpoints.

use axum::{extract::State, response::Json};
use refile_core::config::{ConfigPatch, RefileConfig};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ApiResult, SharedState};

/// Effective configuration
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigResponse {
    pub database_path: String,
    pub max_concurrent_copies: usize,
    /// 0 disables the per-file timeout
    pub copy_timeout_secs: u64,
    pub index_batch_size: usize,
    /// Takes effect on restart
    pub bind_address: String,
}

impl From<&RefileConfig> for ConfigResponse {
    fn from(c: &RefileConfig) -> Self {
        Self {
            database_path: c.database_path.to_string_lossy().to_string(),
            max_concurrent_copies: c.max_concurrent_copies,
            copy_timeout_secs: c.copy_timeout_secs,
            index_batch_size: c.index_batch_size,
            bind_address: c.bind_address.clone(),
        }
    }
}

/// Partial update; absent fields keep their value
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ConfigUpdate {
    pub max_concurrent_copies: Option<usize>,
    pub copy_timeout_secs: Option<u64>,
    pub index_batch_size: Option<usize>,
    pub bind_address: Option<String>,
}

/// Get current configuration
#[utoipa::path(
    get,
    path = "/api/v1/config",
    tag = "config",
    responses(
        (status = 200, description = "Current configuration", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    Json(ConfigResponse::from(&*state.config.read().await))
}

/// Update configuration (partial merge, persisted)
#[utoipa::path(
    patch,
    path = "/api/v1/config",
    tag = "config",
    request_body = ConfigUpdate,
    responses(
        (status = 200, description = "Updated configuration", body = ConfigResponse)
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    Json(update): Json<ConfigUpdate>,
) -> ApiResult<Json<ConfigResponse>> {
    let mut config = state.config.write().await;
    config.merge(ConfigPatch {
        max_concurrent_copies: update.max_concurrent_copies,
        copy_timeout_secs: update.copy_timeout_secs,
        index_batch_size: update.index_batch_size,
        bind_address: update.bind_address,
    });
    config.save_to(&state.config_path).await?;

    tracing::info!(path = %state.config_path.display(), "Configuration saved");
    Ok(Json(ConfigResponse::from(&*config)))
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestApp;
    use axum::http::StatusCode;
    use refile_core::config::RefileConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_patch_merges_and_persists() {
        let app = TestApp::new();
        let (_, _, before) = app.call("GET", "/api/v1/config", None).await;
        assert_eq!(before["max_concurrent_copies"], 8);

        let (status, _, after) = app
            .call(
                "PATCH",
                "/api/v1/config",
                Some(json!({"max_concurrent_copies": 0, "copy_timeout_secs": 5})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after["max_concurrent_copies"], 1);
        assert_eq!(after["copy_timeout_secs"], 5);
        assert_eq!(after["index_batch_size"], 500);

        let saved = RefileConfig::load_from(&app.state.config_path);
        assert_eq!(saved.copy_timeout_secs, 5);
    }
}
