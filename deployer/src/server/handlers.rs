//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::errors::DeployError;
use crate::models::deploy::{Deploy, DeployOutcome, DeployRequest, DeploySnapshot};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Header carrying the initiating user
pub const USER_HEADER: &str = "x-user-id";

const DEFAULT_USER: &str = "system";

/// Error body returned by every failing handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps deployer errors onto HTTP statuses
pub struct ApiError(pub DeployError);

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DeployError::ValidationError(_) => StatusCode::BAD_REQUEST,
            DeployError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "iis-deployer".to_string(),
        version: version_info().version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Run a deploy and answer with its outcome
///
/// A deploy that ran but failed is still a 200; `success` tells them apart.
pub async fn create_deploy_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<DeployRequest>,
) -> Result<Json<DeployOutcome>, ApiError> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string();

    let outcome = state.orchestrator.deploy(request, &user_id).await?;
    Ok(Json(outcome))
}

/// Deploy listing
#[derive(Debug, Serialize)]
pub struct DeploysResponse {
    pub deploys: Vec<Deploy>,
    pub total: usize,
}

pub async fn list_deploys_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<DeploysResponse>, ApiError> {
    let deploys = state.store().list_deploys().await?;
    Ok(Json(DeploysResponse {
        total: deploys.len(),
        deploys,
    }))
}

pub async fn get_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeploySnapshot>, ApiError> {
    state
        .store()
        .get_deploy(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(DeployError::NotFound(format!("deploy {}", id))))
}
