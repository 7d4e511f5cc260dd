use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::{Application, ImageStatus};
use crate::services::applications::{self, ApplicationOverview, SubmitApplication};
use crate::AppState;
use crate::extract::Json;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct SubmitApplicationRequest {
    pub git_repo: String,
    pub branch: String,
    pub base_image: String,
    pub image_name: Option<String>,
    #[serde(default)]
    pub run_commands: Vec<String>,
    #[serde(default)]
    pub entrypoint: String,
}

/// Submit a build request for review
#[utoipa::path(post, path = "/api/developer/applications", request_body = SubmitApplicationRequest,
    responses( (status=201, description="application created, pending review"), (status=400, description="missing fields") ))]
#[tracing::instrument(level = "info", skip_all, fields(developer = %identity.username))]
pub async fn submit(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SubmitApplicationRequest>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    let app = applications::submit(
        &state,
        &identity,
        SubmitApplication {
            git_repo: req.git_repo,
            branch: req.branch,
            base_image: req.base_image,
            image_name: req.image_name,
            run_commands: req.run_commands,
            entrypoint: req.entrypoint,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(app)))
}

/// Applications submitted by the calling developer
#[utoipa::path(get, path = "/api/developer/applications", responses( (status=200, description="own applications") ))]
pub async fn list_own(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Application>>> {
    let apps = applications::list_for_developer(&state.db, identity.user_id)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(apps))
}

/// Review queue: every application with resolved usernames
#[utoipa::path(get, path = "/api/operator/applications", responses( (status=200, description="all applications") ))]
pub async fn list_all(State(state): State<AppState>) -> ApiResult<Json<Vec<ApplicationOverview>>> {
    let apps = applications::list_all(&state.db)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(apps))
}

#[derive(Serialize, ToSchema)]
pub struct ApproveResponse {
    pub image_id: Uuid,
    pub image_status: ImageStatus,
}

/// Approve a pending application; triggers the image build
#[utoipa::path(post, path = "/api/operator/applications/{id}/approve",
    params( ("id" = Uuid, Path, description = "Application id") ),
    responses( (status=200, body=ApproveResponse), (status=404, description="unknown application"), (status=409, description="not pending or review in progress") ))]
#[tracing::instrument(level = "info", skip(state, identity), fields(operator = %identity.username))]
pub async fn approve(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApproveResponse>> {
    let image = applications::approve(&state, &identity, id).await?;
    Ok(Json(ApproveResponse { image_id: image.id, image_status: image.status }))
}

/// Reject a pending application
#[utoipa::path(post, path = "/api/operator/applications/{id}/reject",
    params( ("id" = Uuid, Path, description = "Application id") ),
    responses( (status=200, description="rejected application"), (status=404, description="unknown application"), (status=409, description="not pending") ))]
#[tracing::instrument(level = "info", skip(state, identity), fields(operator = %identity.username))]
pub async fn reject(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    let app = applications::reject(&state, &identity, id).await?;
    Ok(Json(app))
}
