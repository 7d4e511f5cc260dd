use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::ImageStatus;
use crate::services::images::{self, ImageDeploymentRow, ImageOverview};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Registry listing with live deployment counts
#[utoipa::path(get, path = "/api/operator/images", responses( (status=200, description="all images") ))]
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<ImageOverview>>> {
    let images = images::list(&state.db)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(images))
}

#[derive(Serialize, ToSchema)]
pub struct ImageDetail {
    pub id: Uuid,
    pub name: String,
    pub tag: String,
    pub status: ImageStatus,
    pub build_number: i64,
    pub dockerfile: String,
    pub build_log: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Image detail including the generated Dockerfile and build log
#[utoipa::path(get, path = "/api/operator/images/{id}",
    params( ("id" = Uuid, Path, description = "Image id") ),
    responses( (status=200, body=ImageDetail), (status=404, description="unknown image") ))]
pub async fn detail(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ImageDetail>> {
    let image = images::get(&state.db, id).await?;
    Ok(Json(ImageDetail {
        id: image.id,
        name: image.name,
        tag: image.tag,
        status: image.status,
        build_number: image.build_number,
        dockerfile: image.dockerfile,
        build_log: image.build_log,
        failure_reason: image.failure_reason,
        created_at: image.created_at,
    }))
}

#[derive(Serialize, ToSchema)]
pub struct RebuildResponse {
    pub id: Uuid,
    pub tag: String,
    pub status: ImageStatus,
}

/// Re-pull sources and rebuild the image in place
#[utoipa::path(post, path = "/api/operator/images/{id}/rebuild",
    params( ("id" = Uuid, Path, description = "Image id") ),
    responses( (status=200, body=RebuildResponse), (status=404, description="unknown image"), (status=409, description="build already in progress") ))]
#[tracing::instrument(level = "info", skip(state, identity), fields(operator = %identity.username))]
pub async fn rebuild(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RebuildResponse>> {
    let image = images::rebuild(&state, &identity, id).await?;
    Ok(Json(RebuildResponse { id: image.id, tag: image.tag, status: image.status }))
}

/// Deployments backed by the given image
#[utoipa::path(get, path = "/api/operator/images/{id}/deployments",
    params( ("id" = Uuid, Path, description = "Image id") ),
    responses( (status=200, description="deployments of this image"), (status=404, description="unknown image") ))]
pub async fn deployments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ImageDeploymentRow>>> {
    let rows = images::deployments_for_image(&state.db, id).await?;
    Ok(Json(rows))
}
