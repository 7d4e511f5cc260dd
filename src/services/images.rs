use crate::audit::{self, AuditAction};
use crate::auth::Identity;
use crate::builder;
use crate::error::OpsError;
use crate::locks::Resource;
use crate::models::{Application, DeploymentStatus, Image, ImageStatus};
use crate::AppState;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

#[derive(sqlx::FromRow, serde::Serialize, Debug)]
pub struct ImageOverview {
    pub id: Uuid,
    pub name: String,
    pub tag: String,
    pub status: ImageStatus,
    pub application_id: Uuid,
    pub deployments_count: i64,
    pub created_at: DateTime<Utc>,
}

pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<ImageOverview>, sqlx::Error> {
    sqlx::query_as(
        "SELECT i.id, i.name, i.tag, i.status, i.application_id, \
                (SELECT COUNT(*) FROM deployments d WHERE d.image_id = i.id) AS deployments_count, \
                i.created_at \
         FROM images i ORDER BY i.created_at DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn get(pool: &Pool<Sqlite>, image_id: Uuid) -> Result<Image, OpsError> {
    let image: Option<Image> = sqlx::query_as("SELECT * FROM images WHERE id = ?")
        .bind(image_id)
        .fetch_optional(pool)
        .await?;
    image.ok_or_else(|| OpsError::NotFound("image not found".into()))
}

/// Re-run the build for an existing image in place: same id, regenerated
/// Dockerfile, bumped build number and tag. The image claim is the
/// at-most-one-build guarantee; a `building` row with no live claim is a
/// stale leftover from an interrupted process and rebuild recovers it.
pub async fn rebuild(state: &AppState, identity: &Identity, image_id: Uuid) -> Result<Image, OpsError> {
    let claim = state
        .locks
        .try_claim(Resource::Image, image_id)
        .ok_or_else(|| OpsError::Conflict("image build already in progress".into()))?;
    let image = get(&state.db, image_id).await?;
    let app: Application = sqlx::query_as("SELECT * FROM applications WHERE id = ?")
        .bind(image.application_id)
        .fetch_one(&state.db)
        .await?;
    let build_number = image.build_number + 1;
    let image: Image = sqlx::query_as(
        "UPDATE images SET dockerfile = ?, build_log = '', build_number = ?, tag = ?, status = ?, failure_reason = NULL, updated_at = ? WHERE id = ? \
         RETURNING id, application_id, name, tag, dockerfile, build_log, build_number, status, failure_reason, created_at, updated_at",
    )
    .bind(builder::generate_dockerfile(&app))
    .bind(build_number)
    .bind(format!("b{build_number}"))
    .bind(ImageStatus::Building)
    .bind(Utc::now())
    .bind(image_id)
    .fetch_one(&state.db)
    .await?;
    tracing::info!(image_id = %image_id, build_number, operator = %identity.username, "image rebuild started");
    audit::record(
        &state.db,
        Some(identity.user_id),
        AuditAction::RebuildImage,
        Some(audit::resource::IMAGE),
        Some(image_id),
        Some(serde_json::json!({ "build_number": build_number })),
    )
    .await;
    builder::spawn_build(state.clone(), claim, image_id, identity.user_id);
    Ok(image)
}

#[derive(sqlx::FromRow, serde::Serialize, Debug)]
pub struct ImageDeploymentRow {
    pub id: Uuid,
    pub name: String,
    pub status: DeploymentStatus,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

pub async fn deployments_for_image(pool: &Pool<Sqlite>, image_id: Uuid) -> Result<Vec<ImageDeploymentRow>, OpsError> {
    // 404 for an unknown image rather than an empty list.
    get(pool, image_id).await?;
    let rows = sqlx::query_as(
        "SELECT d.id, d.name, d.status, u.username AS requested_by, d.created_at \
         FROM deployments d JOIN users u ON u.id = d.requested_by \
         WHERE d.image_id = ? ORDER BY d.created_at DESC",
    )
    .bind(image_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
