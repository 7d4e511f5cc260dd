use crate::models::{ApplicationStatus, DeploymentStatus};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema, Debug)]
pub struct PlatformMetrics {
    pub total_applications: i64,
    pub pending_applications: i64,
    pub total_images: i64,
    pub total_deployments: i64,
    pub running_deployments: i64,
    pub stopped_deployments: i64,
}

pub async fn metrics(pool: &Pool<Sqlite>) -> Result<PlatformMetrics, sqlx::Error> {
    let (total_applications, pending_applications, total_images, total_deployments, running_deployments, stopped_deployments): (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM applications), \
                (SELECT COUNT(*) FROM applications WHERE status = ?), \
                (SELECT COUNT(*) FROM images), \
                (SELECT COUNT(*) FROM deployments), \
                (SELECT COUNT(*) FROM deployments WHERE status = ?), \
                (SELECT COUNT(*) FROM deployments WHERE status = ?)",
    )
    .bind(ApplicationStatus::Pending)
    .bind(DeploymentStatus::Running)
    .bind(DeploymentStatus::Stopped)
    .fetch_one(pool)
    .await?;
    Ok(PlatformMetrics {
        total_applications,
        pending_applications,
        total_images,
        total_deployments,
        running_deployments,
        stopped_deployments,
    })
}
