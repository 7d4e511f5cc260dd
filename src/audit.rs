//! Append-only audit trail. Recording is best-effort: a failed insert is
//! logged and never rolls back the business transition that triggered it.
use crate::models::AuditLogEntry;
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    Register,
    CreateUser,
    BanUser,
    UnbanUser,
    CreateApplication,
    ApproveApplication,
    RejectApplication,
    RebuildImage,
    ImageBuildFinished,
    CreateDeployment,
    StartDeployment,
    StopDeployment,
    RestartDeployment,
    DeploymentFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::Register => "register",
            AuditAction::CreateUser => "create_user",
            AuditAction::BanUser => "ban_user",
            AuditAction::UnbanUser => "unban_user",
            AuditAction::CreateApplication => "create_application",
            AuditAction::ApproveApplication => "approve_application",
            AuditAction::RejectApplication => "reject_application",
            AuditAction::RebuildImage => "rebuild_image",
            AuditAction::ImageBuildFinished => "image_build_finished",
            AuditAction::CreateDeployment => "create_deployment",
            AuditAction::StartDeployment => "start_deployment",
            AuditAction::StopDeployment => "stop_deployment",
            AuditAction::RestartDeployment => "restart_deployment",
            AuditAction::DeploymentFailed => "deployment_failed",
        }
    }
}

pub mod resource {
    pub const USER: &str = "user";
    pub const APPLICATION: &str = "application";
    pub const IMAGE: &str = "image";
    pub const DEPLOYMENT: &str = "deployment";
}

pub async fn record(
    pool: &Pool<Sqlite>,
    actor_id: Option<Uuid>,
    action: AuditAction,
    resource_type: Option<&str>,
    resource_id: Option<Uuid>,
    details: Option<serde_json::Value>,
) {
    let res = sqlx::query(
        "INSERT INTO audit_log (id, actor_id, action, resource_type, resource_id, details, created_at) VALUES (?,?,?,?,?,?,?)",
    )
    .bind(Uuid::new_v4())
    .bind(actor_id)
    .bind(action.as_str())
    .bind(resource_type)
    .bind(resource_id)
    .bind(details.map(sqlx::types::Json))
    .bind(Utc::now())
    .execute(pool)
    .await;
    if let Err(e) = res {
        tracing::warn!(action = action.as_str(), error = %e, "audit write failed");
    }
}

#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub actor_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Entries ordered by created_at descending, newest first.
pub async fn query(pool: &Pool<Sqlite>, q: &AuditQuery) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let mut qb = sqlx::QueryBuilder::<Sqlite>::new(
        "SELECT id, actor_id, action, resource_type, resource_id, details, created_at FROM audit_log WHERE 1=1",
    );
    if let Some(action) = &q.action {
        qb.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(rt) = &q.resource_type {
        qb.push(" AND resource_type = ").push_bind(rt.clone());
    }
    if let Some(actor) = q.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor);
    }
    qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);
    qb.build_query_as::<AuditLogEntry>().fetch_all(pool).await
}
