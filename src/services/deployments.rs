use crate::audit::{self, AuditAction};
use crate::auth::Identity;
use crate::error::OpsError;
use crate::locks::Resource;
use crate::models::{Deployment, DeploymentStatus, ImageStatus, Role};
use crate::services::images;
use crate::AppState;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateDeployment {
    pub image_id: Uuid,
    pub name: String,
    pub port: i64,
    pub env_vars: HashMap<String, String>,
    /// Developer on whose behalf the deployment runs; defaults to the caller.
    pub requested_by: Option<Uuid>,
}

/// New deployments start out stopped; an explicit `start` brings them up.
pub async fn create(state: &AppState, identity: &Identity, req: CreateDeployment) -> Result<Deployment, OpsError> {
    if req.name.trim().is_empty() {
        return Err(OpsError::Validation("name is required".into()));
    }
    if !(1..=65535).contains(&req.port) {
        return Err(OpsError::Validation("port must be in 1..=65535".into()));
    }
    let image = images::get(&state.db, req.image_id).await?;
    if image.status != ImageStatus::Ready {
        return Err(OpsError::InvalidState("image is not ready".into()));
    }
    let requested_by = req.requested_by.unwrap_or(identity.user_id);
    let known: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(requested_by)
        .fetch_optional(&state.db)
        .await?;
    if known.is_none() {
        return Err(OpsError::NotFound("requested_by user not found".into()));
    }
    let now = Utc::now();
    let deployment: Deployment = sqlx::query_as(
        "INSERT INTO deployments (id, image_id, requested_by, operator_id, name, status, port, env_vars, failure_reason, created_at, updated_at) \
         VALUES (?,?,?,?,?,?,?,?,NULL,?,?) \
         RETURNING id, image_id, requested_by, operator_id, name, status, port, env_vars, failure_reason, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(req.image_id)
    .bind(requested_by)
    .bind(identity.user_id)
    .bind(&req.name)
    .bind(DeploymentStatus::Stopped)
    .bind(req.port)
    .bind(sqlx::types::Json(&req.env_vars))
    .bind(now)
    .bind(now)
    .fetch_one(&state.db)
    .await?;
    tracing::info!(deployment_id = %deployment.id, image_id = %req.image_id, "deployment created");
    audit::record(
        &state.db,
        Some(identity.user_id),
        AuditAction::CreateDeployment,
        Some(audit::resource::DEPLOYMENT),
        Some(deployment.id),
        Some(serde_json::json!({ "image_id": req.image_id, "name": req.name })),
    )
    .await;
    Ok(deployment)
}

pub async fn get(pool: &Pool<Sqlite>, id: Uuid) -> Result<Deployment, OpsError> {
    let d: Option<Deployment> = sqlx::query_as("SELECT * FROM deployments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    d.ok_or_else(|| OpsError::NotFound("deployment not found".into()))
}

/// Operators and admins control any deployment; a developer only the ones
/// requested on their behalf.
fn ensure_can_control(identity: &Identity, deployment: &Deployment) -> Result<(), OpsError> {
    match identity.role {
        Role::Operator | Role::Admin => Ok(()),
        Role::Developer if deployment.requested_by == identity.user_id => Ok(()),
        Role::Developer => Err(OpsError::Forbidden("deployment belongs to another developer".into())),
    }
}

async fn set_status(
    pool: &Pool<Sqlite>,
    id: Uuid,
    status: DeploymentStatus,
    failure_reason: Option<&str>,
) -> Result<Deployment, sqlx::Error> {
    sqlx::query_as(
        "UPDATE deployments SET status = ?, failure_reason = ?, updated_at = ? WHERE id = ? \
         RETURNING id, image_id, requested_by, operator_id, name, status, port, env_vars, failure_reason, created_at, updated_at",
    )
    .bind(status)
    .bind(failure_reason)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(pool)
    .await
}

async fn audit_transition(
    state: &AppState,
    identity: &Identity,
    action: AuditAction,
    id: Uuid,
    from: DeploymentStatus,
    to: DeploymentStatus,
) {
    audit::record(
        &state.db,
        Some(identity.user_id),
        action,
        Some(audit::resource::DEPLOYMENT),
        Some(id),
        Some(serde_json::json!({ "from": from, "to": to })),
    )
    .await;
}

/// stopped|failed -> running; start on a running deployment is an audited
/// no-op. Rejected while a restart is settling.
pub async fn start(state: &AppState, identity: &Identity, id: Uuid) -> Result<Deployment, OpsError> {
    let deployment = get(&state.db, id).await?;
    ensure_can_control(identity, &deployment)?;
    if state.locks.is_held(Resource::Deployment, id) {
        return Err(OpsError::Conflict("deployment transition already in progress".into()));
    }
    let from = deployment.status;
    let deployment = match from {
        DeploymentStatus::Updating => {
            return Err(OpsError::Conflict("deployment transition already in progress".into()))
        }
        DeploymentStatus::Running => deployment,
        DeploymentStatus::Stopped | DeploymentStatus::Failed => {
            let d = set_status(&state.db, id, DeploymentStatus::Running, None).await?;
            state
                .hub
                .publish_log(id, format!("{} [INFO] {} - deployment started", Utc::now().format("%Y-%m-%dT%H:%M:%S"), d.name));
            d
        }
    };
    tracing::info!(deployment_id = %id, ?from, "deployment start");
    audit_transition(state, identity, AuditAction::StartDeployment, id, from, deployment.status).await;
    Ok(deployment)
}

/// running|failed -> stopped; stop on a stopped deployment is an audited no-op.
pub async fn stop(state: &AppState, identity: &Identity, id: Uuid) -> Result<Deployment, OpsError> {
    let deployment = get(&state.db, id).await?;
    ensure_can_control(identity, &deployment)?;
    if state.locks.is_held(Resource::Deployment, id) {
        return Err(OpsError::Conflict("deployment transition already in progress".into()));
    }
    let from = deployment.status;
    let deployment = match from {
        DeploymentStatus::Updating => {
            return Err(OpsError::Conflict("deployment transition already in progress".into()))
        }
        DeploymentStatus::Stopped => deployment,
        DeploymentStatus::Running | DeploymentStatus::Failed => {
            let d = set_status(&state.db, id, DeploymentStatus::Stopped, None).await?;
            state
                .hub
                .publish_log(id, format!("{} [INFO] {} - deployment stopped", Utc::now().format("%Y-%m-%dT%H:%M:%S"), d.name));
            d
        }
    };
    tracing::info!(deployment_id = %id, ?from, "deployment stop");
    audit_transition(state, identity, AuditAction::StopDeployment, id, from, deployment.status).await;
    Ok(deployment)
}

/// running -> updating -> running, or -> failed when the backing image is no
/// longer ready; the failure is persisted on the deployment, not just
/// returned. Restarting a stopped deployment is rejected: start it first.
pub async fn restart(state: &AppState, identity: &Identity, id: Uuid) -> Result<Deployment, OpsError> {
    let deployment = get(&state.db, id).await?;
    ensure_can_control(identity, &deployment)?;
    if deployment.status != DeploymentStatus::Running {
        return Err(OpsError::InvalidState("restart requires a running deployment".into()));
    }
    let claim = state
        .locks
        .try_claim(Resource::Deployment, id)
        .ok_or_else(|| OpsError::Conflict("deployment transition already in progress".into()))?;
    let deployment = set_status(&state.db, id, DeploymentStatus::Updating, None).await?;
    audit_transition(state, identity, AuditAction::RestartDeployment, id, DeploymentStatus::Running, DeploymentStatus::Updating).await;

    let task_state = state.clone();
    let actor = identity.clone();
    tokio::spawn(async move {
        let _claim = claim;
        tokio::time::sleep(Duration::from_millis(task_state.config.restart_delay_ms)).await;
        if let Err(e) = settle_restart(&task_state, &actor, id).await {
            tracing::error!(deployment_id = %id, error = %e, "restart settle error");
        }
    });
    Ok(deployment)
}

/// Leaves `updating` only if the deployment is still there; a row that moved
/// in the meantime (interrupted process, manual intervention) is left alone.
async fn settle_status(
    pool: &Pool<Sqlite>,
    id: Uuid,
    status: DeploymentStatus,
    failure_reason: Option<&str>,
) -> Result<Option<Deployment>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE deployments SET status = ?, failure_reason = ?, updated_at = ? WHERE id = ? AND status = ? \
         RETURNING id, image_id, requested_by, operator_id, name, status, port, env_vars, failure_reason, created_at, updated_at",
    )
    .bind(status)
    .bind(failure_reason)
    .bind(Utc::now())
    .bind(id)
    .bind(DeploymentStatus::Updating)
    .fetch_optional(pool)
    .await
}

async fn settle_restart(state: &AppState, actor: &Identity, id: Uuid) -> Result<(), OpsError> {
    let deployment = get(&state.db, id).await?;
    let image = images::get(&state.db, deployment.image_id).await?;
    let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S");
    if image.status == ImageStatus::Ready {
        if settle_status(&state.db, id, DeploymentStatus::Running, None).await?.is_none() {
            tracing::warn!(deployment_id = %id, "restart settle skipped, deployment no longer updating");
            return Ok(());
        }
        state.hub.publish_log(id, format!("{ts} [INFO] {} - deployment restarted", deployment.name));
        tracing::info!(deployment_id = %id, "deployment restarted");
    } else {
        let reason = format!("image {}:{} is not ready", image.name, image.tag);
        if settle_status(&state.db, id, DeploymentStatus::Failed, Some(&reason)).await?.is_none() {
            tracing::warn!(deployment_id = %id, "restart settle skipped, deployment no longer updating");
            return Ok(());
        }
        state.hub.publish_log(id, format!("{ts} [ERROR] {} - restart failed: {reason}", deployment.name));
        tracing::warn!(deployment_id = %id, %reason, "deployment restart failed");
        audit::record(
            &state.db,
            Some(actor.user_id),
            AuditAction::DeploymentFailed,
            Some(audit::resource::DEPLOYMENT),
            Some(id),
            Some(serde_json::json!({ "reason": reason })),
        )
        .await;
    }
    Ok(())
}

#[derive(sqlx::FromRow, serde::Serialize, Debug)]
pub struct DeveloperDeploymentRow {
    pub id: Uuid,
    pub name: String,
    pub status: DeploymentStatus,
    pub image_name: String,
    pub created_at: DateTime<Utc>,
}

pub async fn list_for_developer(pool: &Pool<Sqlite>, user_id: Uuid) -> Result<Vec<DeveloperDeploymentRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT d.id, d.name, d.status, i.name AS image_name, d.created_at \
         FROM deployments d JOIN images i ON i.id = d.image_id \
         WHERE d.requested_by = ? ORDER BY d.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

#[derive(sqlx::FromRow, serde::Serialize, Debug)]
pub struct DeploymentOverview {
    pub id: Uuid,
    pub name: String,
    pub status: DeploymentStatus,
    pub image_name: String,
    pub requested_by: String,
    pub operator: Option<String>,
    pub port: i64,
    pub created_at: DateTime<Utc>,
}

pub async fn list_all(pool: &Pool<Sqlite>) -> Result<Vec<DeploymentOverview>, sqlx::Error> {
    sqlx::query_as(
        "SELECT d.id, d.name, d.status, i.name AS image_name, req.username AS requested_by, op.username AS operator, d.port, d.created_at \
         FROM deployments d \
         JOIN images i ON i.id = d.image_id \
         JOIN users req ON req.id = d.requested_by \
         LEFT JOIN users op ON op.id = d.operator_id \
         ORDER BY d.created_at DESC",
    )
    .fetch_all(pool)
    .await
}
