use crate::audit::{self, AuditAction};
use crate::auth::Identity;
use crate::builder;
use crate::error::OpsError;
use crate::locks::Resource;
use crate::models::{Application, ApplicationStatus, Image, ImageStatus};
use crate::AppState;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SubmitApplication {
    pub git_repo: String,
    pub branch: String,
    pub base_image: String,
    pub image_name: Option<String>,
    pub run_commands: Vec<String>,
    pub entrypoint: String,
}

pub async fn submit(state: &AppState, identity: &Identity, req: SubmitApplication) -> Result<Application, OpsError> {
    if req.git_repo.trim().is_empty() || req.branch.trim().is_empty() || req.base_image.trim().is_empty() {
        return Err(OpsError::Validation("git_repo, branch and base_image are required".into()));
    }
    let image_name = req
        .image_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("app-{}", identity.username));
    let now = Utc::now();
    let app: Application = sqlx::query_as(
        "INSERT INTO applications (id, developer_id, git_repo, branch, base_image, image_name, run_commands, entrypoint, status, operator_id, created_at, updated_at) \
         VALUES (?,?,?,?,?,?,?,?,?,NULL,?,?) \
         RETURNING id, developer_id, git_repo, branch, base_image, image_name, run_commands, entrypoint, status, operator_id, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(identity.user_id)
    .bind(&req.git_repo)
    .bind(&req.branch)
    .bind(&req.base_image)
    .bind(&image_name)
    .bind(sqlx::types::Json(&req.run_commands))
    .bind(&req.entrypoint)
    .bind(ApplicationStatus::Pending)
    .bind(now)
    .bind(now)
    .fetch_one(&state.db)
    .await?;
    tracing::info!(application_id = %app.id, developer = %identity.username, "application submitted");
    audit::record(
        &state.db,
        Some(identity.user_id),
        AuditAction::CreateApplication,
        Some(audit::resource::APPLICATION),
        Some(app.id),
        Some(serde_json::json!({ "git_repo": req.git_repo, "branch": req.branch })),
    )
    .await;
    Ok(app)
}

pub async fn list_for_developer(pool: &Pool<Sqlite>, developer_id: Uuid) -> Result<Vec<Application>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM applications WHERE developer_id = ? ORDER BY created_at DESC")
        .bind(developer_id)
        .fetch_all(pool)
        .await
}

/// Operator view: every application with developer/operator names resolved.
#[derive(sqlx::FromRow, serde::Serialize, Debug)]
pub struct ApplicationOverview {
    pub id: Uuid,
    pub developer: String,
    pub git_repo: String,
    pub branch: String,
    pub base_image: String,
    pub image_name: String,
    pub status: ApplicationStatus,
    pub operator: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn list_all(pool: &Pool<Sqlite>) -> Result<Vec<ApplicationOverview>, sqlx::Error> {
    sqlx::query_as(
        "SELECT a.id, dev.username AS developer, a.git_repo, a.branch, a.base_image, a.image_name, a.status, op.username AS operator, a.created_at \
         FROM applications a \
         JOIN users dev ON dev.id = a.developer_id \
         LEFT JOIN users op ON op.id = a.operator_id \
         ORDER BY a.created_at DESC",
    )
    .fetch_all(pool)
    .await
}

async fn fetch(pool: &Pool<Sqlite>, app_id: Uuid) -> Result<Application, OpsError> {
    let app: Option<Application> = sqlx::query_as("SELECT * FROM applications WHERE id = ?")
        .bind(app_id)
        .fetch_optional(pool)
        .await?;
    app.ok_or_else(|| OpsError::NotFound("application not found".into()))
}

fn ensure_pending(app: &Application) -> Result<(), OpsError> {
    match app.status {
        ApplicationStatus::Pending => Ok(()),
        ApplicationStatus::Approved => Err(OpsError::InvalidState("application already approved".into())),
        ApplicationStatus::Rejected => Err(OpsError::InvalidState("application already rejected".into())),
    }
}

/// Approve a pending application and kick off the image build. The image is
/// observable as `building` in the returned snapshot and converges to
/// ready/failed asynchronously.
pub async fn approve(state: &AppState, identity: &Identity, app_id: Uuid) -> Result<Image, OpsError> {
    let _claim = state
        .locks
        .try_claim(Resource::Application, app_id)
        .ok_or_else(|| OpsError::Conflict("application review already in progress".into()))?;
    let mut app = fetch(&state.db, app_id).await?;
    ensure_pending(&app)?;
    let now = Utc::now();
    sqlx::query("UPDATE applications SET status = ?, operator_id = ?, updated_at = ? WHERE id = ?")
        .bind(ApplicationStatus::Approved)
        .bind(identity.user_id)
        .bind(now)
        .bind(app_id)
        .execute(&state.db)
        .await?;
    app.status = ApplicationStatus::Approved;
    app.operator_id = Some(identity.user_id);

    let dockerfile = builder::generate_dockerfile(&app);
    let image: Image = sqlx::query_as(
        "INSERT INTO images (id, application_id, name, tag, dockerfile, build_log, build_number, status, failure_reason, created_at, updated_at) \
         VALUES (?,?,?,?,?,'',1,?,NULL,?,?) \
         RETURNING id, application_id, name, tag, dockerfile, build_log, build_number, status, failure_reason, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(app_id)
    .bind(&app.image_name)
    .bind("b1")
    .bind(&dockerfile)
    .bind(ImageStatus::Building)
    .bind(now)
    .bind(now)
    .fetch_one(&state.db)
    .await?;
    tracing::info!(application_id = %app_id, image_id = %image.id, operator = %identity.username, "application approved");
    audit::record(
        &state.db,
        Some(identity.user_id),
        AuditAction::ApproveApplication,
        Some(audit::resource::APPLICATION),
        Some(app_id),
        Some(serde_json::json!({ "image_id": image.id })),
    )
    .await;

    let build_claim = state
        .locks
        .try_claim(Resource::Image, image.id)
        .ok_or_else(|| OpsError::Conflict("image build already in progress".into()))?;
    builder::spawn_build(state.clone(), build_claim, image.id, identity.user_id);
    Ok(image)
}

pub async fn reject(state: &AppState, identity: &Identity, app_id: Uuid) -> Result<Application, OpsError> {
    let _claim = state
        .locks
        .try_claim(Resource::Application, app_id)
        .ok_or_else(|| OpsError::Conflict("application review already in progress".into()))?;
    let app = fetch(&state.db, app_id).await?;
    ensure_pending(&app)?;
    let app: Application = sqlx::query_as(
        "UPDATE applications SET status = ?, operator_id = ?, updated_at = ? WHERE id = ? \
         RETURNING id, developer_id, git_repo, branch, base_image, image_name, run_commands, entrypoint, status, operator_id, created_at, updated_at",
    )
    .bind(ApplicationStatus::Rejected)
    .bind(identity.user_id)
    .bind(Utc::now())
    .bind(app_id)
    .fetch_one(&state.db)
    .await?;
    tracing::info!(application_id = %app_id, operator = %identity.username, "application rejected");
    audit::record(
        &state.db,
        Some(identity.user_id),
        AuditAction::RejectApplication,
        Some(audit::resource::APPLICATION),
        Some(app_id),
        None,
    )
    .await;
    Ok(app)
}
