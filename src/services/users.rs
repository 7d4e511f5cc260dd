use crate::audit::{self, AuditAction};
use crate::auth;
use crate::error::OpsError;
use crate::models::{Role, User};
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

async fn insert_user(pool: &Pool<Sqlite>, new: &NewUser) -> Result<User, OpsError> {
    if new.username.trim().is_empty() || new.email.trim().is_empty() || new.password.is_empty() {
        return Err(OpsError::Validation("username, email and password are required".into()));
    }
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(&new.username)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(OpsError::Validation("user already exists".into()));
    }
    let user: User = sqlx::query_as(
        "INSERT INTO users (id, username, email, password_hash, role, banned, created_at) VALUES (?,?,?,?,?,0,?) \
         RETURNING id, username, email, password_hash, role, banned, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(&new.username)
    .bind(&new.email)
    .bind(auth::hash_password(&new.password))
    .bind(new.role)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(user)
}

/// Admin-created account with an explicit role.
pub async fn create(pool: &Pool<Sqlite>, admin_id: Uuid, new: NewUser) -> Result<User, OpsError> {
    let user = insert_user(pool, &new).await?;
    audit::record(
        pool,
        Some(admin_id),
        AuditAction::CreateUser,
        Some(audit::resource::USER),
        Some(user.id),
        Some(serde_json::json!({ "role": new.role })),
    )
    .await;
    Ok(user)
}

/// Self-registration always yields a developer account.
pub async fn register(pool: &Pool<Sqlite>, username: String, email: String, password: String) -> Result<User, OpsError> {
    let user = insert_user(pool, &NewUser { username, email, password, role: Role::Developer }).await?;
    audit::record(
        pool,
        Some(user.id),
        AuditAction::Register,
        Some(audit::resource::USER),
        Some(user.id),
        None,
    )
    .await;
    Ok(user)
}

pub async fn authenticate(pool: &Pool<Sqlite>, username: &str, password: &str) -> Result<User, OpsError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    let Some(user) = user else {
        return Err(OpsError::Unauthorized("invalid credentials".into()));
    };
    if !auth::verify_password(&user.password_hash, password) {
        return Err(OpsError::Unauthorized("invalid credentials".into()));
    }
    if user.banned {
        return Err(OpsError::Forbidden("account is banned".into()));
    }
    Ok(user)
}

pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC").fetch_all(pool).await
}

/// Ban or unban; users are never hard-deleted.
pub async fn set_banned(pool: &Pool<Sqlite>, admin_id: Uuid, user_id: Uuid, banned: bool) -> Result<User, OpsError> {
    let user: Option<User> = sqlx::query_as(
        "UPDATE users SET banned = ? WHERE id = ? RETURNING id, username, email, password_hash, role, banned, created_at",
    )
    .bind(banned)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    let user = user.ok_or_else(|| OpsError::NotFound("user not found".into()))?;
    let action = if banned { AuditAction::BanUser } else { AuditAction::UnbanUser };
    audit::record(pool, Some(admin_id), action, Some(audit::resource::USER), Some(user_id), None).await;
    Ok(user)
}

/// Login-prefix search used by autocomplete clients. LIKE wildcards in the
/// query are escaped so `%` and `_` match themselves.
pub async fn search_prefix(pool: &Pool<Sqlite>, q: &str) -> Result<Vec<String>, sqlx::Error> {
    if q.is_empty() {
        return Ok(Vec::new());
    }
    let escaped = q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    sqlx::query_scalar(
        "SELECT username FROM users WHERE username LIKE ? ESCAPE '\\' ORDER BY username ASC LIMIT 20",
    )
    .bind(format!("{escaped}%"))
    .fetch_all(pool)
    .await
}

#[derive(sqlx::FromRow, serde::Serialize, Debug)]
pub struct DeveloperRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

pub async fn active_developers(pool: &Pool<Sqlite>) -> Result<Vec<DeveloperRow>, sqlx::Error> {
    sqlx::query_as("SELECT id, username, email FROM users WHERE role = ? AND banned = 0 ORDER BY username ASC")
        .bind(Role::Developer)
        .fetch_all(pool)
        .await
}
