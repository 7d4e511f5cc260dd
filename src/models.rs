use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(sqlx::Type, Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    Operator,
    Admin,
}

/// Review verdicts are terminal: pending may only move to approved or rejected.
#[derive(sqlx::Type, Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(sqlx::Type, Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Building,
    Ready,
    Failed,
}

#[derive(sqlx::Type, Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Stopped,
    Running,
    Updating,
    Failed,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Application {
    pub id: Uuid,
    pub developer_id: Uuid,
    pub git_repo: String,
    pub branch: String,
    pub base_image: String,
    pub image_name: String,
    pub run_commands: Json<Vec<String>>,
    pub entrypoint: String,
    pub status: ApplicationStatus,
    pub operator_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Image {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub tag: String,
    pub dockerfile: String,
    pub build_log: String,
    pub build_number: i64,
    pub status: ImageStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Deployment {
    pub id: Uuid,
    pub image_id: Uuid,
    pub requested_by: Uuid,
    pub operator_id: Option<Uuid>,
    pub name: String,
    pub status: DeploymentStatus,
    pub port: i64,
    pub env_vars: Json<HashMap<String, String>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub details: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}
