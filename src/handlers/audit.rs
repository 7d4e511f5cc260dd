use crate::audit::{self, AuditQuery};
use crate::error::{ApiError, ApiResult};
use crate::models::AuditLogEntry;
use crate::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Default)]
pub struct AuditListQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub limit: Option<i64>,
}

/// Audit trail, newest first
#[utoipa::path(get, path = "/api/admin/audit",
    params(
        ("action" = Option<String>, Query, description = "Filter by action name"),
        ("resource_type" = Option<String>, Query, description = "Filter by resource type"),
        ("limit" = Option<i64>, Query, description = "Max entries (default 100, max 1000)")
    ),
    responses( (status=200, description="audit entries") ))]
pub async fn list(State(state): State<AppState>, Query(q): Query<AuditListQuery>) -> ApiResult<Json<Vec<AuditLogEntry>>> {
    let entries = audit::query(
        &state.db,
        &AuditQuery { action: q.action, resource_type: q.resource_type, actor_id: None, limit: q.limit },
    )
    .await
    .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(entries))
}
