use crate::audit::{self, AuditAction};
use crate::auth;
use crate::error::ApiResult;
use crate::models::{Role, User};
use crate::extract::Json;
use crate::{services, AppState};
use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        Self { id: u.id, username: u.username, email: u.email, role: u.role }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserDto,
}

/// Authenticate and mint a bearer token
#[utoipa::path(post, path = "/api/auth/login", request_body = LoginRequest,
    responses( (status=200, body=LoginResponse), (status=401, description="bad credentials"), (status=403, description="banned") ))]
#[tracing::instrument(level = "info", skip(state, req), fields(username = %req.username))]
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> ApiResult<Json<LoginResponse>> {
    let user = services::users::authenticate(&state.db, &req.username, &req.password).await?;
    let token = auth::issue_session(&state.db, user.id)
        .await
        .map_err(|e| crate::error::ApiError::internal(format!("session error: {e}")))?;
    audit::record(&state.db, Some(user.id), AuditAction::Login, Some(audit::resource::USER), Some(user.id), None).await;
    tracing::info!(user_id = %user.id, "login ok");
    Ok(Json(LoginResponse { token, user: user.into() }))
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Self-registration; new accounts are developers
#[utoipa::path(post, path = "/api/auth/register", request_body = RegisterRequest,
    responses( (status=201, body=UserDto), (status=400, description="invalid input or duplicate username") ))]
#[tracing::instrument(level = "info", skip(state, req), fields(username = %req.username))]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserDto>)> {
    let user = services::users::register(&state.db, req.username, req.email, req.password).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}
