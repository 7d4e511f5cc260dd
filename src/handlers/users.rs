use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::handlers::auth::UserDto;
use crate::models::{Role, User};
use crate::services::users::{self, DeveloperRow, NewUser};
use crate::AppState;
use crate::extract::Json;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Every account, admin view (credentials are never serialized)
#[utoipa::path(get, path = "/api/admin/users", responses( (status=200, description="all users") ))]
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    let rows = users::list(&state.db)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(rows))
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Admin-created account with an explicit role
#[utoipa::path(post, path = "/api/admin/users", request_body = CreateUserRequest,
    responses( (status=201, body=UserDto), (status=400, description="invalid input or duplicate username") ))]
#[tracing::instrument(level = "info", skip_all, fields(admin = %identity.username, username = %req.username))]
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserDto>)> {
    let user = users::create(
        &state.db,
        identity.user_id,
        NewUser { username: req.username, email: req.email, password: req.password, role: req.role },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Ban an account; takes effect on the user's next request
#[utoipa::path(post, path = "/api/admin/users/{id}/ban",
    params( ("id" = Uuid, Path, description = "User id") ),
    responses( (status=200, body=UserDto), (status=404, description="unknown user") ))]
#[tracing::instrument(level = "info", skip(state, identity), fields(admin = %identity.username))]
pub async fn ban(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserDto>> {
    let user = users::set_banned(&state.db, identity.user_id, id, true).await?;
    Ok(Json(user.into()))
}

/// Lift a ban
#[utoipa::path(post, path = "/api/admin/users/{id}/unban",
    params( ("id" = Uuid, Path, description = "User id") ),
    responses( (status=200, body=UserDto), (status=404, description="unknown user") ))]
#[tracing::instrument(level = "info", skip(state, identity), fields(admin = %identity.username))]
pub async fn unban(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserDto>> {
    let user = users::set_banned(&state.db, identity.user_id, id, false).await?;
    Ok(Json(user.into()))
}

#[derive(Deserialize, ToSchema)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Username prefix search for autocomplete
#[utoipa::path(get, path = "/api/users/search",
    params( ("q" = String, Query, description = "Login prefix") ),
    responses( (status=200, description="matching usernames") ))]
pub async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> ApiResult<Json<Vec<String>>> {
    let names = users::search_prefix(&state.db, q.q.trim())
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(names))
}

/// Active developers, for the operator's deployment form
#[utoipa::path(get, path = "/api/operator/developers", responses( (status=200, description="active developers") ))]
pub async fn developers(State(state): State<AppState>) -> ApiResult<Json<Vec<DeveloperRow>>> {
    let rows = users::active_developers(&state.db)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(rows))
}
