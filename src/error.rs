use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorBody { pub code: &'static str, pub message: String }

#[derive(Debug, Clone)]
pub struct ApiError { pub status: StatusCode, pub code: &'static str, pub message: String }

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }
    pub fn bad_request(msg: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, "bad_request", msg) }
    pub fn unauthorized(msg: impl Into<String>) -> Self { Self::new(StatusCode::UNAUTHORIZED, "unauthorized", msg) }
    pub fn forbidden(msg: impl Into<String>) -> Self { Self::new(StatusCode::FORBIDDEN, "forbidden", msg) }
    pub fn not_found(msg: impl Into<String>) -> Self { Self::new(StatusCode::NOT_FOUND, "not_found", msg) }
    pub fn invalid_state(msg: impl Into<String>) -> Self { Self::new(StatusCode::CONFLICT, "invalid_state", msg) }
    pub fn conflict(msg: impl Into<String>) -> Self { Self::new(StatusCode::CONFLICT, "conflict", msg) }
    pub fn internal(msg: impl Into<String>) -> Self { Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg) }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}: {}", self.code, self.message) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody { code: self.code, message: self.message };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Domain-level failures raised by the core services. Handlers convert these
/// into `ApiError` responses via `?`.
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Conflict(String),
    #[error("build failed: {0}")]
    Build(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<OpsError> for ApiError {
    fn from(e: OpsError) -> Self {
        match e {
            OpsError::Validation(m) => ApiError::bad_request(m),
            OpsError::Unauthorized(m) => ApiError::unauthorized(m),
            OpsError::Forbidden(m) => ApiError::forbidden(m),
            OpsError::NotFound(m) => ApiError::not_found(m),
            OpsError::InvalidState(m) => ApiError::invalid_state(m),
            OpsError::Conflict(m) => ApiError::conflict(m),
            OpsError::Build(m) => ApiError::internal(m),
            OpsError::Db(sqlx::Error::RowNotFound) => ApiError::not_found("resource not found"),
            OpsError::Db(e) => ApiError::internal(format!("database error: {e}")),
        }
    }
}

impl IntoResponse for OpsError {
    fn into_response(self) -> Response { ApiError::from(self).into_response() }
}
