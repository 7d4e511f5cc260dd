use crate::error::{ApiError, ApiResult};
use crate::services::platform::{self, PlatformMetrics};
use crate::AppState;
use axum::{extract::State, Json};

/// Aggregate platform counters for the operator dashboard
#[utoipa::path(get, path = "/api/operator/metrics", responses( (status=200, body=PlatformMetrics) ))]
pub async fn metrics(State(state): State<AppState>) -> ApiResult<Json<PlatformMetrics>> {
    let m = platform::metrics(&state.db)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(m))
}
