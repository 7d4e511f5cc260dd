use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::DeploymentStatus;
use crate::services::deployments::{self, CreateDeployment, DeploymentOverview, DeveloperDeploymentRow};
use crate::AppState;
use crate::extract::Json;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct CreateDeploymentRequest {
    pub image_id: Uuid,
    pub name: String,
    pub port: i64,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub requested_by: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct DeploymentStatusResponse {
    pub id: Uuid,
    pub status: DeploymentStatus,
}

/// Create a deployment from a ready image; it starts out stopped
#[utoipa::path(post, path = "/api/operator/deployments", request_body = CreateDeploymentRequest,
    responses( (status=201, body=DeploymentStatusResponse), (status=404, description="unknown image"), (status=409, description="image not ready") ))]
#[tracing::instrument(level = "info", skip_all, fields(operator = %identity.username, name = %req.name))]
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateDeploymentRequest>,
) -> ApiResult<(StatusCode, Json<DeploymentStatusResponse>)> {
    let deployment = deployments::create(
        &state,
        &identity,
        CreateDeployment {
            image_id: req.image_id,
            name: req.name,
            port: req.port,
            env_vars: req.env_vars,
            requested_by: req.requested_by,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(DeploymentStatusResponse { id: deployment.id, status: deployment.status })))
}

/// All deployments, operator view
#[utoipa::path(get, path = "/api/operator/deployments", responses( (status=200, description="all deployments") ))]
pub async fn list_all(State(state): State<AppState>) -> ApiResult<Json<Vec<DeploymentOverview>>> {
    let rows = deployments::list_all(&state.db)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(rows))
}

/// Deployments requested by the calling developer
#[utoipa::path(get, path = "/api/developer/deployments", responses( (status=200, description="own deployments") ))]
pub async fn list_own(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<DeveloperDeploymentRow>>> {
    let rows = deployments::list_for_developer(&state.db, identity.user_id)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(rows))
}

/// Bring a stopped (or failed) deployment up
#[utoipa::path(post, path = "/api/developer/deployments/{id}/start",
    params( ("id" = Uuid, Path, description = "Deployment id") ),
    responses( (status=200, body=DeploymentStatusResponse), (status=403, description="not yours"), (status=404, description="unknown deployment") ))]
#[tracing::instrument(level = "info", skip(state, identity), fields(actor = %identity.username))]
pub async fn start(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeploymentStatusResponse>> {
    let d = deployments::start(&state, &identity, id).await?;
    Ok(Json(DeploymentStatusResponse { id: d.id, status: d.status }))
}

/// Stop a running deployment
#[utoipa::path(post, path = "/api/developer/deployments/{id}/stop",
    params( ("id" = Uuid, Path, description = "Deployment id") ),
    responses( (status=200, body=DeploymentStatusResponse), (status=403, description="not yours"), (status=404, description="unknown deployment") ))]
#[tracing::instrument(level = "info", skip(state, identity), fields(actor = %identity.username))]
pub async fn stop(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeploymentStatusResponse>> {
    let d = deployments::stop(&state, &identity, id).await?;
    Ok(Json(DeploymentStatusResponse { id: d.id, status: d.status }))
}

/// Restart a running deployment; settles to running or failed
#[utoipa::path(post, path = "/api/developer/deployments/{id}/restart",
    params( ("id" = Uuid, Path, description = "Deployment id") ),
    responses( (status=200, body=DeploymentStatusResponse), (status=409, description="not running, or transition in progress") ))]
#[tracing::instrument(level = "info", skip(state, identity), fields(actor = %identity.username))]
pub async fn restart(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeploymentStatusResponse>> {
    let d = deployments::restart(&state, &identity, id).await?;
    Ok(Json(DeploymentStatusResponse { id: d.id, status: d.status }))
}

#[derive(Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

/// Recent log tail for a deployment
#[utoipa::path(get, path = "/api/operator/deployments/{id}/logs",
    params( ("id" = Uuid, Path, description = "Deployment id") ),
    responses( (status=200, body=LogsResponse), (status=404, description="unknown deployment") ))]
pub async fn logs(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<LogsResponse>> {
    deployments::get(&state.db, id).await?;
    Ok(Json(LogsResponse { logs: state.hub.recent_logs(id, 200) }))
}

/// Live log stream: buffered tail first, then one SSE event per line.
/// Reconnecting clients simply resubscribe and get a fresh tail.
#[utoipa::path(get, path = "/api/operator/deployments/{id}/logs/stream",
    params( ("id" = Uuid, Path, description = "Deployment id") ),
    responses( (status=200, description="text/event-stream of log lines"), (status=404, description="unknown deployment") ))]
pub async fn logs_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    deployments::get(&state.db, id).await.map_err(ApiError::from)?;
    let (tail, rx) = state.hub.subscribe(id);
    let tail = stream::iter(tail.into_iter().map(|line| Ok(Event::default().data(line))));
    let live = BroadcastStream::new(rx).filter_map(|res| async move {
        match res {
            Ok(line) => Some(Ok(Event::default().data(line))),
            // Lagged subscribers skip dropped lines (drop-oldest policy).
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        }
    });
    Ok(Sse::new(tail.chain(live)).keep_alive(KeepAlive::default()))
}

#[derive(Serialize, ToSchema)]
pub struct DeploymentMetricsResponse {
    pub labels: Vec<String>,
    pub cpu: Vec<f64>,
    pub ram: Vec<f64>,
}

/// Recent CPU/RAM samples as parallel arrays for chart polling
#[utoipa::path(get, path = "/api/operator/deployments/{id}/metrics",
    params( ("id" = Uuid, Path, description = "Deployment id") ),
    responses( (status=200, body=DeploymentMetricsResponse), (status=404, description="unknown deployment") ))]
pub async fn metrics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeploymentMetricsResponse>> {
    deployments::get(&state.db, id).await?;
    let window = state.hub.metric_window(id);
    let mut resp = DeploymentMetricsResponse {
        labels: Vec::with_capacity(window.len()),
        cpu: Vec::with_capacity(window.len()),
        ram: Vec::with_capacity(window.len()),
    };
    for sample in window {
        resp.labels.push(sample.ts.format("%H:%M:%S").to_string());
        resp.cpu.push(sample.cpu);
        resp.ram.push(sample.ram);
    }
    Ok(Json(resp))
}
