pub mod audit;
pub mod auth;
pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod locks;
pub mod models;
pub mod runtime;
pub mod services;
pub mod streams;
pub mod telemetry;

pub mod test_support;

use axum::{
    middleware,
    response::Html,
    routing::{get, post},
    Router,
};
use handlers::{applications, audit as audit_api, auth as auth_api, deployments, health::health, images, platform, users};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::config::Config;
use crate::locks::OpLocks;
use crate::streams::StreamHub;
use crate::telemetry::metrics_handler;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub hub: StreamHub,
    pub locks: OpLocks,
    pub config: Arc<Config>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::login,
        handlers::auth::register,
        handlers::applications::submit,
        handlers::applications::list_own,
        handlers::applications::list_all,
        handlers::applications::approve,
        handlers::applications::reject,
        handlers::images::list,
        handlers::images::detail,
        handlers::images::rebuild,
        handlers::images::deployments,
        handlers::deployments::create,
        handlers::deployments::list_all,
        handlers::deployments::list_own,
        handlers::deployments::start,
        handlers::deployments::stop,
        handlers::deployments::restart,
        handlers::deployments::logs,
        handlers::deployments::logs_stream,
        handlers::deployments::metrics,
        handlers::users::list,
        handlers::users::create,
        handlers::users::ban,
        handlers::users::unban,
        handlers::users::search,
        handlers::users::developers,
        handlers::audit::list,
        handlers::platform::metrics,
    ),
    components(schemas(
        error::ApiErrorBody,
        models::Role,
        models::ApplicationStatus,
        models::ImageStatus,
        models::DeploymentStatus,
        handlers::auth::UserDto,
        handlers::auth::LoginRequest,
        handlers::auth::LoginResponse,
        handlers::auth::RegisterRequest,
        handlers::applications::SubmitApplicationRequest,
        handlers::applications::ApproveResponse,
        handlers::images::ImageDetail,
        handlers::images::RebuildResponse,
        handlers::deployments::CreateDeploymentRequest,
        handlers::deployments::DeploymentStatusResponse,
        handlers::deployments::LogsResponse,
        handlers::deployments::DeploymentMetricsResponse,
        handlers::users::CreateUserRequest,
        services::platform::PlatformMetrics,
    )),
    tags( (name = "samosval", description = "Samosval Platform API") )
)]
pub struct ApiDoc;

async fn swagger_ui() -> Html<String> {
    let html = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"/><title>Samosval API Docs</title>
<link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>
window.onload = () => { SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' }); };
</script>
</body></html>"#;
    Html(html.to_string())
}

pub fn build_router(state: AppState) -> Router {
    let mut openapi = ApiDoc::openapi();
    // Inject security scheme manually (workaround for macro limitations)
    if let Ok(mut value) = serde_json::to_value(&openapi) {
        use serde_json::json;
        value["components"]["securitySchemes"]["bearer_auth"] = json!({"type":"http","scheme":"bearer"});
        value["security"] = json!([{"bearer_auth": []}]);
        if let Ok(spec) = serde_json::from_value(value.clone()) {
            openapi = spec;
        }
    }

    let developer = Router::new()
        .route("/applications", post(applications::submit).get(applications::list_own))
        .route("/deployments", get(deployments::list_own))
        .route("/deployments/:id/start", post(deployments::start))
        .route("/deployments/:id/stop", post(deployments::stop))
        .route("/deployments/:id/restart", post(deployments::restart));

    let operator = Router::new()
        .route("/applications", get(applications::list_all))
        .route("/applications/:id/approve", post(applications::approve))
        .route("/applications/:id/reject", post(applications::reject))
        .route("/images", get(images::list))
        .route("/images/:id", get(images::detail))
        .route("/images/:id/rebuild", post(images::rebuild))
        .route("/images/:id/deployments", get(images::deployments))
        .route("/deployments", post(deployments::create).get(deployments::list_all))
        .route("/deployments/:id/start", post(deployments::start))
        .route("/deployments/:id/stop", post(deployments::stop))
        .route("/deployments/:id/restart", post(deployments::restart))
        .route("/deployments/:id/logs", get(deployments::logs))
        .route("/deployments/:id/logs/stream", get(deployments::logs_stream))
        .route("/deployments/:id/metrics", get(deployments::metrics))
        .route("/metrics", get(platform::metrics))
        .route("/developers", get(users::developers))
        .route_layer(middleware::from_fn(auth::require_operator_mw));

    let admin = Router::new()
        .route("/users", get(users::list).post(users::create))
        .route("/users/:id/ban", post(users::ban))
        .route("/users/:id/unban", post(users::unban))
        .route("/audit", get(audit_api::list))
        .route_layer(middleware::from_fn(auth::require_admin_mw));

    let api = Router::new()
        .route("/auth/login", post(auth_api::login))
        .route("/auth/register", post(auth_api::register))
        .route("/users/search", get(users::search))
        .nest("/developer", developer)
        .nest("/operator", operator)
        .nest("/admin", admin);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(|| async move { axum::Json(openapi.clone()) }))
        .route("/swagger", get(swagger_ui))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bearer, body_json, test_state, token_for};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_ok() {
        let state = test_state().await;
        let app = build_router(state);
        let res = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v, json!({"status":"ok"}));
    }

    #[tokio::test]
    async fn openapi_served() {
        let state = test_state().await;
        let app = build_router(state);
        let res = app.oneshot(Request::builder().uri("/openapi.json").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert!(v["paths"]["/api/auth/login"].is_object());
    }

    #[tokio::test]
    async fn api_requires_token() {
        let state = test_state().await;
        let app = build_router(state);
        let res = app
            .oneshot(Request::builder().uri("/api/developer/applications").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let v = body_json(res).await;
        assert_eq!(v["code"], "unauthorized");
    }

    #[tokio::test]
    async fn developer_cannot_reach_operator_routes() {
        let state = test_state().await;
        let token = token_for(&state, "developer").await;
        let app = build_router(state);
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/operator/applications")
                    .header("Authorization", bearer(&token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn operator_cannot_reach_admin_routes() {
        let state = test_state().await;
        let token = token_for(&state, "operator").await;
        let app = build_router(state);
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/admin/users")
                    .header("Authorization", bearer(&token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn invalid_login_bodies_are_400() {
        let state = test_state().await;
        let app = build_router(state);
        // Syntax error.
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from("{invalid"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        // Well-formed JSON missing a field maps to the same 400 error body.
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(json!({"username": "admin"}).to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let v = body_json(res).await;
        assert_eq!(v["code"], "bad_request");
    }

    #[tokio::test]
    async fn admin_reaches_operator_routes() {
        let state = test_state().await;
        let token = token_for(&state, "admin").await;
        let app = build_router(state);
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/operator/images")
                    .header("Authorization", bearer(&token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
