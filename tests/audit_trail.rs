//! Every mutating operation leaves exactly one audit entry.
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use samosval::build_router;
use samosval::models::ImageStatus;
use samosval::test_support::{bearer, body_json, test_state, token_for, wait_for_image_status};
use serde_json::json;
use tower::util::ServiceExt;
use uuid::Uuid;

fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("Authorization", bearer(token))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", bearer(token))
        .body(Body::empty())
        .unwrap()
}

async fn audit_entries(app: &Router, admin_token: &str, query: &str) -> Vec<serde_json::Value> {
    let res = app.clone().oneshot(get_auth(&format!("/api/admin/audit{query}"), admin_token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await.as_array().unwrap().clone()
}

#[tokio::test]
async fn review_flow_is_fully_audited() {
    let state = test_state().await;
    let dev_token = token_for(&state, "developer").await;
    let op_token = token_for(&state, "operator").await;
    let admin_token = token_for(&state, "admin").await;
    let app = build_router(state.clone());

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/developer/applications",
            &dev_token,
            json!({"git_repo": "https://git.example/a.git", "branch": "main", "base_image": "alpine"}),
        ))
        .await
        .unwrap();
    let app_id = body_json(res).await["id"].as_str().unwrap().to_string();
    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/operator/applications/{app_id}/approve"), &op_token, json!({})))
        .await
        .unwrap();
    let image_id: Uuid = body_json(res).await["image_id"].as_str().unwrap().parse().unwrap();
    wait_for_image_status(&state.db, image_id, ImageStatus::Ready).await;

    let created = audit_entries(&app, &admin_token, "?action=create_application").await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["resource_id"].as_str().unwrap(), app_id);
    assert_eq!(created[0]["resource_type"], "application");

    let approved = audit_entries(&app, &admin_token, "?action=approve_application").await;
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0]["details"]["image_id"], json!(image_id));

    let finished = audit_entries(&app, &admin_token, "?action=image_build_finished").await;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0]["details"]["outcome"], "ready");
}

#[tokio::test]
async fn entries_come_newest_first() {
    let state = test_state().await;
    let admin_token = token_for(&state, "admin").await;
    let app = build_router(state);

    for user in ["developer", "operator"] {
        let res = app
            .clone()
            .oneshot(post_json("/api/auth/login", "", json!({"username": user, "password": format!("{user}123")})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let entries = audit_entries(&app, &admin_token, "").await;
    assert!(entries.len() >= 2);
    let stamps: Vec<&str> = entries.iter().map(|e| e["created_at"].as_str().unwrap()).collect();
    let mut sorted = stamps.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(stamps, sorted);
}

#[tokio::test]
async fn limit_is_applied() {
    let state = test_state().await;
    let admin_token = token_for(&state, "admin").await;
    let app = build_router(state);
    for _ in 0..3 {
        let res = app
            .clone()
            .oneshot(post_json("/api/auth/login", "", json!({"username": "developer", "password": "developer123"})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let entries = audit_entries(&app, &admin_token, "?limit=2").await;
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn resource_type_filter_applies() {
    let state = test_state().await;
    let admin_token = token_for(&state, "admin").await;
    let dev_token = token_for(&state, "developer").await;
    let app = build_router(state);
    let res = app
        .clone()
        .oneshot(post_json(
            "/api/developer/applications",
            &dev_token,
            json!({"git_repo": "https://git.example/a.git", "branch": "main", "base_image": "alpine"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let entries = audit_entries(&app, &admin_token, "?resource_type=application").await;
    assert_eq!(entries.len(), 1);
    let entries = audit_entries(&app, &admin_token, "?resource_type=deployment").await;
    assert!(entries.is_empty());
}

#[tokio::test]
async fn audit_is_admin_only() {
    let state = test_state().await;
    let op_token = token_for(&state, "operator").await;
    let app = build_router(state);
    let res = app.oneshot(get_auth("/api/admin/audit", &op_token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}
