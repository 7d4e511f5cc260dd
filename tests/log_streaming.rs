//! Runtime log and metric fan-out for running deployments.
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use samosval::models::ImageStatus;
use samosval::test_support::{bearer, body_json, test_state, token_for, wait_for_image_status};
use samosval::{build_router, runtime, AppState};
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

/// Ready image + one deployment named `web`, returned stopped.
async fn deployment(app: &Router, state: &AppState, dev_token: &str, op_token: &str) -> Uuid {
    let res = app
        .clone()
        .oneshot(post_json(
            "/api/developer/applications",
            dev_token,
            json!({"git_repo": "https://git.example/a.git", "branch": "main", "base_image": "alpine"}),
        ))
        .await
        .unwrap();
    let app_id = body_json(res).await["id"].as_str().unwrap().to_string();
    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/operator/applications/{app_id}/approve"), op_token, json!({})))
        .await
        .unwrap();
    let image_id: Uuid = body_json(res).await["image_id"].as_str().unwrap().parse().unwrap();
    wait_for_image_status(&state.db, image_id, ImageStatus::Ready).await;
    let res = app
        .clone()
        .oneshot(post_json(
            "/api/operator/deployments",
            op_token,
            json!({"image_id": image_id, "name": "web", "port": 8080}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    body_json(res).await["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn running_deployments_get_logs_and_samples() {
    let state = test_state().await;
    let dev_token = token_for(&state, "developer").await;
    let op_token = token_for(&state, "operator").await;
    let app = build_router(state.clone());
    let id = deployment(&app, &state, &dev_token, &op_token).await;
    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/operator/deployments/{id}/start"), &op_token, json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    for _ in 0..3 {
        runtime::tick(&state).await.unwrap();
    }

    let res = app.clone().oneshot(get_auth(&format!("/api/operator/deployments/{id}/logs"), &op_token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    let logs = v["logs"].as_array().unwrap();
    // The start marker plus at least one generated line per tick.
    assert!(logs.len() >= 4);
    assert!(logs[0].as_str().unwrap().contains("deployment started"));
    assert!(logs.iter().all(|l| l.as_str().unwrap().contains("web")));

    let res = app.oneshot(get_auth(&format!("/api/operator/deployments/{id}/metrics"), &op_token)).await.unwrap();
    let v = body_json(res).await;
    let cpu = v["cpu"].as_array().unwrap();
    let ram = v["ram"].as_array().unwrap();
    let labels = v["labels"].as_array().unwrap();
    assert_eq!(cpu.len(), 3);
    assert_eq!(ram.len(), 3);
    assert_eq!(labels.len(), 3);
    assert!(cpu.iter().chain(ram.iter()).all(|x| (0.0..=100.0).contains(&x.as_f64().unwrap())));
}

#[tokio::test]
async fn stopped_deployments_stay_silent() {
    let state = test_state().await;
    let dev_token = token_for(&state, "developer").await;
    let op_token = token_for(&state, "operator").await;
    let app = build_router(state.clone());
    let id = deployment(&app, &state, &dev_token, &op_token).await;

    for _ in 0..3 {
        runtime::tick(&state).await.unwrap();
    }

    let res = app.clone().oneshot(get_auth(&format!("/api/operator/deployments/{id}/logs"), &op_token)).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v["logs"], json!([]));
    let res = app.oneshot(get_auth(&format!("/api/operator/deployments/{id}/metrics"), &op_token)).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v["labels"], json!([]));
}

#[tokio::test]
async fn subscribers_see_tail_then_live_lines() {
    let state = test_state().await;
    let id = Uuid::new_v4();
    state.hub.publish_log(id, "old line".into());
    let (tail, mut rx) = state.hub.subscribe(id);
    assert_eq!(tail, vec!["old line".to_string()]);
    state.hub.publish_log(id, "new line".into());
    assert_eq!(rx.recv().await.unwrap(), "new line");
}

#[tokio::test]
async fn log_endpoints_404_for_unknown_deployments() {
    let state = test_state().await;
    let op_token = token_for(&state, "operator").await;
    let app = build_router(state);
    let missing = Uuid::new_v4();
    for uri in [
        format!("/api/operator/deployments/{missing}/logs"),
        format!("/api/operator/deployments/{missing}/logs/stream"),
        format!("/api/operator/deployments/{missing}/metrics"),
    ] {
        let res = app.clone().oneshot(get_auth(&uri, &op_token)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn platform_metrics_reflect_state() {
    let state = test_state().await;
    let dev_token = token_for(&state, "developer").await;
    let op_token = token_for(&state, "operator").await;
    let app = build_router(state.clone());
    let id = deployment(&app, &state, &dev_token, &op_token).await;

    let res = app.clone().oneshot(get_auth("/api/operator/metrics", &op_token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["total_applications"], 1);
    assert_eq!(v["pending_applications"], 0);
    assert_eq!(v["total_images"], 1);
    assert_eq!(v["total_deployments"], 1);
    assert_eq!(v["stopped_deployments"], 1);
    assert_eq!(v["running_deployments"], 0);

    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/operator/deployments/{id}/start"), &op_token, json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.oneshot(get_auth("/api/operator/metrics", &op_token)).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v["running_deployments"], 1);
    assert_eq!(v["stopped_deployments"], 0);
}
