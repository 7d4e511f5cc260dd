//! Sessions, bans and role gates.
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use samosval::build_router;
use samosval::test_support::{bearer, body_json, test_state, token_for, user_id};
use serde_json::json;
use tower::util::ServiceExt;

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json_auth(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
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

async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, serde_json::Value) {
    let res = app
        .clone()
        .oneshot(post_json("/api/auth/login", json!({"username": username, "password": password})))
        .await
        .unwrap();
    let status = res.status();
    (status, body_json(res).await)
}

#[tokio::test]
async fn login_returns_usable_token() {
    let state = test_state().await;
    let app = build_router(state);
    let (code, v) = login(&app, "developer", "developer123").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(v["user"]["role"], "developer");
    assert!(v["user"]["password_hash"].is_null());
    let token = v["token"].as_str().unwrap();
    let res = app.oneshot(get_auth("/api/developer/applications", token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_password_is_401() {
    let state = test_state().await;
    let app = build_router(state);
    let (code, v) = login(&app, "developer", "nope").await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
    assert_eq!(v["code"], "unauthorized");
}

#[tokio::test]
async fn garbage_token_is_401() {
    let state = test_state().await;
    let app = build_router(state);
    let res = app.oneshot(get_auth("/api/developer/applications", "deadbeef")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ban_locks_out_live_sessions_and_logins() {
    let state = test_state().await;
    let admin_token = token_for(&state, "admin").await;
    let dev_token = token_for(&state, "developer").await;
    let dev_id = user_id(&state.db, "developer").await;
    let app = build_router(state);

    let res = app
        .clone()
        .oneshot(post_json_auth(&format!("/api/admin/users/{dev_id}/ban"), &admin_token, json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // The session minted before the ban no longer works.
    let res = app.clone().oneshot(get_auth("/api/developer/applications", &dev_token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let (code, v) = login(&app, "developer", "developer123").await;
    assert_eq!(code, StatusCode::FORBIDDEN);
    assert_eq!(v["code"], "forbidden");

    let res = app
        .clone()
        .oneshot(post_json_auth(&format!("/api/admin/users/{dev_id}/unban"), &admin_token, json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let (code, _) = login(&app, "developer", "developer123").await;
    assert_eq!(code, StatusCode::OK);
}

#[tokio::test]
async fn ban_of_unknown_user_is_404() {
    let state = test_state().await;
    let admin_token = token_for(&state, "admin").await;
    let app = build_router(state);
    let res = app
        .oneshot(post_json_auth(&format!("/api/admin/users/{}/ban", uuid::Uuid::new_v4()), &admin_token, json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn register_creates_a_developer_once() {
    let state = test_state().await;
    let app = build_router(state);
    let res = app
        .clone()
        .oneshot(post_json(
            "/api/auth/register",
            json!({"username": "newdev", "email": "newdev@samosval.local", "password": "hunter22"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let v = body_json(res).await;
    assert_eq!(v["role"], "developer");

    // Duplicate usernames are rejected.
    let res = app
        .clone()
        .oneshot(post_json(
            "/api/auth/register",
            json!({"username": "newdev", "email": "other@samosval.local", "password": "hunter22"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let (code, _) = login(&app, "newdev", "hunter22").await;
    assert_eq!(code, StatusCode::OK);
}

#[tokio::test]
async fn admin_creates_operators() {
    let state = test_state().await;
    let admin_token = token_for(&state, "admin").await;
    let app = build_router(state);
    let res = app
        .clone()
        .oneshot(post_json_auth(
            "/api/admin/users",
            &admin_token,
            json!({"username": "op2", "email": "op2@samosval.local", "password": "op2pass", "role": "operator"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(body_json(res).await["role"], "operator");

    let (code, v) = login(&app, "op2", "op2pass").await;
    assert_eq!(code, StatusCode::OK);
    let token = v["token"].as_str().unwrap();
    let res = app.oneshot(get_auth("/api/operator/images", token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn username_search_matches_prefixes() {
    let state = test_state().await;
    let token = token_for(&state, "operator").await;
    let app = build_router(state);
    let res = app.clone().oneshot(get_auth("/api/users/search?q=dev", &token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v, json!(["developer"]));

    // Search is authenticated like everything else under /api.
    let res = app
        .oneshot(Request::builder().uri("/api/users/search?q=dev").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_treats_like_wildcards_literally() {
    let state = test_state().await;
    let token = token_for(&state, "operator").await;
    let app = build_router(state);
    // A lone "%" must not match every user.
    let res = app.clone().oneshot(get_auth("/api/users/search?q=%25", &token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!([]));
    // "_" is a literal underscore, not a single-character wildcard.
    let res = app.oneshot(get_auth("/api/users/search?q=d_v", &token)).await.unwrap();
    assert_eq!(body_json(res).await, json!([]));
}

#[tokio::test]
async fn admin_user_listing_hides_password_hashes() {
    let state = test_state().await;
    let admin_token = token_for(&state, "admin").await;
    let app = build_router(state);
    let res = app.oneshot(get_auth("/api/admin/users", &admin_token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v.as_array().unwrap().len(), 3);
    for row in v.as_array().unwrap() {
        assert!(row.get("password_hash").is_none());
    }
}
